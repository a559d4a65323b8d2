//! Composition root: wires the store, provider registry, event bus, queue
//! handlers, services, and the MCP dispatcher, then serves HTTP and runs
//! the background sync scheduler.

mod config;
mod error;
mod routes;

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use agora_db::Database;
use agora_engine::{
    AchievementEngine, CheckinService, ClaimService, Dispatcher, FavoritesService,
    NotificationRelayer, Notifier, ProfileService, RsvpService, SyncOpts, SyncService,
    WebhookDeliverer, DEFAULT_BUS_CAPACITY, bus_channel, run_queue,
};
use agora_mcp::{McpDispatcher, McpRegistry, register_builtins};
use agora_providers::ProviderRegistry;
use clap::Parser;
use snafu::{ResultExt, Snafu};
use tokio::time::{Duration, interval};
use tracing::level_filters::LevelFilter;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::{ConfigError, ServerConfig};
use crate::routes::AppInner;

pub const LOG_TARGET: &str = "agora::server";

#[derive(Debug, Snafu)]
pub enum ServerError {
    #[snafu(display("Configuration error: {source}"))]
    Config { source: ConfigError },
    #[snafu(display("Database error: {source}"))]
    Database { source: agora_db::DbError },
    #[snafu(display("IO error: {source}"))]
    Io { source: io::Error },
    #[snafu(display("Logging initialization failed"))]
    Logging,
}

pub type ServerResult<T> = std::result::Result<T, ServerError>;

/// Agora — community event aggregation backend.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Opts {
    /// Address to serve HTTP on
    #[arg(long, default_value = "127.0.0.1:7420")]
    pub listen: SocketAddr,

    /// Data dir to store the database in
    #[arg(long, default_value = "./data")]
    pub data_dir: PathBuf,

    /// Minutes between scheduled sync passes; 0 disables the scheduler
    #[arg(long, default_value = "60")]
    pub sync_interval_minutes: u64,

    /// Concurrent group syncs per pass
    #[arg(long, default_value = "5")]
    pub sync_concurrency: usize,
}

#[snafu::report]
#[tokio::main]
async fn main() -> ServerResult<()> {
    init_logging()?;

    let opts = Opts::parse();
    let config = ServerConfig::from_env().context(ConfigSnafu)?;

    tokio::fs::create_dir_all(&opts.data_dir)
        .await
        .context(IoSnafu)?;
    let db = Arc::new(
        Database::open(opts.data_dir.join("agora.redb"))
            .await
            .context(DatabaseSnafu)?,
    );

    let registry = Arc::new(ProviderRegistry::with_default_adapters());
    for adapter in registry.get_configured_adapters(&config.provider_env) {
        info!(
            target: LOG_TARGET,
            platform = %adapter.platform(),
            "Provider configured"
        );
    }

    let (bus_tx, bus_rx) = bus_channel(DEFAULT_BUS_CAPACITY);

    let sync = Arc::new(SyncService::new(
        db.clone(),
        registry.clone(),
        config.provider_env.clone(),
        bus_tx.clone(),
    ));

    let notifier = Notifier::new();

    // Queue handlers are all wildcard: each one decides per event type what
    // to do.
    let mut dispatcher = Dispatcher::new();
    dispatcher.register_wildcard(Arc::new(AchievementEngine::new(
        db.clone(),
        bus_tx.clone(),
    )));
    dispatcher.register_wildcard(Arc::new(WebhookDeliverer::new(db.clone())));
    dispatcher.register_wildcard(Arc::new(NotificationRelayer::new(
        db.clone(),
        notifier.clone(),
    )));
    tokio::spawn(run_queue(bus_rx, dispatcher));

    if 0 < opts.sync_interval_minutes {
        let scheduler_sync = sync.clone();
        let concurrency = opts.sync_concurrency;
        let period = Duration::from_secs(opts.sync_interval_minutes * 60);
        tokio::spawn(async move {
            let mut ticker = interval(period);
            // The immediate first tick would race startup; skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                info!(target: LOG_TARGET, "Scheduled sync pass starting");
                match scheduler_sync
                    .sync_all_groups(&SyncOpts {
                        concurrency,
                        ..Default::default()
                    })
                    .await
                {
                    Ok(result) => {
                        info!(
                            target: LOG_TARGET,
                            succeeded = result.succeeded,
                            failed = result.failed,
                            "Scheduled sync pass finished"
                        );
                    }
                    Err(err) => {
                        error!(target: LOG_TARGET, err = %err, "Scheduled sync pass failed");
                    }
                }
            }
        });
    }

    let mut mcp_registry = McpRegistry::new();
    register_builtins(&mut mcp_registry);

    let state = Arc::new(AppInner {
        db: db.clone(),
        bus: bus_tx.clone(),
        sync: sync.clone(),
        rsvps: RsvpService::new(db.clone()),
        favorites: FavoritesService::new(db.clone()),
        claims: ClaimService::new(db.clone()),
        checkins: CheckinService::new(db.clone()),
        profiles: ProfileService::new(db.clone()),
        mcp: McpDispatcher::new(mcp_registry),
        notifier,
    });

    let app = routes::router(state)
        .layer(tower_http::trace::TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(opts.listen)
        .await
        .context(IoSnafu)?;
    info!(target: LOG_TARGET, listen = %opts.listen, "Serving");
    axum::serve(listener, app).await.context(IoSnafu)?;

    Ok(())
}

pub fn init_logging() -> ServerResult<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .try_init()
        .map_err(|_| ServerError::Logging)?;

    Ok(())
}
