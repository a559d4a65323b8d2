//! Sync service: reconcile upstream platform state into the store.
//!
//! One pass per `(group, connection)`: open a running sync-log row, fetch
//! through the provider registry, upsert venues and events, infer deletions
//! for future events that vanished upstream, finalize the log, and publish
//! `events.synced` when anything new appeared. Batch syncs run per-group
//! work through a bounded pool; one failure never aborts the batch.

use std::sync::Arc;
use std::time::Instant;

use agora_core::envelope::{DomainEvent, event_type};
use agora_core::id::GroupId;
use agora_core::{Platform, Timestamp, payload};
use agora_db::{Database, DbResult, SyncStatus, UpsertOutcome};
use agora_providers::{FetchOpts, ProviderEnv, ProviderRegistry};
use futures::StreamExt as _;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::bus::BusSender;
use crate::{ServiceError, ServiceResult};

const LOG_TARGET: &str = "agora::sync";

const MAX_EVENTS_PER_SYNC: usize = 50;
/// Without `force`, connections synced more recently than this are skipped.
const MIN_SYNC_INTERVAL_SECS: u64 = 10 * 60;

#[derive(Debug, Clone)]
pub struct SyncOpts {
    pub concurrency: usize,
    pub group_ids: Option<Vec<GroupId>>,
    pub force: bool,
}

impl Default for SyncOpts {
    fn default() -> Self {
        Self {
            concurrency: 5,
            group_ids: None,
            force: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub success: bool,
    pub group_id: GroupId,
    pub group_urlname: String,
    pub events_created: u32,
    pub events_updated: u32,
    pub events_deleted: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncAllResult {
    pub success: bool,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<SyncResult>,
    pub duration_ms: u64,
}

/// Per-connection tallies, merged into the group-level [`SyncResult`].
#[derive(Debug, Default)]
struct ConnectionTally {
    created: u32,
    updated: u32,
    deleted: u32,
    error: Option<String>,
}

pub struct SyncService {
    db: Arc<Database>,
    registry: Arc<ProviderRegistry>,
    env: ProviderEnv,
    bus: BusSender,
}

impl SyncService {
    pub fn new(
        db: Arc<Database>,
        registry: Arc<ProviderRegistry>,
        env: ProviderEnv,
        bus: BusSender,
    ) -> Self {
        Self {
            db,
            registry,
            env,
            bus,
        }
    }

    /// Sync every eligible group, bounded-concurrently. Per-group results
    /// are independent; `sync.completed` goes out once everything settled.
    pub async fn sync_all_groups(&self, opts: &SyncOpts) -> ServiceResult<SyncAllResult> {
        let started = Instant::now();

        let group_ids: Vec<GroupId> = {
            let wanted = opts.group_ids.clone();
            let connections = self
                .db
                .read_with(|tx| Database::list_syncable_connections_tx(tx, wanted.as_deref()))
                .await?;
            let mut ids: Vec<GroupId> = connections.into_iter().map(|(id, _, _)| id).collect();
            ids.sort_unstable();
            ids.dedup();
            ids
        };

        let results: Vec<SyncResult> = futures::stream::iter(
            group_ids
                .iter()
                .map(|group_id| self.sync_group_inner(*group_id, opts.force)),
        )
        .buffer_unordered(opts.concurrency.max(1))
        .collect()
        .await;

        let succeeded = results.iter().filter(|r| r.success).count();
        let failed = results.len() - succeeded;
        let duration_ms = started.elapsed().as_millis() as u64;

        let created: u32 = results.iter().map(|r| r.events_created).sum();
        let updated: u32 = results.iter().map(|r| r.events_updated).sum();
        let deleted: u32 = results.iter().map(|r| r.events_deleted).sum();

        self.bus.emit_nowait(
            DomainEvent::new(
                event_type::SYNC_COMPLETED,
                payload! {
                    "total" => results.len(),
                    "succeeded" => succeeded,
                    "failed" => failed,
                    "eventsCreated" => created,
                    "eventsUpdated" => updated,
                    "eventsDeleted" => deleted,
                    "durationMs" => duration_ms,
                },
            )
            .with_source("sync"),
        );

        info!(
            target: LOG_TARGET,
            total = results.len(),
            succeeded,
            failed,
            duration_ms,
            "Sync batch complete"
        );

        Ok(SyncAllResult {
            success: failed == 0,
            total: results.len(),
            succeeded,
            failed,
            results,
            duration_ms,
        })
    }

    pub async fn sync_group(&self, group_id: GroupId) -> ServiceResult<SyncResult> {
        if self.db.get_group(group_id).await?.is_none() {
            return Err(ServiceError::NotFound { entity: "group" });
        }
        Ok(self.sync_group_inner(group_id, true).await)
    }

    pub async fn sync_group_by_urlname(&self, slug: &str) -> ServiceResult<SyncResult> {
        let Some((group_id, _)) = self.db.get_group_by_slug(slug).await? else {
            return Err(ServiceError::NotFound { entity: "group" });
        };
        Ok(self.sync_group_inner(group_id, true).await)
    }

    pub async fn get_sync_logs(
        &self,
        limit: usize,
        group_id: Option<GroupId>,
    ) -> ServiceResult<Vec<agora_db::SyncLogRecord>> {
        Ok(self.db.list_sync_logs(limit, group_id).await?)
    }

    /// Sync every syncable connection of one group; never returns `Err` —
    /// all failures are packed into the result.
    #[instrument(skip(self), fields(group_id = %group_id))]
    async fn sync_group_inner(&self, group_id: GroupId, force: bool) -> SyncResult {
        let started = Instant::now();

        let (slug, connections) = match self.db.get_group(group_id).await {
            Ok(Some(group)) => {
                let connections: Vec<_> = group
                    .connections
                    .iter()
                    .filter(|c| c.active && c.platform.is_syncable())
                    .map(|c| (c.platform, c.platform_id.clone(), c.last_sync_at))
                    .collect();
                (group.slug, connections)
            }
            Ok(None) => {
                return SyncResult {
                    success: false,
                    group_id,
                    group_urlname: String::new(),
                    events_created: 0,
                    events_updated: 0,
                    events_deleted: 0,
                    error: Some("group not found".to_string()),
                    duration_ms: started.elapsed().as_millis() as u64,
                };
            }
            Err(err) => {
                return SyncResult {
                    success: false,
                    group_id,
                    group_urlname: String::new(),
                    events_created: 0,
                    events_updated: 0,
                    events_deleted: 0,
                    error: Some(err.to_string()),
                    duration_ms: started.elapsed().as_millis() as u64,
                };
            }
        };

        let mut created = 0u32;
        let mut updated = 0u32;
        let mut deleted = 0u32;
        let mut first_error: Option<String> = None;

        let now = Timestamp::now();
        for (platform, platform_id, last_sync_at) in connections {
            if !force {
                if let Some(last) = last_sync_at {
                    if now.secs_since(last) < MIN_SYNC_INTERVAL_SECS {
                        continue;
                    }
                }
            }

            let tally = self
                .sync_connection(group_id, &slug, platform, &platform_id)
                .await;
            created += tally.created;
            updated += tally.updated;
            deleted += tally.deleted;
            if first_error.is_none() {
                first_error = tally.error;
            }
        }

        SyncResult {
            success: first_error.is_none(),
            group_id,
            group_urlname: slug,
            events_created: created,
            events_updated: updated,
            events_deleted: deleted,
            error: first_error,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }

    /// One connection reconcile. Sync logs are always written, started
    /// before the fetch and finalized whatever happens after it.
    async fn sync_connection(
        &self,
        group_id: GroupId,
        group_slug: &str,
        platform: Platform,
        platform_id: &str,
    ) -> ConnectionTally {
        let started_at = Timestamp::now();

        let log_key = match self
            .db
            .write_with(|tx| {
                Database::start_sync_log_tx(tx, group_id, platform, platform_id, started_at)
            })
            .await
        {
            Ok(key) => key,
            Err(err) => {
                warn!(
                    target: LOG_TARGET,
                    group = %group_slug,
                    %platform,
                    err = %err,
                    "Failed to open sync log"
                );
                return ConnectionTally {
                    error: Some(err.to_string()),
                    ..Default::default()
                };
            }
        };

        let fetched = self
            .registry
            .fetch_events(
                platform,
                platform_id,
                &self.env,
                &FetchOpts {
                    max_events: MAX_EVENTS_PER_SYNC,
                },
            )
            .await;

        let outcome = match fetched {
            Ok(outcome) => outcome,
            Err(err) => {
                let message = err.to_string();
                warn!(
                    target: LOG_TARGET,
                    group = %group_slug,
                    %platform,
                    err = %message,
                    "Upstream fetch failed"
                );
                let completed_at = Timestamp::now();
                let write = self
                    .db
                    .write_with(|tx| {
                        Database::complete_sync_log_tx(
                            tx,
                            log_key,
                            SyncStatus::Failed,
                            completed_at,
                            0,
                            0,
                            0,
                            Some(&message),
                        )?;
                        Database::set_connection_sync_state_tx(
                            tx,
                            group_id,
                            platform,
                            platform_id,
                            completed_at,
                            Some(&message),
                        )
                    })
                    .await;
                if let Err(err) = write {
                    warn!(target: LOG_TARGET, err = %err, "Failed to record sync failure");
                }
                return ConnectionTally {
                    error: Some(message),
                    ..Default::default()
                };
            }
        };

        let now = Timestamp::now();
        let bus = self.bus.clone();
        let group_slug_owned = group_slug.to_string();

        let reconciled: DbResult<(u32, u32, u32)> = self
            .db
            .write_with(|tx| {
                if let Some(group) = &outcome.group {
                    Database::update_group_metadata_tx(tx, group_id, group)?;
                }

                let mut created = 0u32;
                let mut updated = 0u32;

                let mut seen_platform_ids = Vec::with_capacity(outcome.events.len());
                for canonical in &outcome.events {
                    let venue_id = canonical
                        .venue
                        .as_ref()
                        .map(|venue| Database::upsert_venue_tx(tx, platform, venue))
                        .transpose()?;
                    match Database::upsert_event_by_platform_tx(
                        tx, canonical, group_id, venue_id, now,
                    )? {
                        UpsertOutcome::Created(_) => created += 1,
                        UpsertOutcome::Updated(_) => updated += 1,
                    }
                    seen_platform_ids.push(canonical.platform_id.clone());
                }

                // Deletion inference: future active events of this platform
                // that vanished from the response get cancelled. Past events
                // are never touched.
                let mut deleted = 0u32;
                for (event_id, record) in
                    Database::list_future_active_events_by_group_tx(tx, group_id, now)?
                {
                    if record.platform == platform
                        && !seen_platform_ids.contains(&record.platform_id)
                    {
                        Database::cancel_event_tx(tx, event_id)?;
                        deleted += 1;
                    }
                }

                let completed_at = Timestamp::now();
                Database::complete_sync_log_tx(
                    tx,
                    log_key,
                    SyncStatus::Success,
                    completed_at,
                    created,
                    updated,
                    deleted,
                    None,
                )?;
                Database::set_connection_sync_state_tx(
                    tx,
                    group_id,
                    platform,
                    platform_id,
                    completed_at,
                    None,
                )?;

                // Announce only when the store changed shape (new or
                // inferred-deleted events); a no-op re-sync stays silent.
                if 0 < created || 0 < deleted {
                    let event = DomainEvent::new(
                        event_type::EVENTS_SYNCED,
                        payload! {
                            "groupId" => group_id.to_string(),
                            "groupSlug" => group_slug_owned,
                            "platform" => platform.as_str(),
                            "eventsCreated" => created,
                            "eventsUpdated" => updated,
                            "eventsDeleted" => deleted,
                        },
                    )
                    .with_source("sync");
                    tx.on_commit(move || bus.emit_nowait(event));
                }

                Ok((created, updated, deleted))
            })
            .await;

        match reconciled {
            Ok((created, updated, deleted)) => {
                info!(
                    target: LOG_TARGET,
                    group = %group_slug,
                    %platform,
                    created,
                    updated,
                    deleted,
                    "Connection synced"
                );
                ConnectionTally {
                    created,
                    updated,
                    deleted,
                    error: None,
                }
            }
            Err(err) => {
                let message = err.to_string();
                let completed_at = Timestamp::now();
                let write = self
                    .db
                    .write_with(|tx| {
                        Database::complete_sync_log_tx(
                            tx,
                            log_key,
                            SyncStatus::Failed,
                            completed_at,
                            0,
                            0,
                            0,
                            Some(&message),
                        )?;
                        Database::set_connection_sync_state_tx(
                            tx,
                            group_id,
                            platform,
                            platform_id,
                            completed_at,
                            Some(&message),
                        )
                    })
                    .await;
                if let Err(err) = write {
                    warn!(target: LOG_TARGET, err = %err, "Failed to record sync failure");
                }
                ConnectionTally {
                    error: Some(message),
                    ..Default::default()
                }
            }
        }
    }
}
