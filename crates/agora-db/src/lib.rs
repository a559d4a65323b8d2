//! Embedded store for the aggregation backend.
//!
//! Thin transactional shell over `redb`: typed tables in [`tables`], one op
//! module per entity family. All multi-step invariants (upsert-by-platform,
//! progress latch, waitlist promotion, claim counters) run inside a single
//! write transaction; redb's single-writer model serializes concurrent
//! callers, so conditional updates never double-apply.
//!
//! Mutating services attach domain-event publication to
//! [`WriteTransactionCtx::on_commit`] so nothing is announced for a
//! transaction that did not commit.

mod achievement_ops;
mod badge_ops;
mod checkin_ops;
mod event_ops;
mod favorite_ops;
mod group_ops;
mod onboarding_ops;
mod rsvp_ops;
mod sync_log_ops;
mod tables;
mod user_ops;
mod venue_ops;
mod webhook_ops;

#[cfg(test)]
mod tests;

use std::path::PathBuf;
use std::{ops, result};

use agora_core::fmt::BoxedError;
use redb_bincode::WriteTransaction;
use snafu::{Location, ResultExt as _, Snafu};
use tokio::task::JoinError;
use tracing::debug;

pub use self::checkin_ops::RedeemRefusal;
pub use self::event_ops::UpsertOutcome;
pub use self::tables::*;

const LOG_TARGET: &str = "agora::db";

const DB_VERSION: u64 = 0;

pub struct WriteTransactionCtx {
    dbtx: WriteTransaction,
    on_commit: std::sync::Mutex<Vec<Box<dyn FnOnce() + 'static>>>,
}

impl From<WriteTransaction> for WriteTransactionCtx {
    fn from(dbtx: WriteTransaction) -> Self {
        Self {
            dbtx,
            on_commit: std::sync::Mutex::new(vec![]),
        }
    }
}

impl ops::Deref for WriteTransactionCtx {
    type Target = WriteTransaction;

    fn deref(&self) -> &Self::Target {
        &self.dbtx
    }
}

impl ops::DerefMut for WriteTransactionCtx {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.dbtx
    }
}

impl WriteTransactionCtx {
    /// Run `f` after (and only after) this transaction commits.
    pub fn on_commit(&self, f: impl FnOnce() + 'static) {
        self.on_commit
            .lock()
            .expect("Locking failed")
            .push(Box::new(f));
    }

    fn commit(self) -> result::Result<(), redb::CommitError> {
        let Self { dbtx, on_commit } = self;

        dbtx.commit()?;

        for hook in on_commit.lock().expect("Locking failed").drain(..) {
            hook();
        }
        Ok(())
    }
}

#[derive(Debug, Snafu)]
pub enum DbError {
    Database {
        source: redb::DatabaseError,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(transparent)]
    Table {
        source: redb::TableError,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(transparent)]
    Storage {
        source: redb::StorageError,
        #[snafu(implicit)]
        location: Location,
    },
    Transaction {
        #[snafu(source(from(redb::TransactionError, Box::new)))]
        source: Box<redb::TransactionError>,
        #[snafu(implicit)]
        location: Location,
    },
    Commit {
        source: redb::CommitError,
        #[snafu(implicit)]
        location: Location,
    },
    DbVersionTooHigh {
        db_ver: u64,
        code_ver: u64,
        #[snafu(implicit)]
        location: Location,
    },
    Join {
        source: JoinError,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(transparent)]
    DbTxLogic {
        source: BoxedError,
        #[snafu(implicit)]
        location: Location,
    },
}
pub type DbResult<T> = std::result::Result<T, DbError>;

#[derive(Debug)]
pub struct Database {
    inner: redb_bincode::Database,
}

impl Database {
    pub async fn open(path: impl Into<PathBuf>) -> DbResult<Database> {
        let path = path.into();
        debug!(target: LOG_TARGET, path = %path.display(), "Opening database");

        let inner = tokio::task::spawn_blocking(move || redb::Database::create(path))
            .await
            .context(JoinSnafu)?
            .context(DatabaseSnafu)?;

        Self::open_inner(inner).await
    }

    pub async fn new_in_memory() -> DbResult<Database> {
        debug!(target: LOG_TARGET, "Opening in-memory database");
        let inner = redb::Database::builder()
            .create_with_backend(redb::backends::InMemoryBackend::new())
            .context(DatabaseSnafu)?;
        Self::open_inner(inner).await
    }

    async fn open_inner(inner: redb::Database) -> DbResult<Database> {
        let inner = redb_bincode::Database::from(inner);

        Self::write_with_inner(&inner, |tx| {
            Self::init_tables_tx(tx)?;
            Self::verify_db_version_tx(tx)?;
            Ok(())
        })
        .await?;

        Ok(Self { inner })
    }

    fn init_tables_tx(tx: &WriteTransactionCtx) -> DbResult<()> {
        tx.open_table(&db_version::TABLE)?;
        tx.open_table(&groups::TABLE)?;
        tx.open_table(&groups_by_slug::TABLE)?;
        tx.open_table(&venues::TABLE)?;
        tx.open_table(&venues_by_platform::TABLE)?;
        tx.open_table(&events::TABLE)?;
        tx.open_table(&events_by_platform::TABLE)?;
        tx.open_table(&events_by_group::TABLE)?;
        tx.open_table(&users::TABLE)?;
        tx.open_table(&users_by_name::TABLE)?;
        tx.open_table(&badges::TABLE)?;
        tx.open_table(&badges_by_slug::TABLE)?;
        tx.open_table(&user_badges::TABLE)?;
        tx.open_table(&claim_links::TABLE)?;
        tx.open_table(&achievements::TABLE)?;
        tx.open_table(&achievement_progress::TABLE)?;
        tx.open_table(&user_entitlements::TABLE)?;
        tx.open_table(&onboarding_steps::TABLE)?;
        tx.open_table(&user_onboarding::TABLE)?;
        tx.open_table(&rsvps::TABLE)?;
        tx.open_table(&checkin_codes::TABLE)?;
        tx.open_table(&checkins::TABLE)?;
        tx.open_table(&favorites::TABLE)?;
        tx.open_table(&favorites_by_group::TABLE)?;
        tx.open_table(&sync_logs::TABLE)?;
        tx.open_table(&webhooks::TABLE)?;
        tx.open_table(&webhook_deliveries::TABLE)?;
        Ok(())
    }

    fn verify_db_version_tx(tx: &WriteTransactionCtx) -> DbResult<()> {
        let mut table = tx.open_table(&db_version::TABLE)?;
        let existing = table.get(&())?.map(|guard| guard.value());
        let db_ver = match existing {
            Some(v) => v,
            None => {
                table.insert(&(), &DB_VERSION)?;
                DB_VERSION
            }
        };

        if DB_VERSION < db_ver {
            return DbVersionTooHighSnafu {
                db_ver,
                code_ver: DB_VERSION,
            }
            .fail();
        }
        Ok(())
    }

    pub async fn write_with_inner<T>(
        inner: &redb_bincode::Database,
        f: impl FnOnce(&'_ WriteTransactionCtx) -> DbResult<T>,
    ) -> DbResult<T> {
        tokio::task::block_in_place(|| {
            let dbtx = WriteTransactionCtx::from(inner.begin_write().context(TransactionSnafu)?);
            let res = f(&dbtx)?;

            dbtx.commit().context(CommitSnafu)?;

            Ok(res)
        })
    }

    pub async fn write_with<T>(
        &self,
        f: impl FnOnce(&'_ WriteTransactionCtx) -> DbResult<T>,
    ) -> DbResult<T> {
        Self::write_with_inner(&self.inner, f).await
    }

    pub async fn read_with_inner<T>(
        inner: &redb_bincode::Database,
        f: impl FnOnce(&'_ redb_bincode::ReadTransaction) -> DbResult<T>,
    ) -> DbResult<T> {
        tokio::task::block_in_place(|| {
            let dbtx = inner.begin_read().context(TransactionSnafu)?;

            f(&dbtx)
        })
    }

    pub async fn read_with<T>(
        &self,
        f: impl FnOnce(&'_ redb_bincode::ReadTransaction) -> DbResult<T>,
    ) -> DbResult<T> {
        Self::read_with_inner(&self.inner, f).await
    }
}
