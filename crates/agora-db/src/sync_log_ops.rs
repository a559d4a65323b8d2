use agora_core::id::{GroupId, SyncLogId};
use agora_core::{Platform, Timestamp};

use crate::{
    Database, DbResult, SyncLogRecord, SyncStatus, WriteTransactionCtx, sync_logs,
};

impl Database {
    /// Open a `running` log row. Returns its key so the caller can complete
    /// it later.
    pub fn start_sync_log_tx(
        tx: &WriteTransactionCtx,
        group_id: GroupId,
        platform: Platform,
        platform_id: &str,
        started_at: Timestamp,
    ) -> DbResult<(Timestamp, SyncLogId)> {
        let id = SyncLogId::random();
        let record = SyncLogRecord {
            id,
            group_id,
            platform,
            platform_id: platform_id.to_string(),
            status: SyncStatus::Running,
            started_at,
            completed_at: None,
            events_created: 0,
            events_updated: 0,
            events_deleted: 0,
            error: None,
        };
        tx.open_table(&sync_logs::TABLE)?
            .insert(&(started_at, id), &record)?;
        Ok((started_at, id))
    }

    /// Finalize a log row; rows already completed are left alone.
    #[allow(clippy::too_many_arguments)]
    pub fn complete_sync_log_tx(
        tx: &WriteTransactionCtx,
        key: (Timestamp, SyncLogId),
        status: SyncStatus,
        completed_at: Timestamp,
        events_created: u32,
        events_updated: u32,
        events_deleted: u32,
        error: Option<&str>,
    ) -> DbResult<()> {
        let mut table = tx.open_table(&sync_logs::TABLE)?;
        let Some(mut record) = table.get(&key)?.map(|g| g.value()) else {
            return Ok(());
        };
        if record.status != SyncStatus::Running {
            return Ok(());
        }
        record.status = status;
        record.completed_at = Some(completed_at);
        record.events_created = events_created;
        record.events_updated = events_updated;
        record.events_deleted = events_deleted;
        record.error = error.map(ToOwned::to_owned);
        table.insert(&key, &record)?;
        Ok(())
    }

    /// Newest-first listing, optionally filtered to one group.
    pub async fn list_sync_logs(
        &self,
        limit: usize,
        group_id: Option<GroupId>,
    ) -> DbResult<Vec<SyncLogRecord>> {
        self.read_with(|tx| {
            let table = tx.open_table(&sync_logs::TABLE)?;
            let mut out = Vec::new();
            for entry in table.range(..)?.rev() {
                if limit <= out.len() {
                    break;
                }
                let (_, v) = entry?;
                let record = v.value();
                if let Some(group_id) = group_id {
                    if record.group_id != group_id {
                        continue;
                    }
                }
                out.push(record);
            }
            Ok(out)
        })
        .await
    }
}
