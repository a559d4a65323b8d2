use agora_core::Timestamp;
use agora_core::id::UserId;
use redb_bincode::ReadTransaction;

use crate::{
    AchievementRecord, Database, DbResult, EntitlementRecord, ProgressRecord,
    WriteTransactionCtx, achievement_progress, achievements, user_entitlements,
};

impl Database {
    pub fn upsert_achievement_tx(
        tx: &WriteTransactionCtx,
        key: &str,
        record: &AchievementRecord,
    ) -> DbResult<()> {
        tx.open_table(&achievements::TABLE)?
            .insert(&key.to_string(), record)?;
        Ok(())
    }

    pub fn get_achievement_tx(
        tx: &ReadTransaction,
        key: &str,
    ) -> DbResult<Option<AchievementRecord>> {
        Ok(tx
            .open_table(&achievements::TABLE)?
            .get(&key.to_string())?
            .map(|g| g.value()))
    }

    pub fn get_achievement_write_tx(
        tx: &WriteTransactionCtx,
        key: &str,
    ) -> DbResult<Option<AchievementRecord>> {
        Ok(tx
            .open_table(&achievements::TABLE)?
            .get(&key.to_string())?
            .map(|g| g.value()))
    }

    /// All enabled achievement definitions; the engine caches this per queue
    /// batch.
    pub async fn load_enabled_achievements(&self) -> DbResult<Vec<(String, AchievementRecord)>> {
        self.read_with(|tx| {
            let table = tx.open_table(&achievements::TABLE)?;
            let mut out = Vec::new();
            for entry in table.range::<String>(..)? {
                let (k, v) = entry?;
                let record = v.value();
                if record.enabled {
                    out.push((k.value(), record));
                }
            }
            Ok(out)
        })
        .await
    }

    /// Insert a progress row if absent (initial value given), otherwise leave
    /// the existing row alone.
    pub fn ensure_progress_tx(
        tx: &WriteTransactionCtx,
        user_id: UserId,
        key: &str,
        initial_value: u64,
        target_value: u64,
        now: Timestamp,
    ) -> DbResult<ProgressRecord> {
        let mut table = tx.open_table(&achievement_progress::TABLE)?;
        let progress_key = (user_id, key.to_string());
        if let Some(existing) = table.get(&progress_key)?.map(|g| g.value()) {
            return Ok(existing);
        }
        let record = ProgressRecord {
            current_value: initial_value,
            target_value,
            completed_at: None,
            updated_at: now,
        };
        table.insert(&progress_key, &record)?;
        Ok(record)
    }

    /// `current += 1` on rows not yet completed. Returns the row after the
    /// update; completed rows are returned untouched.
    pub fn increment_progress_tx(
        tx: &WriteTransactionCtx,
        user_id: UserId,
        key: &str,
        now: Timestamp,
    ) -> DbResult<Option<ProgressRecord>> {
        let mut table = tx.open_table(&achievement_progress::TABLE)?;
        let progress_key = (user_id, key.to_string());
        let Some(mut record) = table.get(&progress_key)?.map(|g| g.value()) else {
            return Ok(None);
        };
        if record.completed_at.is_some() {
            return Ok(Some(record));
        }
        record.current_value = record.current_value.saturating_add(1);
        record.updated_at = now;
        table.insert(&progress_key, &record)?;
        Ok(Some(record))
    }

    /// `current := value` on rows not yet completed (gauge mode).
    pub fn set_gauge_progress_tx(
        tx: &WriteTransactionCtx,
        user_id: UserId,
        key: &str,
        value: u64,
        now: Timestamp,
    ) -> DbResult<Option<ProgressRecord>> {
        let mut table = tx.open_table(&achievement_progress::TABLE)?;
        let progress_key = (user_id, key.to_string());
        let Some(mut record) = table.get(&progress_key)?.map(|g| g.value()) else {
            return Ok(None);
        };
        if record.completed_at.is_some() {
            return Ok(Some(record));
        }
        record.current_value = value;
        record.updated_at = now;
        table.insert(&progress_key, &record)?;
        Ok(Some(record))
    }

    /// Latch `completed_at` when the target is reached. Returns true only for
    /// the invocation that performed the latch.
    pub fn complete_progress_tx(
        tx: &WriteTransactionCtx,
        user_id: UserId,
        key: &str,
        now: Timestamp,
    ) -> DbResult<bool> {
        let mut table = tx.open_table(&achievement_progress::TABLE)?;
        let progress_key = (user_id, key.to_string());
        let Some(mut record) = table.get(&progress_key)?.map(|g| g.value()) else {
            return Ok(false);
        };
        if record.completed_at.is_some() || record.current_value < record.target_value {
            return Ok(false);
        }
        record.completed_at = Some(now);
        record.updated_at = now;
        table.insert(&progress_key, &record)?;
        Ok(true)
    }

    /// Upsert straight to completion (claim-link auto-complete). Existing
    /// completed rows are untouched.
    pub fn force_complete_progress_tx(
        tx: &WriteTransactionCtx,
        user_id: UserId,
        key: &str,
        target_value: u64,
        now: Timestamp,
    ) -> DbResult<bool> {
        let mut table = tx.open_table(&achievement_progress::TABLE)?;
        let progress_key = (user_id, key.to_string());
        let mut record = match table.get(&progress_key)?.map(|g| g.value()) {
            Some(record) => {
                if record.completed_at.is_some() {
                    return Ok(false);
                }
                record
            }
            None => ProgressRecord {
                current_value: 0,
                target_value,
                completed_at: None,
                updated_at: now,
            },
        };
        record.current_value = record.current_value.max(record.target_value);
        record.completed_at = Some(now);
        record.updated_at = now;
        table.insert(&progress_key, &record)?;
        Ok(true)
    }

    pub fn get_progress_tx(
        tx: &ReadTransaction,
        user_id: UserId,
        key: &str,
    ) -> DbResult<Option<ProgressRecord>> {
        Ok(tx
            .open_table(&achievement_progress::TABLE)?
            .get(&(user_id, key.to_string()))?
            .map(|g| g.value()))
    }

    pub async fn get_progress(
        &self,
        user_id: UserId,
        key: &str,
    ) -> DbResult<Option<ProgressRecord>> {
        self.read_with(|tx| Self::get_progress_tx(tx, user_id, key))
            .await
    }

    /// Grant once; true on a new grant.
    pub fn grant_entitlement_tx(
        tx: &WriteTransactionCtx,
        user_id: UserId,
        entitlement: &str,
        now: Timestamp,
    ) -> DbResult<bool> {
        let mut table = tx.open_table(&user_entitlements::TABLE)?;
        let key = (user_id, entitlement.to_string());
        if table.get(&key)?.is_some() {
            return Ok(false);
        }
        table.insert(&key, &EntitlementRecord { granted_at: now })?;
        Ok(true)
    }

    pub async fn upsert_achievement(
        &self,
        key: &str,
        record: AchievementRecord,
    ) -> DbResult<()> {
        self.write_with(|tx| Self::upsert_achievement_tx(tx, key, &record))
            .await
    }

    pub async fn list_achievements(&self) -> DbResult<Vec<(String, AchievementRecord)>> {
        self.read_with(|tx| {
            let table = tx.open_table(&achievements::TABLE)?;
            let mut out = Vec::new();
            for entry in table.range::<String>(..)? {
                let (k, v) = entry?;
                out.push((k.value(), v.value()));
            }
            Ok(out)
        })
        .await
    }
}
