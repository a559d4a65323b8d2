use agora_core::Timestamp;
use agora_core::id::{GroupId, UserId};

use crate::{
    Database, DbResult, FavoriteRecord, WriteTransactionCtx, favorites, favorites_by_group,
};

impl Database {
    /// Idempotent add; true only when a row was created.
    pub fn add_favorite_tx(
        tx: &WriteTransactionCtx,
        user_id: UserId,
        group_id: GroupId,
        now: Timestamp,
    ) -> DbResult<bool> {
        let mut favorites_table = tx.open_table(&favorites::TABLE)?;
        let key = (user_id, group_id);
        if favorites_table.get(&key)?.is_some() {
            return Ok(false);
        }
        favorites_table.insert(&key, &FavoriteRecord { favorited_at: now })?;
        tx.open_table(&favorites_by_group::TABLE)?
            .insert(&(group_id, user_id), &())?;
        Ok(true)
    }

    /// True only when a row was actually deleted.
    pub fn remove_favorite_tx(
        tx: &WriteTransactionCtx,
        user_id: UserId,
        group_id: GroupId,
    ) -> DbResult<bool> {
        let removed = tx
            .open_table(&favorites::TABLE)?
            .remove(&(user_id, group_id))?
            .is_some();
        if removed {
            tx.open_table(&favorites_by_group::TABLE)?
                .remove(&(group_id, user_id))?;
        }
        Ok(removed)
    }

    pub async fn favorite_count(&self, group_id: GroupId) -> DbResult<u32> {
        self.read_with(|tx| {
            let table = tx.open_table(&favorites_by_group::TABLE)?;
            let mut count = 0u32;
            for entry in table.range((group_id, UserId::ZERO)..=(group_id, UserId::MAX))? {
                entry?;
                count += 1;
            }
            Ok(count)
        })
        .await
    }

    pub async fn list_user_favorites(&self, user_id: UserId) -> DbResult<Vec<GroupId>> {
        self.read_with(|tx| {
            let table = tx.open_table(&favorites::TABLE)?;
            let mut out = Vec::new();
            for entry in table.range((user_id, GroupId::ZERO)..=(user_id, GroupId::MAX))? {
                let (k, _) = entry?;
                out.push(k.value().1);
            }
            Ok(out)
        })
        .await
    }
}
