use agora_core::id::UserId;
use redb_bincode::ReadTransaction;

use crate::{Database, DbResult, UserRecord, WriteTransactionCtx, users, users_by_name};

impl Database {
    pub fn insert_user_tx(
        tx: &WriteTransactionCtx,
        user_id: UserId,
        record: &UserRecord,
    ) -> DbResult<()> {
        tx.open_table(&users::TABLE)?.insert(&user_id, record)?;
        tx.open_table(&users_by_name::TABLE)?
            .insert(&record.username, &user_id)?;
        Ok(())
    }

    pub fn get_user_tx(tx: &ReadTransaction, user_id: UserId) -> DbResult<Option<UserRecord>> {
        Ok(tx
            .open_table(&users::TABLE)?
            .get(&user_id)?
            .map(|g| g.value()))
    }

    pub async fn insert_user(&self, user_id: UserId, record: UserRecord) -> DbResult<()> {
        self.write_with(|tx| Self::insert_user_tx(tx, user_id, &record))
            .await
    }

    pub async fn get_user(&self, user_id: UserId) -> DbResult<Option<UserRecord>> {
        self.read_with(|tx| Self::get_user_tx(tx, user_id)).await
    }

    pub async fn get_user_by_username(&self, username: &str) -> DbResult<Option<(UserId, UserRecord)>> {
        self.read_with(|tx| {
            let Some(user_id) = tx
                .open_table(&users_by_name::TABLE)?
                .get(&username.to_string())?
                .map(|g| g.value())
            else {
                return Ok(None);
            };
            Ok(Self::get_user_tx(tx, user_id)?.map(|record| (user_id, record)))
        })
        .await
    }

    pub async fn list_users(&self, limit: usize) -> DbResult<Vec<(UserId, UserRecord)>> {
        self.read_with(|tx| {
            let table = tx.open_table(&users::TABLE)?;
            let mut out = Vec::new();
            for entry in table.range(..)? {
                if limit <= out.len() {
                    break;
                }
                let (k, v) = entry?;
                out.push((k.value(), v.value()));
            }
            Ok(out)
        })
        .await
    }

    /// Apply profile edits. Returns false when the user does not exist.
    pub fn update_user_profile_tx(
        tx: &WriteTransactionCtx,
        user_id: UserId,
        display_name: Option<String>,
        bio: Option<String>,
        avatar_url: Option<String>,
        public: Option<bool>,
    ) -> DbResult<bool> {
        let mut table = tx.open_table(&users::TABLE)?;
        let Some(mut record) = table.get(&user_id)?.map(|g| g.value()) else {
            return Ok(false);
        };
        if let Some(display_name) = display_name {
            record.display_name = Some(display_name);
        }
        if let Some(bio) = bio {
            record.bio = Some(bio);
        }
        if let Some(avatar_url) = avatar_url {
            record.avatar_url = Some(avatar_url);
        }
        if let Some(public) = public {
            record.public = public;
        }
        table.insert(&user_id, &record)?;
        Ok(true)
    }
}
