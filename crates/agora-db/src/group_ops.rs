use agora_core::canonical::CanonicalGroup;
use agora_core::id::GroupId;
use agora_core::{Platform, Timestamp};
use redb_bincode::ReadTransaction;

use crate::{
    Database, DbResult, GroupRecord, WriteTransactionCtx, groups, groups_by_slug,
};

impl Database {
    pub fn insert_group_tx(
        tx: &WriteTransactionCtx,
        group_id: GroupId,
        record: &GroupRecord,
    ) -> DbResult<()> {
        tx.open_table(&groups::TABLE)?.insert(&group_id, record)?;
        tx.open_table(&groups_by_slug::TABLE)?
            .insert(&record.slug, &group_id)?;
        Ok(())
    }

    pub fn get_group_tx(
        tx: &ReadTransaction,
        group_id: GroupId,
    ) -> DbResult<Option<GroupRecord>> {
        Ok(tx
            .open_table(&groups::TABLE)?
            .get(&group_id)?
            .map(|g| g.value()))
    }

    pub fn get_group_by_slug_tx(
        tx: &ReadTransaction,
        slug: &str,
    ) -> DbResult<Option<(GroupId, GroupRecord)>> {
        let Some(group_id) = tx
            .open_table(&groups_by_slug::TABLE)?
            .get(&slug.to_string())?
            .map(|g| g.value())
        else {
            return Ok(None);
        };
        Ok(Self::get_group_tx(tx, group_id)?.map(|record| (group_id, record)))
    }

    /// Connections eligible for a sync pass: group sync enabled, connection
    /// active, platform syncable.
    pub fn list_syncable_connections_tx(
        tx: &ReadTransaction,
        group_ids: Option<&[GroupId]>,
    ) -> DbResult<Vec<(GroupId, Platform, String)>> {
        let table = tx.open_table(&groups::TABLE)?;
        let mut out = Vec::new();
        for entry in table.range(..)? {
            let (k, v) = entry?;
            let group_id = k.value();
            if let Some(wanted) = group_ids {
                if !wanted.contains(&group_id) {
                    continue;
                }
            }
            let record = v.value();
            if !record.sync.active {
                continue;
            }
            for conn in &record.connections {
                if conn.active && conn.platform.is_syncable() {
                    out.push((group_id, conn.platform, conn.platform_id.clone()));
                }
            }
        }
        Ok(out)
    }

    /// Overlay freshly fetched group metadata. Local-only fields (slug,
    /// flags, tags, links, governance) are left alone.
    pub fn update_group_metadata_tx(
        tx: &WriteTransactionCtx,
        group_id: GroupId,
        canonical: &CanonicalGroup,
    ) -> DbResult<()> {
        let mut table = tx.open_table(&groups::TABLE)?;
        let Some(mut record) = table.get(&group_id)?.map(|g| g.value()) else {
            return Ok(());
        };
        record.name = canonical.name.clone();
        record.description = canonical.description.clone();
        if let Some(count) = canonical.member_count {
            record.member_count = count;
        }
        if canonical.photo_url.is_some() {
            record.photo_url = canonical.photo_url.clone();
        }
        if let Some(conn) =
            record.connection_mut(canonical.platform, &canonical.platform_id)
        {
            conn.link = Some(canonical.link.clone());
            conn.slug = canonical.urlname.clone();
        }
        table.insert(&group_id, &record)?;
        Ok(())
    }

    /// Record the outcome of a connection sync on both the connection and the
    /// group-level sync config. `error = None` clears previous errors.
    pub fn set_connection_sync_state_tx(
        tx: &WriteTransactionCtx,
        group_id: GroupId,
        platform: Platform,
        platform_id: &str,
        synced_at: Timestamp,
        error: Option<&str>,
    ) -> DbResult<()> {
        let mut table = tx.open_table(&groups::TABLE)?;
        let Some(mut record) = table.get(&group_id)?.map(|g| g.value()) else {
            return Ok(());
        };
        if let Some(conn) = record.connection_mut(platform, platform_id) {
            conn.last_sync_at = Some(synced_at);
            conn.last_error = error.map(ToOwned::to_owned);
        }
        record.sync.last_sync_at = Some(synced_at);
        record.sync.last_error = error.map(ToOwned::to_owned);
        table.insert(&group_id, &record)?;
        Ok(())
    }

    pub async fn get_group(&self, group_id: GroupId) -> DbResult<Option<GroupRecord>> {
        self.read_with(|tx| Self::get_group_tx(tx, group_id)).await
    }

    pub async fn get_group_by_slug(
        &self,
        slug: &str,
    ) -> DbResult<Option<(GroupId, GroupRecord)>> {
        self.read_with(|tx| Self::get_group_by_slug_tx(tx, slug))
            .await
    }

    pub async fn insert_group(&self, group_id: GroupId, record: GroupRecord) -> DbResult<()> {
        self.write_with(|tx| Self::insert_group_tx(tx, group_id, &record))
            .await
    }

    pub async fn list_groups(&self) -> DbResult<Vec<(GroupId, GroupRecord)>> {
        self.read_with(|tx| {
            let table = tx.open_table(&groups::TABLE)?;
            let mut out = Vec::new();
            for entry in table.range(..)? {
                let (k, v) = entry?;
                out.push((k.value(), v.value()));
            }
            Ok(out)
        })
        .await
    }
}
