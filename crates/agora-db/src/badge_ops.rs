use agora_core::Timestamp;
use agora_core::id::{BadgeId, UserId};
use redb_bincode::ReadTransaction;

use crate::{
    BadgeRecord, ClaimLinkRecord, Database, DbResult, UserBadgeRecord, WriteTransactionCtx,
    badges, badges_by_slug, claim_links, user_badges,
};

impl Database {
    pub fn insert_badge_tx(
        tx: &WriteTransactionCtx,
        badge_id: BadgeId,
        record: &BadgeRecord,
    ) -> DbResult<()> {
        tx.open_table(&badges::TABLE)?.insert(&badge_id, record)?;
        tx.open_table(&badges_by_slug::TABLE)?
            .insert(&record.slug, &badge_id)?;
        Ok(())
    }

    pub fn get_badge_by_slug_tx(
        tx: &ReadTransaction,
        slug: &str,
    ) -> DbResult<Option<(BadgeId, BadgeRecord)>> {
        let Some(badge_id) = tx
            .open_table(&badges_by_slug::TABLE)?
            .get(&slug.to_string())?
            .map(|g| g.value())
        else {
            return Ok(None);
        };
        Ok(tx
            .open_table(&badges::TABLE)?
            .get(&badge_id)?
            .map(|g| (badge_id, g.value())))
    }

    /// Look up a badge by slug, creating a minimal platform-wide badge when
    /// absent (achievement auto-award path).
    pub fn ensure_badge_by_slug_tx(
        tx: &WriteTransactionCtx,
        slug: &str,
        name: &str,
        points: u32,
        now: Timestamp,
    ) -> DbResult<(BadgeId, BadgeRecord)> {
        let mut by_slug = tx.open_table(&badges_by_slug::TABLE)?;
        let mut badges_table = tx.open_table(&badges::TABLE)?;

        if let Some(badge_id) = by_slug.get(&slug.to_string())?.map(|g| g.value()) {
            if let Some(record) = badges_table.get(&badge_id)?.map(|g| g.value()) {
                return Ok((badge_id, record));
            }
        }

        let badge_id = BadgeId::random();
        let record = BadgeRecord {
            slug: slug.to_string(),
            name: name.to_string(),
            description: None,
            icon: None,
            color: None,
            points,
            sort_order: 0,
            hidden: false,
            group_id: None,
            created_at: now,
        };
        badges_table.insert(&badge_id, &record)?;
        by_slug.insert(&record.slug, &badge_id)?;
        Ok((badge_id, record))
    }

    /// Award a badge; no-op when the pair already exists. Returns true on a
    /// new award.
    pub fn award_badge_tx(
        tx: &WriteTransactionCtx,
        user_id: UserId,
        badge_id: BadgeId,
        awarded_by: Option<UserId>,
        now: Timestamp,
    ) -> DbResult<bool> {
        let mut table = tx.open_table(&user_badges::TABLE)?;
        if table.get(&(user_id, badge_id))?.is_some() {
            return Ok(false);
        }
        table.insert(
            &(user_id, badge_id),
            &UserBadgeRecord {
                awarded_at: now,
                awarded_by,
            },
        )?;
        Ok(true)
    }

    pub fn get_badge_write_tx(
        tx: &WriteTransactionCtx,
        badge_id: BadgeId,
    ) -> DbResult<Option<BadgeRecord>> {
        Ok(tx
            .open_table(&badges::TABLE)?
            .get(&badge_id)?
            .map(|g| g.value()))
    }

    pub fn user_has_badge_tx(
        tx: &WriteTransactionCtx,
        user_id: UserId,
        badge_id: BadgeId,
    ) -> DbResult<bool> {
        Ok(tx
            .open_table(&user_badges::TABLE)?
            .get(&(user_id, badge_id))?
            .is_some())
    }

    /// Platform-wide badge point total, excluding group-scoped badges.
    pub fn user_badge_points_tx(tx: &WriteTransactionCtx, user_id: UserId) -> DbResult<u32> {
        let user_badges_table = tx.open_table(&user_badges::TABLE)?;
        let badges_table = tx.open_table(&badges::TABLE)?;

        let mut total = 0u32;
        for entry in
            user_badges_table.range((user_id, BadgeId::ZERO)..=(user_id, BadgeId::MAX))?
        {
            let (k, _) = entry?;
            let badge_id = k.value().1;
            if let Some(badge) = badges_table.get(&badge_id)?.map(|g| g.value()) {
                if badge.group_id.is_none() {
                    total = total.saturating_add(badge.points);
                }
            }
        }
        Ok(total)
    }

    pub fn get_claim_link_tx(
        tx: &WriteTransactionCtx,
        code: &str,
    ) -> DbResult<Option<ClaimLinkRecord>> {
        Ok(tx
            .open_table(&claim_links::TABLE)?
            .get(&code.to_string())?
            .map(|g| g.value()))
    }

    /// Bump `current_uses` only while below `max_uses`. Returns false when
    /// the link is already exhausted; concurrent claims serialize on the
    /// write transaction, so the counter never exceeds the cap.
    pub fn increment_claim_uses_tx(tx: &WriteTransactionCtx, code: &str) -> DbResult<bool> {
        let mut table = tx.open_table(&claim_links::TABLE)?;
        let key = code.to_string();
        let Some(mut record) = table.get(&key)?.map(|g| g.value()) else {
            return Ok(false);
        };
        if record.is_exhausted() {
            return Ok(false);
        }
        record.current_uses += 1;
        table.insert(&key, &record)?;
        Ok(true)
    }

    pub async fn insert_claim_link(&self, code: &str, record: ClaimLinkRecord) -> DbResult<()> {
        self.write_with(|tx| {
            tx.open_table(&claim_links::TABLE)?
                .insert(&code.to_string(), &record)?;
            Ok(())
        })
        .await
    }

    pub async fn get_claim_link(&self, code: &str) -> DbResult<Option<ClaimLinkRecord>> {
        self.read_with(|tx| {
            Ok(tx
                .open_table(&claim_links::TABLE)?
                .get(&code.to_string())?
                .map(|g| g.value()))
        })
        .await
    }

    pub async fn insert_badge(&self, badge_id: BadgeId, record: BadgeRecord) -> DbResult<()> {
        self.write_with(|tx| Self::insert_badge_tx(tx, badge_id, &record))
            .await
    }

    pub async fn get_badge(&self, badge_id: BadgeId) -> DbResult<Option<BadgeRecord>> {
        self.read_with(|tx| {
            Ok(tx
                .open_table(&badges::TABLE)?
                .get(&badge_id)?
                .map(|g| g.value()))
        })
        .await
    }

    /// Badges visible in the public directory.
    pub async fn list_directory_badges(&self) -> DbResult<Vec<(BadgeId, BadgeRecord)>> {
        self.read_with(|tx| {
            let table = tx.open_table(&badges::TABLE)?;
            let mut out = Vec::new();
            for entry in table.range(..)? {
                let (k, v) = entry?;
                let record = v.value();
                if !record.hidden {
                    out.push((k.value(), record));
                }
            }
            out.sort_by_key(|(_, r)| r.sort_order);
            Ok(out)
        })
        .await
    }

    pub async fn list_user_badges(
        &self,
        user_id: UserId,
    ) -> DbResult<Vec<(BadgeId, BadgeRecord, UserBadgeRecord)>> {
        self.read_with(|tx| {
            let user_badges_table = tx.open_table(&user_badges::TABLE)?;
            let badges_table = tx.open_table(&badges::TABLE)?;
            let mut out = Vec::new();
            for entry in
                user_badges_table.range((user_id, BadgeId::ZERO)..=(user_id, BadgeId::MAX))?
            {
                let (k, v) = entry?;
                let badge_id = k.value().1;
                if let Some(badge) = badges_table.get(&badge_id)?.map(|g| g.value()) {
                    out.push((badge_id, badge, v.value()));
                }
            }
            Ok(out)
        })
        .await
    }
}
