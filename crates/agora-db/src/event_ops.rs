use agora_core::canonical::{CanonicalEvent, EventStatus};
use agora_core::id::{EventId, GroupId, VenueId};
use agora_core::{Platform, Timestamp};
use redb_bincode::ReadTransaction;

use crate::{
    Database, DbResult, EventRecord, WriteTransactionCtx, events, events_by_group,
    events_by_platform,
};

/// Outcome of an upsert keyed by `(platform, platform_id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created(EventId),
    Updated(EventId),
}

impl UpsertOutcome {
    pub fn event_id(self) -> EventId {
        match self {
            UpsertOutcome::Created(id) | UpsertOutcome::Updated(id) => id,
        }
    }
}

impl Database {
    /// Upsert a canonical event.
    ///
    /// The `(platform, platform_id)` index is consulted inside the same write
    /// transaction that inserts, so a concurrent sync of the same upstream
    /// event serializes into insert-then-update and never duplicates the row.
    pub fn upsert_event_by_platform_tx(
        tx: &WriteTransactionCtx,
        canonical: &CanonicalEvent,
        group_id: GroupId,
        venue_id: Option<VenueId>,
        now: Timestamp,
    ) -> DbResult<UpsertOutcome> {
        let mut by_platform = tx.open_table(&events_by_platform::TABLE)?;
        let mut events_table = tx.open_table(&events::TABLE)?;
        let mut by_group = tx.open_table(&events_by_group::TABLE)?;

        let index_key = (canonical.platform, canonical.platform_id.clone());

        if let Some(event_id) = by_platform.get(&index_key)?.map(|g| g.value()) {
            let Some(mut record) = events_table.get(&event_id)?.map(|g| g.value()) else {
                // Dangling index entry; rebuild the row under the same id.
                let record = EventRecord::from_canonical(canonical, group_id, venue_id, now);
                events_table.insert(&event_id, &record)?;
                by_group.insert(&(group_id, event_id), &())?;
                return Ok(UpsertOutcome::Updated(event_id));
            };
            record.apply_canonical(canonical, venue_id, now);
            events_table.insert(&event_id, &record)?;
            return Ok(UpsertOutcome::Updated(event_id));
        }

        let event_id = EventId::random();
        let record = EventRecord::from_canonical(canonical, group_id, venue_id, now);
        events_table.insert(&event_id, &record)?;
        by_platform.insert(&index_key, &event_id)?;
        by_group.insert(&(group_id, event_id), &())?;
        Ok(UpsertOutcome::Created(event_id))
    }

    /// Active events starting at or after `now`, for one group. Deletion
    /// inference only ever considers these.
    pub fn list_future_active_events_by_group_tx(
        tx: &WriteTransactionCtx,
        group_id: GroupId,
        now: Timestamp,
    ) -> DbResult<Vec<(EventId, EventRecord)>> {
        let by_group = tx.open_table(&events_by_group::TABLE)?;
        let events_table = tx.open_table(&events::TABLE)?;

        let mut out = Vec::new();
        for entry in by_group.range((group_id, EventId::ZERO)..=(group_id, EventId::MAX))? {
            let (k, _) = entry?;
            let event_id = k.value().1;
            if let Some(record) = events_table.get(&event_id)?.map(|g| g.value()) {
                if record.status == EventStatus::Active && now <= record.start_time {
                    out.push((event_id, record));
                }
            }
        }
        Ok(out)
    }

    pub fn cancel_event_tx(tx: &WriteTransactionCtx, event_id: EventId) -> DbResult<()> {
        let mut events_table = tx.open_table(&events::TABLE)?;
        let maybe_record = events_table.get(&event_id)?.map(|g| g.value());
        if let Some(mut record) = maybe_record {
            record.status = EventStatus::Cancelled;
            events_table.insert(&event_id, &record)?;
        }
        Ok(())
    }

    /// Same lookup for callers already inside a write transaction.
    pub fn get_event_write_tx(
        tx: &WriteTransactionCtx,
        event_id: EventId,
    ) -> DbResult<Option<EventRecord>> {
        Ok(tx
            .open_table(&events::TABLE)?
            .get(&event_id)?
            .map(|g| g.value()))
    }

    pub fn get_event_tx(tx: &ReadTransaction, event_id: EventId) -> DbResult<Option<EventRecord>> {
        Ok(tx
            .open_table(&events::TABLE)?
            .get(&event_id)?
            .map(|g| g.value()))
    }

    pub fn get_event_by_platform_tx(
        tx: &ReadTransaction,
        platform: Platform,
        platform_id: &str,
    ) -> DbResult<Option<(EventId, EventRecord)>> {
        let Some(event_id) = tx
            .open_table(&events_by_platform::TABLE)?
            .get(&(platform, platform_id.to_string()))?
            .map(|g| g.value())
        else {
            return Ok(None);
        };
        Ok(Self::get_event_tx(tx, event_id)?.map(|record| (event_id, record)))
    }

    pub async fn get_event(&self, event_id: EventId) -> DbResult<Option<EventRecord>> {
        self.read_with(|tx| Self::get_event_tx(tx, event_id)).await
    }

    /// Upcoming active events across all groups, soonest first.
    pub async fn list_upcoming_events(
        &self,
        now: Timestamp,
        limit: usize,
    ) -> DbResult<Vec<(EventId, EventRecord)>> {
        self.read_with(|tx| {
            let events_table = tx.open_table(&events::TABLE)?;
            let mut upcoming = Vec::new();
            for entry in events_table.range(..)? {
                let (k, v) = entry?;
                let record = v.value();
                if record.status == EventStatus::Active && now <= record.start_time {
                    upcoming.push((k.value(), record));
                }
            }
            upcoming.sort_by_key(|(_, record)| record.start_time);
            upcoming.truncate(limit);
            Ok(upcoming)
        })
        .await
    }

    pub async fn list_events_by_group(
        &self,
        group_id: GroupId,
    ) -> DbResult<Vec<(EventId, EventRecord)>> {
        self.read_with(|tx| {
            let by_group = tx.open_table(&events_by_group::TABLE)?;
            let events_table = tx.open_table(&events::TABLE)?;
            let mut out = Vec::new();
            for entry in by_group.range((group_id, EventId::ZERO)..=(group_id, EventId::MAX))? {
                let (k, _) = entry?;
                let event_id = k.value().1;
                if let Some(record) = events_table.get(&event_id)?.map(|g| g.value()) {
                    out.push((event_id, record));
                }
            }
            Ok(out)
        })
        .await
    }
}
