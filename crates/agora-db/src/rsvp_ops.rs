use agora_core::Timestamp;
use agora_core::id::{EventId, UserId};
use redb_bincode::ReadTransaction;

use crate::{
    Database, DbResult, RsvpRecord, RsvpStatus, WriteTransactionCtx, events, rsvps,
};

impl Database {
    pub fn get_rsvp_tx(
        tx: &WriteTransactionCtx,
        event_id: EventId,
        user_id: UserId,
    ) -> DbResult<Option<RsvpRecord>> {
        Ok(tx
            .open_table(&rsvps::TABLE)?
            .get(&(event_id, user_id))?
            .map(|g| g.value()))
    }

    pub fn insert_rsvp_tx(
        tx: &WriteTransactionCtx,
        event_id: EventId,
        user_id: UserId,
        record: &RsvpRecord,
    ) -> DbResult<()> {
        tx.open_table(&rsvps::TABLE)?
            .insert(&(event_id, user_id), record)?;
        Ok(())
    }

    pub fn remove_rsvp_tx(
        tx: &WriteTransactionCtx,
        event_id: EventId,
        user_id: UserId,
    ) -> DbResult<()> {
        tx.open_table(&rsvps::TABLE)?.remove(&(event_id, user_id))?;
        Ok(())
    }

    pub fn count_rsvps_tx(
        tx: &WriteTransactionCtx,
        event_id: EventId,
        status: RsvpStatus,
    ) -> DbResult<u32> {
        let table = tx.open_table(&rsvps::TABLE)?;
        let mut count = 0u32;
        for entry in table.range((event_id, UserId::ZERO)..=(event_id, UserId::MAX))? {
            let (_, v) = entry?;
            if v.value().status == status {
                count += 1;
            }
        }
        Ok(count)
    }

    /// The waitlisted row with the lowest position, if any.
    pub fn head_of_waitlist_tx(
        tx: &WriteTransactionCtx,
        event_id: EventId,
    ) -> DbResult<Option<(UserId, RsvpRecord)>> {
        let table = tx.open_table(&rsvps::TABLE)?;
        let mut head: Option<(UserId, RsvpRecord)> = None;
        for entry in table.range((event_id, UserId::ZERO)..=(event_id, UserId::MAX))? {
            let (k, v) = entry?;
            let record = v.value();
            if record.status != RsvpStatus::Waitlisted {
                continue;
            }
            let better = match &head {
                None => true,
                Some((_, best)) => {
                    record.waitlist_position.unwrap_or(u32::MAX)
                        < best.waitlist_position.unwrap_or(u32::MAX)
                }
            };
            if better {
                head = Some((k.value().1, record));
            }
        }
        Ok(head)
    }

    /// Conditional promotion: confirm `user_id` only if still waitlisted.
    /// Two concurrent cancels serialize here; the second finds the row no
    /// longer waitlisted and promotes nobody.
    pub fn promote_if_waitlisted_tx(
        tx: &WriteTransactionCtx,
        event_id: EventId,
        user_id: UserId,
        now: Timestamp,
    ) -> DbResult<bool> {
        let mut table = tx.open_table(&rsvps::TABLE)?;
        let key = (event_id, user_id);
        let Some(mut record) = table.get(&key)?.map(|g| g.value()) else {
            return Ok(false);
        };
        if record.status != RsvpStatus::Waitlisted {
            return Ok(false);
        }
        record.status = RsvpStatus::Confirmed;
        record.waitlist_position = None;
        record.rsvp_at = now;
        table.insert(&key, &record)?;
        Ok(true)
    }

    /// Reset the event's cached `rsvp_count` to the actual number of
    /// confirmed rows (self-correcting, never decrement-in-place).
    pub fn recount_event_rsvps_tx(tx: &WriteTransactionCtx, event_id: EventId) -> DbResult<u32> {
        let confirmed = Self::count_rsvps_tx(tx, event_id, RsvpStatus::Confirmed)?;
        let mut events_table = tx.open_table(&events::TABLE)?;
        let maybe_record = events_table.get(&event_id)?.map(|g| g.value());
        if let Some(mut record) = maybe_record {
            record.rsvp_count = confirmed;
            events_table.insert(&event_id, &record)?;
        }
        Ok(confirmed)
    }

    pub async fn get_rsvp(
        &self,
        event_id: EventId,
        user_id: UserId,
    ) -> DbResult<Option<RsvpRecord>> {
        self.read_with(|tx| {
            Ok(tx
                .open_table(&rsvps::TABLE)?
                .get(&(event_id, user_id))?
                .map(|g| g.value()))
        })
        .await
    }

    pub async fn list_event_rsvps(
        &self,
        event_id: EventId,
    ) -> DbResult<Vec<(UserId, RsvpRecord)>> {
        self.read_with(|tx| Self::list_event_rsvps_read_tx(tx, event_id))
            .await
    }

    pub fn list_event_rsvps_read_tx(
        tx: &ReadTransaction,
        event_id: EventId,
    ) -> DbResult<Vec<(UserId, RsvpRecord)>> {
        let table = tx.open_table(&rsvps::TABLE)?;
        let mut out = Vec::new();
        for entry in table.range((event_id, UserId::ZERO)..=(event_id, UserId::MAX))? {
            let (k, v) = entry?;
            out.push((k.value().1, v.value()));
        }
        Ok(out)
    }
}
