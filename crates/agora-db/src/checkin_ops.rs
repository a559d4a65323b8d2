use agora_core::Timestamp;
use agora_core::id::{EventId, UserId};

use crate::{
    CheckinCodeRecord, CheckinRecord, Database, DbResult, WriteTransactionCtx, checkin_codes,
    checkins,
};

/// Why a code redemption was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedeemRefusal {
    UnknownCode,
    Exhausted,
    AlreadyCheckedIn,
}

impl Database {
    pub fn insert_checkin_code_tx(
        tx: &WriteTransactionCtx,
        event_id: EventId,
        code: &str,
        record: &CheckinCodeRecord,
    ) -> DbResult<()> {
        tx.open_table(&checkin_codes::TABLE)?
            .insert(&(event_id, code.to_string()), record)?;
        Ok(())
    }

    /// Redeem a code for one user: verify the code exists and has uses left,
    /// bump the counter, insert the unique `(event, user)` check-in. All in
    /// the caller's transaction, so a burst of concurrent redemptions cannot
    /// overshoot `max_uses`.
    pub fn redeem_checkin_code_tx(
        tx: &WriteTransactionCtx,
        event_id: EventId,
        code: &str,
        user_id: UserId,
        now: Timestamp,
    ) -> DbResult<Result<CheckinRecord, RedeemRefusal>> {
        let mut codes_table = tx.open_table(&checkin_codes::TABLE)?;
        let mut checkins_table = tx.open_table(&checkins::TABLE)?;

        let code_key = (event_id, code.to_string());
        let Some(mut code_record) = codes_table.get(&code_key)?.map(|g| g.value()) else {
            return Ok(Err(RedeemRefusal::UnknownCode));
        };
        if code_record
            .max_uses
            .is_some_and(|max| max <= code_record.current_uses)
        {
            return Ok(Err(RedeemRefusal::Exhausted));
        }
        if checkins_table.get(&(event_id, user_id))?.is_some() {
            return Ok(Err(RedeemRefusal::AlreadyCheckedIn));
        }

        code_record.current_uses += 1;
        codes_table.insert(&code_key, &code_record)?;

        let record = CheckinRecord {
            code: code.to_string(),
            checked_in_at: now,
        };
        checkins_table.insert(&(event_id, user_id), &record)?;
        Ok(Ok(record))
    }

    pub async fn insert_checkin_code(
        &self,
        event_id: EventId,
        code: &str,
        record: CheckinCodeRecord,
    ) -> DbResult<()> {
        self.write_with(|tx| Self::insert_checkin_code_tx(tx, event_id, code, &record))
            .await
    }

    pub async fn get_checkin(
        &self,
        event_id: EventId,
        user_id: UserId,
    ) -> DbResult<Option<CheckinRecord>> {
        self.read_with(|tx| {
            Ok(tx
                .open_table(&checkins::TABLE)?
                .get(&(event_id, user_id))?
                .map(|g| g.value()))
        })
        .await
    }

    pub async fn get_checkin_code(
        &self,
        event_id: EventId,
        code: &str,
    ) -> DbResult<Option<CheckinCodeRecord>> {
        self.read_with(|tx| {
            Ok(tx
                .open_table(&checkin_codes::TABLE)?
                .get(&(event_id, code.to_string()))?
                .map(|g| g.value()))
        })
        .await
    }
}
