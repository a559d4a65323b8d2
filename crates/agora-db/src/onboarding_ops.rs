use agora_core::Timestamp;
use agora_core::id::UserId;

use crate::{
    Database, DbResult, OnboardingStepRecord, UserOnboardingRecord, WriteTransactionCtx,
    onboarding_steps, user_onboarding,
};

impl Database {
    pub fn upsert_onboarding_step_tx(
        tx: &WriteTransactionCtx,
        step: &str,
        record: &OnboardingStepRecord,
    ) -> DbResult<()> {
        tx.open_table(&onboarding_steps::TABLE)?
            .insert(&step.to_string(), record)?;
        Ok(())
    }

    /// Steps auto-completed by the given domain event type.
    pub fn onboarding_steps_for_event_tx(
        tx: &WriteTransactionCtx,
        event_type: &str,
    ) -> DbResult<Vec<(String, OnboardingStepRecord)>> {
        let table = tx.open_table(&onboarding_steps::TABLE)?;
        let mut out = Vec::new();
        for entry in table.range::<String>(..)? {
            let (k, v) = entry?;
            let record = v.value();
            if record.event_key.as_deref() == Some(event_type) {
                out.push((k.value(), record));
            }
        }
        Ok(out)
    }

    /// Mark a step complete; true only on the first completion.
    pub fn complete_onboarding_step_tx(
        tx: &WriteTransactionCtx,
        user_id: UserId,
        step: &str,
        now: Timestamp,
    ) -> DbResult<bool> {
        let mut table = tx.open_table(&user_onboarding::TABLE)?;
        let key = (user_id, step.to_string());
        if table.get(&key)?.is_some() {
            return Ok(false);
        }
        table.insert(&key, &UserOnboardingRecord { completed_at: now })?;
        Ok(true)
    }

    /// Whether every defined step is complete for this user.
    pub fn onboarding_complete_tx(tx: &WriteTransactionCtx, user_id: UserId) -> DbResult<bool> {
        let steps_table = tx.open_table(&onboarding_steps::TABLE)?;
        let user_table = tx.open_table(&user_onboarding::TABLE)?;
        for entry in steps_table.range::<String>(..)? {
            let (k, _) = entry?;
            if user_table.get(&(user_id, k.value()))?.is_none() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub async fn upsert_onboarding_step(
        &self,
        step: &str,
        record: OnboardingStepRecord,
    ) -> DbResult<()> {
        self.write_with(|tx| Self::upsert_onboarding_step_tx(tx, step, &record))
            .await
    }
}
