use agora_core::Timestamp;
use bincode::{Decode, Encode};
use serde::Serialize;

#[derive(Encode, Decode, Serialize, Debug, Clone)]
pub struct OnboardingStepRecord {
    pub name: String,
    /// Domain event type whose arrival auto-completes this step.
    pub event_key: Option<String>,
    pub sort_order: u32,
}

#[derive(Encode, Decode, Serialize, Debug, Clone)]
pub struct UserOnboardingRecord {
    pub completed_at: Timestamp,
}
