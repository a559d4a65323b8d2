use agora_core::Timestamp;
use bincode::{Decode, Encode};
use serde::Serialize;

#[derive(Encode, Decode, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RsvpStatus {
    Confirmed,
    Waitlisted,
    Cancelled,
}

#[derive(Encode, Decode, Serialize, Debug, Clone)]
pub struct RsvpRecord {
    pub status: RsvpStatus,
    pub rsvp_at: Timestamp,
    pub waitlist_position: Option<u32>,
    pub cancelled_at: Option<Timestamp>,
}

impl RsvpRecord {
    pub fn is_active(&self) -> bool {
        matches!(self.status, RsvpStatus::Confirmed | RsvpStatus::Waitlisted)
    }
}

#[derive(Encode, Decode, Serialize, Debug, Clone)]
pub struct CheckinCodeRecord {
    pub max_uses: Option<u32>,
    pub current_uses: u32,
    pub created_at: Timestamp,
}

#[derive(Encode, Decode, Serialize, Debug, Clone)]
pub struct CheckinRecord {
    pub code: String,
    pub checked_in_at: Timestamp,
}

#[derive(Encode, Decode, Serialize, Debug, Clone)]
pub struct FavoriteRecord {
    pub favorited_at: Timestamp,
}
