use agora_core::Timestamp;
use agora_core::id::{BadgeId, GroupId, UserId};
use bincode::{Decode, Encode};
use serde::Serialize;

#[derive(Encode, Decode, Serialize, Debug, Clone)]
pub struct BadgeRecord {
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub points: u32,
    pub sort_order: u32,
    /// Hidden from the public badge directory.
    pub hidden: bool,
    /// Group-scoped badges don't count towards the platform-wide score.
    pub group_id: Option<GroupId>,
    pub created_at: Timestamp,
}

#[derive(Encode, Decode, Serialize, Debug, Clone)]
pub struct UserBadgeRecord {
    pub awarded_at: Timestamp,
    pub awarded_by: Option<UserId>,
}

#[derive(Encode, Decode, Serialize, Debug, Clone)]
pub struct ClaimLinkRecord {
    pub badge_id: BadgeId,
    pub max_uses: Option<u32>,
    pub current_uses: u32,
    pub expires_at: Option<Timestamp>,
    /// Achievement to force-complete on a successful claim.
    pub achievement_key: Option<String>,
    /// Custom domain event to emit on a successful claim.
    pub custom_event_type: Option<String>,
    /// JSON object merged into the custom event's payload.
    pub custom_payload: Option<String>,
    pub created_at: Timestamp,
}

impl ClaimLinkRecord {
    pub fn is_exhausted(&self) -> bool {
        self.max_uses
            .is_some_and(|max| max <= self.current_uses)
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}
