use agora_core::Timestamp;
use bincode::{Decode, Encode};
use serde::Serialize;

#[derive(Encode, Decode, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProgressMode {
    /// Monotonic: each matching event adds one.
    Counter,
    /// Snapshot: each matching event overwrites with a value extracted from
    /// the payload.
    Gauge,
}

#[derive(Encode, Decode, Serialize, Debug, Clone)]
pub struct AchievementRecord {
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub target_value: u64,
    /// Badge auto-awarded on completion (created on demand if missing).
    pub badge_slug: Option<String>,
    /// Entitlement auto-granted on completion.
    pub entitlement: Option<String>,
    pub points: u32,
    /// Domain event type that advances this achievement.
    pub event_type: Option<String>,
    /// JSON list of `{field, op, value}` predicates, AND-ed.
    pub conditions: Option<String>,
    pub progress_mode: ProgressMode,
    /// Dotted payload path read in gauge mode.
    pub gauge_field: Option<String>,
    pub hidden: bool,
    pub enabled: bool,
}

#[derive(Encode, Decode, Serialize, Debug, Clone)]
pub struct ProgressRecord {
    pub current_value: u64,
    pub target_value: u64,
    /// Latched at most once; the row is frozen afterwards.
    pub completed_at: Option<Timestamp>,
    pub updated_at: Timestamp,
}

#[derive(Encode, Decode, Serialize, Debug, Clone)]
pub struct EntitlementRecord {
    pub granted_at: Timestamp,
}
