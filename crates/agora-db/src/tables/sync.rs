use agora_core::id::{GroupId, SyncLogId};
use agora_core::{Platform, Timestamp};
use bincode::{Decode, Encode};
use serde::Serialize;

#[derive(Encode, Decode, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Running,
    Success,
    Failed,
}

#[derive(Encode, Decode, Serialize, Debug, Clone)]
pub struct SyncLogRecord {
    pub id: SyncLogId,
    pub group_id: GroupId,
    pub platform: Platform,
    pub platform_id: String,
    pub status: SyncStatus,
    pub started_at: Timestamp,
    pub completed_at: Option<Timestamp>,
    pub events_created: u32,
    pub events_updated: u32,
    pub events_deleted: u32,
    pub error: Option<String>,
}
