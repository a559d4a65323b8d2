use agora_core::Timestamp;
use bincode::{Decode, Encode};
use serde::Serialize;

#[derive(Encode, Decode, Serialize, Debug, Clone)]
pub struct WebhookRecord {
    pub url: String,
    pub secret: String,
    /// Subscribed event types; `"*"` subscribes to everything.
    pub event_types: Vec<String>,
    pub active: bool,
    pub description: Option<String>,
    pub created_at: Timestamp,
}

impl WebhookRecord {
    pub fn subscribes_to(&self, event_type: &str) -> bool {
        self.event_types
            .iter()
            .any(|t| t == "*" || t == event_type)
    }
}

#[derive(Encode, Decode, Serialize, Debug, Clone)]
pub struct DeliveryRecord {
    pub event_type: String,
    /// HTTP status; 0 when the request never completed.
    pub status_code: u16,
    /// Response body, truncated to 4 KiB.
    pub response_body: String,
    pub attempt: u32,
    pub delivered_at: Timestamp,
    pub error: Option<String>,
}
