//! Domain-event envelope.
//!
//! Event types are open-ended reverse-DNS strings; the payload is a
//! string-keyed JSON map read defensively by handlers. New types can be added
//! at runtime (e.g. achievement triggers created through the admin surface)
//! without code changes, so no closed enum here.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Timestamp;
use crate::id::UserId;

/// Well-known event types emitted by the core.
///
/// Consumers must tolerate types not listed here.
pub mod event_type {
    pub const EVENTS_SYNCED: &str = "events.synced";
    pub const SYNC_COMPLETED: &str = "sync.completed";
    pub const EVENT_RSVP: &str = "event.rsvp";
    pub const EVENT_RSVP_CANCELLED: &str = "event.rsvp_cancelled";
    pub const EVENT_CHECKIN: &str = "event.checkin";
    pub const USER_FAVORITE_ADDED: &str = "user.favorite_added";
    pub const USER_FAVORITE_REMOVED: &str = "user.favorite_removed";
    pub const USER_BADGE_CLAIMED: &str = "user.badge_claimed";
    pub const USER_SCORE_CHANGED: &str = "user.score_changed";
    pub const USER_PROFILE_UPDATED: &str = "user.profile_updated";
    pub const BADGE_ISSUED: &str = "badge.issued";
    pub const ACHIEVEMENT_UNLOCKED: &str = "achievement.unlocked";
    pub const ONBOARDING_STEP_COMPLETED: &str = "onboarding.step_completed";
    pub const ONBOARDING_COMPLETED: &str = "onboarding.completed";
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct EventMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    /// Producing subsystem, e.g. `sync`, `rsvp`, `claim`.
    pub source: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DomainEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub payload: Map<String, Value>,
    pub metadata: EventMetadata,
    pub timestamp: Timestamp,
}

impl DomainEvent {
    /// Build an envelope stamped `now`.
    pub fn new(event_type: impl Into<String>, payload: Map<String, Value>) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
            metadata: EventMetadata::default(),
            timestamp: Timestamp::now(),
        }
    }

    pub fn with_user(mut self, user_id: UserId) -> Self {
        self.metadata.user_id = Some(user_id);
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.metadata.source = source.into();
        self
    }

    /// The users this envelope concerns: explicit metadata principal first,
    /// then a `userId` payload field if it names someone else.
    pub fn user_ids(&self) -> Vec<UserId> {
        let mut ids = Vec::new();
        if let Some(id) = self.metadata.user_id {
            ids.push(id);
        }
        if let Some(id) = self
            .payload
            .get("userId")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
        {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }
}

/// Shorthand for assembling a JSON payload map.
#[macro_export]
macro_rules! payload {
    ($($key:expr => $value:expr),* $(,)?) => {{
        #[allow(unused_mut)]
        let mut map = ::serde_json::Map::new();
        $(
            map.insert(($key).to_string(), ::serde_json::json!($value));
        )*
        map
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_ids_deduplicates_metadata_and_payload() {
        let user = UserId::random();
        let event = DomainEvent::new(
            event_type::EVENT_CHECKIN,
            crate::payload! { "userId" => user.to_string() },
        )
        .with_user(user);
        assert_eq!(event.user_ids(), vec![user]);
    }

    #[test]
    fn user_ids_collects_both_principals() {
        let actor = UserId::random();
        let subject = UserId::random();
        let event = DomainEvent::new(
            event_type::BADGE_ISSUED,
            crate::payload! { "userId" => subject.to_string() },
        )
        .with_user(actor);
        assert_eq!(event.user_ids(), vec![actor, subject]);
    }

    #[test]
    fn envelope_serializes_type_field() {
        let event = DomainEvent::new(event_type::SYNC_COMPLETED, crate::payload! {});
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "sync.completed");
        assert!(json["payload"].is_object());
    }
}
