//! Notification relayer: domain events to the realtime surfaces.
//!
//! Two paths: personal messages addressed to one user, and broadcasts to
//! everyone (currently only the favorite-count ticker). The surfaces are
//! `tokio::sync::broadcast` channels; the web layer subscribes and forwards
//! over its own transport. Unmapped event types are ignored.

use std::sync::Arc;

use agora_core::envelope::{DomainEvent, event_type};
use agora_core::fmt::BoxedError;
use agora_core::id::UserId;
use agora_core::payload;
use agora_db::Database;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tracing::debug;

use crate::dispatch::EventHandler;

const LOG_TARGET: &str = "agora::notify";

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize)]
pub struct PersonalNotification {
    pub user_id: UserId,
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BroadcastNotification {
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: Map<String, Value>,
}

/// The addressable realtime surface. Personal messages carry the target
/// user id; subscribers filter for their own session's user.
#[derive(Clone)]
pub struct Notifier {
    personal_tx: broadcast::Sender<PersonalNotification>,
    broadcast_tx: broadcast::Sender<BroadcastNotification>,
}

impl Notifier {
    pub fn new() -> Self {
        let (personal_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (broadcast_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            personal_tx,
            broadcast_tx,
        }
    }

    pub fn subscribe_personal(&self) -> broadcast::Receiver<PersonalNotification> {
        self.personal_tx.subscribe()
    }

    pub fn subscribe_broadcast(&self) -> broadcast::Receiver<BroadcastNotification> {
        self.broadcast_tx.subscribe()
    }

    pub fn send_personal(&self, notification: PersonalNotification) {
        // Zero receivers just means nobody is connected right now.
        let _ = self.personal_tx.send(notification);
    }

    pub fn send_broadcast(&self, notification: BroadcastNotification) {
        let _ = self.broadcast_tx.send(notification);
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

pub struct NotificationRelayer {
    db: Arc<Database>,
    notifier: Notifier,
}

impl NotificationRelayer {
    pub fn new(db: Arc<Database>, notifier: Notifier) -> Self {
        Self { db, notifier }
    }

    fn personal_target(event: &DomainEvent) -> Option<UserId> {
        event
            .payload
            .get("userId")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
            .or(event.metadata.user_id)
    }

    async fn broadcast_favorite_count(&self, event: &DomainEvent) -> Result<(), BoxedError> {
        let Some(group_slug) = event.payload.get("groupSlug").and_then(Value::as_str) else {
            return Ok(());
        };
        let Some((group_id, _)) = self.db.get_group_by_slug(group_slug).await? else {
            return Ok(());
        };
        // Recompute rather than trust the event payload; concurrent
        // adds/removes make any carried count stale.
        let favorite_count = self.db.favorite_count(group_id).await?;
        self.notifier.send_broadcast(BroadcastNotification {
            kind: "favorite.count_changed".to_string(),
            payload: payload! {
                "groupSlug" => group_slug,
                "favoriteCount" => favorite_count,
            },
        });
        Ok(())
    }
}

#[async_trait]
impl EventHandler for NotificationRelayer {
    fn name(&self) -> &'static str {
        "notifications"
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), BoxedError> {
        match event.event_type.as_str() {
            // Personal messages: fixed payload shape per type, forwarded to
            // the user the event names.
            event_type::ACHIEVEMENT_UNLOCKED
            | event_type::BADGE_ISSUED
            | event_type::USER_BADGE_CLAIMED
            | event_type::USER_SCORE_CHANGED
            | event_type::ONBOARDING_STEP_COMPLETED
            | event_type::ONBOARDING_COMPLETED => {
                let Some(user_id) = Self::personal_target(event) else {
                    return Ok(());
                };
                self.notifier.send_personal(PersonalNotification {
                    user_id,
                    kind: event.event_type.clone(),
                    payload: event.payload.clone(),
                });
            }
            event_type::USER_FAVORITE_ADDED | event_type::USER_FAVORITE_REMOVED => {
                self.broadcast_favorite_count(event).await?;
            }
            other => {
                debug!(target: LOG_TARGET, event_type = %other, "No notification mapping");
            }
        }
        Ok(())
    }
}
