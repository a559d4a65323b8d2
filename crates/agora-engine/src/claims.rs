//! Badge claim service.
//!
//! A claim code resolves to a badge. One claim: validate (exists, not
//! expired, uses left, user doesn't hold the badge), award, bump the usage
//! counter, optionally force-complete a linked achievement, optionally build
//! a caller-defined custom event. Everything runs in one write transaction,
//! so a concurrent burst against `max_uses = N` admits exactly N claims.

use std::sync::Arc;

use agora_core::envelope::{DomainEvent, event_type};
use agora_core::id::UserId;
use agora_core::{Timestamp, payload};
use agora_db::Database;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::{ConflictSnafu, GoneSnafu, ServiceError, ServiceResult};

const LOG_TARGET: &str = "agora::claims";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimOutput {
    pub badge_slug: String,
    pub badge_name: String,
    pub points: u32,
}

pub struct ClaimService {
    db: Arc<Database>,
}

impl ClaimService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub async fn claim_badge(
        &self,
        code: &str,
        user_id: UserId,
    ) -> ServiceResult<(ClaimOutput, Vec<DomainEvent>)> {
        let now = Timestamp::now();
        let code = code.to_string();

        let (output, events) = self
            .db
            .write_with(|tx| {
                let Some(link) = Database::get_claim_link_tx(tx, &code)? else {
                    return Ok(Err(ServiceError::NotFound { entity: "claim link" }));
                };
                if link.is_expired(now) {
                    return Ok(Err(GoneSnafu {
                        message: "claim link expired".to_string(),
                    }
                    .build()));
                }
                if link.is_exhausted() {
                    return Ok(Err(GoneSnafu {
                        message: "claim link exhausted".to_string(),
                    }
                    .build()));
                }

                let Some(badge) = Database::get_badge_write_tx(tx, link.badge_id)? else {
                    return Ok(Err(ServiceError::NotFound { entity: "badge" }));
                };
                if Database::user_has_badge_tx(tx, user_id, link.badge_id)? {
                    return Ok(Err(ConflictSnafu {
                        message: "badge already claimed".to_string(),
                    }
                    .build()));
                }

                Database::award_badge_tx(tx, user_id, link.badge_id, None, now)?;
                // Exhaustion was checked above in this same transaction, so
                // the increment cannot overshoot.
                Database::increment_claim_uses_tx(tx, &code)?;

                if let Some(achievement_key) = &link.achievement_key {
                    let target = Database::get_achievement_write_tx(tx, achievement_key)?
                        .map(|a| a.target_value)
                        .unwrap_or(1);
                    Database::force_complete_progress_tx(tx, user_id, achievement_key, target, now)?;
                }

                let mut events = vec![
                    DomainEvent::new(
                        event_type::USER_BADGE_CLAIMED,
                        payload! {
                            "userId" => user_id.to_string(),
                            "badgeId" => link.badge_id.to_string(),
                            "badgeSlug" => badge.slug.clone(),
                            "code" => code.clone(),
                        },
                    )
                    .with_user(user_id)
                    .with_source("claims"),
                ];

                if let Some(custom_type) = &link.custom_event_type {
                    let mut custom_payload = link
                        .custom_payload
                        .as_deref()
                        .and_then(|raw| {
                            match serde_json::from_str::<serde_json::Map<String, Value>>(raw) {
                                Ok(map) => Some(map),
                                Err(err) => {
                                    warn!(
                                        target: LOG_TARGET,
                                        code = %code,
                                        err = %err,
                                        "Ignoring unparsable custom claim payload"
                                    );
                                    None
                                }
                            }
                        })
                        .unwrap_or_default();
                    custom_payload
                        .insert("userId".to_string(), Value::String(user_id.to_string()));
                    custom_payload.insert(
                        "badgeId".to_string(),
                        Value::String(link.badge_id.to_string()),
                    );
                    custom_payload
                        .insert("badgeSlug".to_string(), Value::String(badge.slug.clone()));
                    events.push(
                        DomainEvent::new(custom_type.clone(), custom_payload)
                            .with_user(user_id)
                            .with_source("claims"),
                    );
                }

                Ok(Ok((
                    ClaimOutput {
                        badge_slug: badge.slug,
                        badge_name: badge.name,
                        points: badge.points,
                    },
                    events,
                )))
            })
            .await??;

        info!(
            target: LOG_TARGET,
            user_id = %user_id,
            badge = %output.badge_slug,
            "Badge claimed"
        );
        Ok((output, events))
    }
}
