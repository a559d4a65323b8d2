//! Achievement engine: the wildcard handler driving gamification.
//!
//! For every domain event and every user it names, this handler:
//! auto-completes matching onboarding steps, advances matching achievement
//! progress (counter or gauge), latches completions, auto-awards badges,
//! recomputes the platform-wide score, and grants entitlements.
//!
//! All store writes are insert-if-absent or conditional updates, so
//! at-least-once delivery recomputes to the same state: `completed_at` and
//! `awarded_at` latch exactly once, progress never decrements.

use std::sync::Arc;

use agora_core::envelope::{DomainEvent, event_type};
use agora_core::fmt::BoxedError;
use agora_core::id::UserId;
use agora_core::{Timestamp, payload};
use agora_db::{AchievementRecord, Database, DbResult, ProgressMode};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::bus::BusSender;
use crate::conditions::{Extracted, eval_conditions, extract_path};
use crate::dispatch::EventHandler;

const LOG_TARGET: &str = "agora::achievements";

type Catalog = Arc<Vec<(String, AchievementRecord)>>;

pub struct AchievementEngine {
    db: Arc<Database>,
    bus: BusSender,
    /// Definition cache scoped to one queue batch; dropped in `end_batch`.
    catalog: Mutex<Option<Catalog>>,
}

impl AchievementEngine {
    pub fn new(db: Arc<Database>, bus: BusSender) -> Self {
        Self {
            db,
            bus,
            catalog: Mutex::new(None),
        }
    }

    async fn batch_catalog(&self) -> DbResult<Catalog> {
        let mut guard = self.catalog.lock().await;
        if let Some(catalog) = &*guard {
            return Ok(catalog.clone());
        }
        let catalog: Catalog = Arc::new(self.db.load_enabled_achievements().await?);
        *guard = Some(catalog.clone());
        Ok(catalog)
    }

    async fn process_onboarding(&self, event: &DomainEvent, user_id: UserId) -> DbResult<()> {
        let now = Timestamp::now();
        let event_key = event.event_type.clone();

        let emitted = self
            .db
            .write_with(|tx| {
                let mut emitted = Vec::new();
                let steps = Database::onboarding_steps_for_event_tx(tx, &event_key)?;
                for (step, definition) in steps {
                    if Database::complete_onboarding_step_tx(tx, user_id, &step, now)? {
                        emitted.push(
                            DomainEvent::new(
                                event_type::ONBOARDING_STEP_COMPLETED,
                                payload! {
                                    "userId" => user_id.to_string(),
                                    "step" => step,
                                    "stepName" => definition.name,
                                },
                            )
                            .with_user(user_id)
                            .with_source("onboarding"),
                        );
                        if Database::onboarding_complete_tx(tx, user_id)? {
                            emitted.push(
                                DomainEvent::new(
                                    event_type::ONBOARDING_COMPLETED,
                                    payload! { "userId" => user_id.to_string() },
                                )
                                .with_user(user_id)
                                .with_source("onboarding"),
                            );
                        }
                    }
                }
                Ok(emitted)
            })
            .await?;

        for event in emitted {
            self.bus.emit_nowait(event);
        }
        Ok(())
    }

    async fn process_achievement(
        &self,
        event: &DomainEvent,
        user_id: UserId,
        key: &str,
        definition: &AchievementRecord,
    ) -> DbResult<()> {
        if !eval_conditions(definition.conditions.as_deref(), &event.payload) {
            debug!(
                target: LOG_TARGET,
                achievement = %key,
                user = %user_id,
                "Conditions not met"
            );
            return Ok(());
        }

        let now = Timestamp::now();
        let definition = definition.clone();
        let key = key.to_string();

        let gauge_value = match definition.progress_mode {
            ProgressMode::Counter => 0,
            ProgressMode::Gauge => definition
                .gauge_field
                .as_deref()
                .map(|field| match extract_path(&event.payload, field) {
                    Extracted::Present(Value::Number(n)) => {
                        n.as_u64().unwrap_or_else(|| {
                            n.as_f64().map(|f| f.max(0.0) as u64).unwrap_or(0)
                        })
                    }
                    // Missing or non-numeric reads as zero.
                    _ => 0,
                })
                .unwrap_or(0),
        };

        let emitted = self
            .db
            .write_with(|tx| {
                let mut emitted = Vec::new();

                match definition.progress_mode {
                    ProgressMode::Counter => {
                        Database::ensure_progress_tx(
                            tx,
                            user_id,
                            &key,
                            0,
                            definition.target_value,
                            now,
                        )?;
                        Database::increment_progress_tx(tx, user_id, &key, now)?;
                    }
                    ProgressMode::Gauge => {
                        Database::ensure_progress_tx(
                            tx,
                            user_id,
                            &key,
                            gauge_value,
                            definition.target_value,
                            now,
                        )?;
                        Database::set_gauge_progress_tx(tx, user_id, &key, gauge_value, now)?;
                    }
                }

                // Completion check reads the row back; the latch fires for
                // exactly one invocation.
                if !Database::complete_progress_tx(tx, user_id, &key, now)? {
                    return Ok(emitted);
                }

                info!(
                    target: LOG_TARGET,
                    achievement = %key,
                    user = %user_id,
                    "Achievement unlocked"
                );
                emitted.push(
                    DomainEvent::new(
                        event_type::ACHIEVEMENT_UNLOCKED,
                        payload! {
                            "userId" => user_id.to_string(),
                            "achievementKey" => key.clone(),
                            "achievementName" => definition.name.clone(),
                            "icon" => definition.icon.clone(),
                            "color" => definition.color.clone(),
                            "points" => definition.points,
                        },
                    )
                    .with_user(user_id)
                    .with_source("achievements"),
                );

                if let Some(badge_slug) = &definition.badge_slug {
                    let (badge_id, badge) = Database::ensure_badge_by_slug_tx(
                        tx,
                        badge_slug,
                        &definition.name,
                        definition.points,
                        now,
                    )?;
                    if Database::award_badge_tx(tx, user_id, badge_id, None, now)? {
                        emitted.push(
                            DomainEvent::new(
                                event_type::BADGE_ISSUED,
                                payload! {
                                    "userId" => user_id.to_string(),
                                    "badgeId" => badge_id.to_string(),
                                    "badgeSlug" => badge.slug,
                                    "badgeName" => badge.name,
                                },
                            )
                            .with_user(user_id)
                            .with_source("achievements"),
                        );
                        let total = Database::user_badge_points_tx(tx, user_id)?;
                        emitted.push(
                            DomainEvent::new(
                                event_type::USER_SCORE_CHANGED,
                                payload! {
                                    "userId" => user_id.to_string(),
                                    "totalScore" => total,
                                },
                            )
                            .with_user(user_id)
                            .with_source("achievements"),
                        );
                    }
                }

                if let Some(entitlement) = &definition.entitlement {
                    Database::grant_entitlement_tx(tx, user_id, entitlement, now)?;
                }

                Ok(emitted)
            })
            .await?;

        for event in emitted {
            self.bus.emit_nowait(event);
        }
        Ok(())
    }
}

#[async_trait]
impl EventHandler for AchievementEngine {
    fn name(&self) -> &'static str {
        "achievements"
    }

    async fn begin_batch(&self) {
        *self.catalog.lock().await = None;
    }

    async fn end_batch(&self) {
        *self.catalog.lock().await = None;
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), BoxedError> {
        let user_ids = event.user_ids();
        if user_ids.is_empty() {
            return Ok(());
        }

        let catalog = self.batch_catalog().await?;
        let matching: Vec<_> = catalog
            .iter()
            .filter(|(_, definition)| {
                definition.event_type.as_deref() == Some(event.event_type.as_str())
            })
            .collect();

        for user_id in user_ids {
            self.process_onboarding(event, user_id).await?;
            // Shared event types are processed independently, in definition
            // order; overlapping conditions do not interact.
            for (key, definition) in &matching {
                self.process_achievement(event, user_id, key, definition)
                    .await?;
            }
        }
        Ok(())
    }
}
