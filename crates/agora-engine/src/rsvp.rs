//! RSVP state machine.
//!
//! ```text
//! absent ── create (seats left)  ──▶ confirmed
//! absent ── create (event full)  ──▶ waitlisted (position = waitlisted + 1)
//! confirmed ── cancel ──▶ cancelled, may promote head-of-waitlist
//! waitlisted ── cancel ──▶ cancelled
//! cancelled ── create ──▶ confirmed | waitlisted (stale row deleted first)
//! ```
//!
//! The whole transition runs in one write transaction: the capacity check,
//! the insert, and the conditional head-of-waitlist promotion serialize, so
//! confirmed rows never exceed `max_attendees` and a double cancel cannot
//! double-promote.
//!
//! Services return the domain events for the caller to publish; nothing is
//! emitted here.

use std::sync::Arc;

use agora_core::envelope::{DomainEvent, event_type};
use agora_core::id::{EventId, UserId};
use agora_core::{Timestamp, payload};
use agora_db::{Database, EventRecord, RsvpRecord, RsvpStatus};
use agora_core::canonical::EventStatus;
use serde::Serialize;
use tracing::info;

use crate::{ConflictSnafu, GoneSnafu, ServiceError, ServiceResult};

const LOG_TARGET: &str = "agora::rsvp";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RsvpOutput {
    pub status: RsvpStatus,
    pub waitlist_position: Option<u32>,
    pub rsvp_count: u32,
}

pub struct RsvpService {
    db: Arc<Database>,
}

impl RsvpService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    fn check_event_open(event: Option<&EventRecord>) -> ServiceResult<&EventRecord> {
        let event = event.ok_or(ServiceError::NotFound { entity: "event" })?;
        if event.status == EventStatus::Cancelled {
            return GoneSnafu {
                message: "event is cancelled".to_string(),
            }
            .fail();
        }
        Ok(event)
    }

    pub async fn create_rsvp(
        &self,
        event_id: EventId,
        user_id: UserId,
    ) -> ServiceResult<(RsvpOutput, Vec<DomainEvent>)> {
        let now = Timestamp::now();

        let (output, events) = self
            .db
            .write_with(|tx| {
                let event = Database::get_event_write_tx(tx, event_id)?;
                let event = match Self::check_event_open(event.as_ref()) {
                    Ok(event) => event.clone(),
                    Err(err) => return Ok(Err(err)),
                };

                match Database::get_rsvp_tx(tx, event_id, user_id)? {
                    Some(existing) if existing.is_active() => {
                        return Ok(Err(ConflictSnafu {
                            message: "an active RSVP already exists".to_string(),
                        }
                        .build()));
                    }
                    Some(_) => {
                        // Re-RSVP after a cancellation starts clean.
                        Database::remove_rsvp_tx(tx, event_id, user_id)?;
                    }
                    None => {}
                }

                let confirmed = Database::count_rsvps_tx(tx, event_id, RsvpStatus::Confirmed)?;
                let has_capacity = event
                    .max_attendees
                    .map(|max| confirmed < max)
                    .unwrap_or(true);

                let record = if has_capacity {
                    RsvpRecord {
                        status: RsvpStatus::Confirmed,
                        rsvp_at: now,
                        waitlist_position: None,
                        cancelled_at: None,
                    }
                } else {
                    let waitlisted =
                        Database::count_rsvps_tx(tx, event_id, RsvpStatus::Waitlisted)?;
                    RsvpRecord {
                        status: RsvpStatus::Waitlisted,
                        rsvp_at: now,
                        waitlist_position: Some(waitlisted + 1),
                        cancelled_at: None,
                    }
                };
                Database::insert_rsvp_tx(tx, event_id, user_id, &record)?;
                let rsvp_count = Database::recount_event_rsvps_tx(tx, event_id)?;

                let events = vec![
                    DomainEvent::new(
                        event_type::EVENT_RSVP,
                        payload! {
                            "eventId" => event_id.to_string(),
                            "groupId" => event.group_id.to_string(),
                            "userId" => user_id.to_string(),
                            "status" => match record.status {
                                RsvpStatus::Confirmed => "confirmed",
                                _ => "waitlisted",
                            },
                            "promotedFromWaitlist" => false,
                        },
                    )
                    .with_user(user_id)
                    .with_source("rsvp"),
                ];

                Ok(Ok((
                    RsvpOutput {
                        status: record.status,
                        waitlist_position: record.waitlist_position,
                        rsvp_count,
                    },
                    events,
                )))
            })
            .await??;

        info!(
            target: LOG_TARGET,
            event_id = %event_id,
            user_id = %user_id,
            status = ?output.status,
            "RSVP created"
        );
        Ok((output, events))
    }

    pub async fn cancel_rsvp(
        &self,
        event_id: EventId,
        user_id: UserId,
    ) -> ServiceResult<(RsvpOutput, Vec<DomainEvent>)> {
        let now = Timestamp::now();

        let (output, events) = self
            .db
            .write_with(|tx| {
                let event = Database::get_event_write_tx(tx, event_id)?;
                let Some(event) = event else {
                    return Ok(Err(ServiceError::NotFound { entity: "event" }));
                };

                let Some(mut record) = Database::get_rsvp_tx(tx, event_id, user_id)? else {
                    return Ok(Err(ServiceError::NotFound { entity: "rsvp" }));
                };
                if record.status == RsvpStatus::Cancelled {
                    return Ok(Err(ServiceError::NotFound { entity: "rsvp" }));
                }

                let was_confirmed = record.status == RsvpStatus::Confirmed;
                record.status = RsvpStatus::Cancelled;
                record.waitlist_position = None;
                record.cancelled_at = Some(now);
                Database::insert_rsvp_tx(tx, event_id, user_id, &record)?;

                let mut events = vec![
                    DomainEvent::new(
                        event_type::EVENT_RSVP_CANCELLED,
                        payload! {
                            "eventId" => event_id.to_string(),
                            "groupId" => event.group_id.to_string(),
                            "userId" => user_id.to_string(),
                        },
                    )
                    .with_user(user_id)
                    .with_source("rsvp"),
                ];

                // A freed confirmed seat promotes the head of the waitlist.
                // The promotion is conditional on the row still being
                // waitlisted, so a concurrent cancel cannot double-promote.
                if was_confirmed {
                    if let Some((head_user, _)) = Database::head_of_waitlist_tx(tx, event_id)? {
                        if Database::promote_if_waitlisted_tx(tx, event_id, head_user, now)? {
                            events.push(
                                DomainEvent::new(
                                    event_type::EVENT_RSVP,
                                    payload! {
                                        "eventId" => event_id.to_string(),
                                        "groupId" => event.group_id.to_string(),
                                        "userId" => head_user.to_string(),
                                        "status" => "confirmed",
                                        "promotedFromWaitlist" => true,
                                    },
                                )
                                .with_user(head_user)
                                .with_source("rsvp"),
                            );
                        }
                    }
                }

                // Reset to the true confirmed count instead of decrementing.
                let rsvp_count = Database::recount_event_rsvps_tx(tx, event_id)?;

                Ok(Ok((
                    RsvpOutput {
                        status: RsvpStatus::Cancelled,
                        waitlist_position: None,
                        rsvp_count,
                    },
                    events,
                )))
            })
            .await??;

        info!(
            target: LOG_TARGET,
            event_id = %event_id,
            user_id = %user_id,
            "RSVP cancelled"
        );
        Ok((output, events))
    }
}
