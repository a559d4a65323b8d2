//! Event check-in service.
//!
//! Check-in codes are handed out at the door; redeeming one is atomic on
//! the code's `max_uses` counter and unique per `(event, user)`.

use std::sync::Arc;

use agora_core::canonical::EventStatus;
use agora_core::envelope::{DomainEvent, event_type};
use agora_core::id::{EventId, UserId};
use agora_core::{Timestamp, payload};
use agora_db::{Database, RedeemRefusal};
use tracing::info;

use crate::{ConflictSnafu, GoneSnafu, ServiceError, ServiceResult};

const LOG_TARGET: &str = "agora::checkins";

pub struct CheckinService {
    db: Arc<Database>,
}

impl CheckinService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub async fn check_in(
        &self,
        event_id: EventId,
        code: &str,
        user_id: UserId,
    ) -> ServiceResult<Vec<DomainEvent>> {
        let now = Timestamp::now();
        let code = code.to_string();

        let events = self
            .db
            .write_with(|tx| {
                let Some(event) = Database::get_event_write_tx(tx, event_id)? else {
                    return Ok(Err(ServiceError::NotFound { entity: "event" }));
                };
                if event.status == EventStatus::Cancelled {
                    return Ok(Err(GoneSnafu {
                        message: "event is cancelled".to_string(),
                    }
                    .build()));
                }

                match Database::redeem_checkin_code_tx(tx, event_id, &code, user_id, now)? {
                    Ok(_) => {}
                    Err(RedeemRefusal::UnknownCode) => {
                        return Ok(Err(ServiceError::NotFound {
                            entity: "check-in code",
                        }));
                    }
                    Err(RedeemRefusal::Exhausted) => {
                        return Ok(Err(GoneSnafu {
                            message: "check-in code exhausted".to_string(),
                        }
                        .build()));
                    }
                    Err(RedeemRefusal::AlreadyCheckedIn) => {
                        return Ok(Err(ConflictSnafu {
                            message: "already checked in".to_string(),
                        }
                        .build()));
                    }
                }

                Ok(Ok(vec![
                    DomainEvent::new(
                        event_type::EVENT_CHECKIN,
                        payload! {
                            "eventId" => event_id.to_string(),
                            "groupId" => event.group_id.to_string(),
                            "userId" => user_id.to_string(),
                            "code" => code.clone(),
                        },
                    )
                    .with_user(user_id)
                    .with_source("checkins"),
                ]))
            })
            .await??;

        info!(target: LOG_TARGET, event_id = %event_id, user_id = %user_id, "Checked in");
        Ok(events)
    }
}
