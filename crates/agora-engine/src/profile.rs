//! Profile edits, emitting `user.profile_updated` for onboarding and
//! achievement triggers to pick up.

use std::sync::Arc;

use agora_core::envelope::{DomainEvent, event_type};
use agora_core::id::UserId;
use agora_core::payload;
use agora_db::Database;
use tracing::info;

use crate::{ServiceError, ServiceResult};

const LOG_TARGET: &str = "agora::profile";

#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub public: Option<bool>,
}

pub struct ProfileService {
    db: Arc<Database>,
}

impl ProfileService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub async fn update_profile(
        &self,
        user_id: UserId,
        update: ProfileUpdate,
    ) -> ServiceResult<Vec<DomainEvent>> {
        let updated = self
            .db
            .write_with(|tx| {
                Database::update_user_profile_tx(
                    tx,
                    user_id,
                    update.display_name.clone(),
                    update.bio.clone(),
                    update.avatar_url.clone(),
                    update.public,
                )
            })
            .await?;
        if !updated {
            return Err(ServiceError::NotFound { entity: "user" });
        }

        info!(target: LOG_TARGET, user_id = %user_id, "Profile updated");
        Ok(vec![
            DomainEvent::new(
                event_type::USER_PROFILE_UPDATED,
                payload! { "userId" => user_id.to_string() },
            )
            .with_user(user_id)
            .with_source("profile"),
        ])
    }
}
