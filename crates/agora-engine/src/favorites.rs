//! Favorites service.
//!
//! Add is idempotent: favoriting a group twice reports `already_existed`
//! and produces no event. Remove emits `user.favorite_removed` only when a
//! row was actually deleted, so count-recomputing handlers are driven purely
//! by real state changes.

use std::sync::Arc;

use agora_core::envelope::{DomainEvent, event_type};
use agora_core::id::UserId;
use agora_core::{Timestamp, payload};
use agora_db::Database;
use serde::Serialize;
use tracing::info;

use crate::{ServiceError, ServiceResult};

const LOG_TARGET: &str = "agora::favorites";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteOutput {
    pub favorited: bool,
    pub already_existed: bool,
}

pub struct FavoritesService {
    db: Arc<Database>,
}

impl FavoritesService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub async fn add_favorite(
        &self,
        user_id: UserId,
        group_slug: &str,
    ) -> ServiceResult<(FavoriteOutput, Vec<DomainEvent>)> {
        let Some((group_id, group)) = self.db.get_group_by_slug(group_slug).await? else {
            return Err(ServiceError::NotFound { entity: "group" });
        };

        let now = Timestamp::now();
        let added = self
            .db
            .write_with(|tx| Database::add_favorite_tx(tx, user_id, group_id, now))
            .await?;

        if !added {
            return Ok((
                FavoriteOutput {
                    favorited: true,
                    already_existed: true,
                },
                vec![],
            ));
        }

        info!(target: LOG_TARGET, user_id = %user_id, group = %group.slug, "Favorite added");
        let events = vec![
            DomainEvent::new(
                event_type::USER_FAVORITE_ADDED,
                payload! {
                    "userId" => user_id.to_string(),
                    "groupId" => group_id.to_string(),
                    "groupSlug" => group.slug,
                },
            )
            .with_user(user_id)
            .with_source("favorites"),
        ];
        Ok((
            FavoriteOutput {
                favorited: true,
                already_existed: false,
            },
            events,
        ))
    }

    pub async fn remove_favorite(
        &self,
        user_id: UserId,
        group_slug: &str,
    ) -> ServiceResult<(FavoriteOutput, Vec<DomainEvent>)> {
        let Some((group_id, group)) = self.db.get_group_by_slug(group_slug).await? else {
            return Err(ServiceError::NotFound { entity: "group" });
        };

        let removed = self
            .db
            .write_with(|tx| Database::remove_favorite_tx(tx, user_id, group_id))
            .await?;

        let events = if removed {
            info!(target: LOG_TARGET, user_id = %user_id, group = %group.slug, "Favorite removed");
            vec![
                DomainEvent::new(
                    event_type::USER_FAVORITE_REMOVED,
                    payload! {
                        "userId" => user_id.to_string(),
                        "groupId" => group_id.to_string(),
                        "groupSlug" => group.slug,
                    },
                )
                .with_user(user_id)
                .with_source("favorites"),
            ]
        } else {
            vec![]
        };

        Ok((
            FavoriteOutput {
                favorited: false,
                already_existed: removed,
            },
            events,
        ))
    }
}
