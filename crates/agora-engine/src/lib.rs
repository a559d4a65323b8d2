//! The interior engine: sync orchestration, the domain-event bus and queue
//! handlers, and the user-facing state-machine services.
//!
//! Everything here is written against `agora-db` and the canonical model;
//! transport concerns (HTTP routing, status codes) live in the server crate.

mod achievements;
mod bus;
mod checkins;
mod claims;
mod conditions;
mod dispatch;
mod favorites;
mod notify;
mod profile;
mod rsvp;
mod sync;
mod webhooks;

#[cfg(test)]
mod tests;

use agora_db::DbError;
use snafu::Snafu;

pub use self::achievements::AchievementEngine;
pub use self::bus::{BusReceiver, BusSender, DEFAULT_BUS_CAPACITY, bus_channel, run_queue};
pub use self::checkins::CheckinService;
pub use self::claims::{ClaimOutput, ClaimService};
pub use self::conditions::{Condition, eval_conditions};
pub use self::dispatch::{Dispatcher, EventHandler};
pub use self::favorites::{FavoriteOutput, FavoritesService};
pub use self::notify::{
    BroadcastNotification, NotificationRelayer, Notifier, PersonalNotification,
};
pub use self::profile::{ProfileService, ProfileUpdate};
pub use self::rsvp::{RsvpOutput, RsvpService};
pub use self::sync::{SyncAllResult, SyncOpts, SyncResult, SyncService};
pub use self::webhooks::{WebhookDeliverer, sign_payload};

/// Typed failures shared by the user-facing services. The HTTP layer maps
/// these to status codes; the services never see transport concerns.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ServiceError {
    #[snafu(display("{entity} not found"))]
    NotFound { entity: &'static str },
    #[snafu(display("{message}"))]
    Gone { message: String },
    #[snafu(display("{message}"))]
    Conflict { message: String },
    #[snafu(display("{message}"))]
    BadRequest { message: String },
    #[snafu(transparent)]
    Db { source: DbError },
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;
