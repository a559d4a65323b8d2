//! Database table definitions.
//!
//! # Data model overview
//!
//! The store keeps the aggregated community-event state plus every
//! user-facing gamification entity. Three families:
//!
//! - **Aggregation tables** (`groups`, `venues`, `events` and their indexes):
//!   written by sync, read by everything. `events_by_platform` carries the
//!   `(platform, platform_id)` uniqueness constraint; `events_by_group` is
//!   the index deletion inference walks.
//! - **Gamification tables** (`badges`, `achievements`, `rsvps`, `checkins`,
//!   `favorites`, onboarding): mutated by the user-facing services and the
//!   achievement engine. All cross-row invariants (progress latch, waitlist
//!   promotion, claim counters) are enforced by conditional writes inside a
//!   single write transaction.
//! - **Audit tables** (`sync_logs`, `webhook_deliveries`): append-only or
//!   write-once-then-complete; never rewritten after completion.

use agora_core::id::{
    BadgeId, DeliveryId, EventId, GroupId, SyncLogId, UserId, VenueId, WebhookId,
};
use agora_core::{Platform, Timestamp};

pub use self::achievement::{
    AchievementRecord, EntitlementRecord, ProgressMode, ProgressRecord,
};
pub use self::badge::{BadgeRecord, ClaimLinkRecord, UserBadgeRecord};
pub use self::event::{EventRecord, VenueRecord};
pub use self::group::{BadgeLimits, GroupRecord, PlatformConnection, SyncConfig};
pub use self::onboarding::{OnboardingStepRecord, UserOnboardingRecord};
pub use self::rsvp::{CheckinCodeRecord, CheckinRecord, FavoriteRecord, RsvpRecord, RsvpStatus};
pub use self::sync::{SyncLogRecord, SyncStatus};
pub use self::user::{UserRecord, UserRole};
pub use self::webhook::{DeliveryRecord, WebhookRecord};

pub(crate) mod achievement;
pub(crate) mod badge;
pub(crate) mod event;
pub(crate) mod group;
pub(crate) mod onboarding;
pub(crate) mod rsvp;
pub(crate) mod sync;
pub(crate) mod user;
pub(crate) mod webhook;

#[macro_export]
macro_rules! def_table {
    ($(#[$outer:meta])*
        $name:ident : $k:ty => $v:ty) => {
        #[allow(unused)]
        $(#[$outer])*
        pub mod $name {
            use super::*;
            pub type Key = $k;
            pub type Value = $v;
            pub type Definition<'a> = redb_bincode::TableDefinition<'a, Key, Value>;
            pub trait ReadableTable: redb_bincode::ReadableTable<Key, Value> {}
            impl<RT> ReadableTable for RT where RT: redb_bincode::ReadableTable<Key, Value> {}
            pub type Table<'a> = redb_bincode::Table<'a, Key, Value>;
            pub const TABLE: Definition = redb_bincode::TableDefinition::new(stringify!($name));
        }
    };
}

// ============================================================================
// SYSTEM TABLES
// ============================================================================

def_table! {
    /// Tracks database/schema version for migrations.
    db_version: () => u64
}

// ============================================================================
// AGGREGATION TABLES
// ============================================================================

def_table! {
    /// Managed community groups, with their platform connections embedded.
    groups: GroupId => GroupRecord
}

def_table! {
    /// Primary-slug lookup.
    groups_by_slug: String => GroupId
}

def_table! {
    /// Normalized venues.
    venues: VenueId => VenueRecord
}

def_table! {
    /// Venue de-duplication index.
    ///
    /// Key: (platform, platform venue id). The shared per-platform online
    /// venue sits under the sentinel id `"online"`.
    venues_by_platform: (Platform, String) => VenueId
}

def_table! {
    /// Canonical events.
    events: EventId => EventRecord
}

def_table! {
    /// The `(platform, platform_id)` uniqueness constraint.
    ///
    /// Upserts resolve through this index first; an existing entry always
    /// wins over a fresh insert.
    events_by_platform: (Platform, String) => EventId
}

def_table! {
    /// Per-group event index, walked by deletion inference.
    events_by_group: (GroupId, EventId) => ()
}

// ============================================================================
// IDENTITY TABLES
// ============================================================================

def_table! {
    users: UserId => UserRecord
}

def_table! {
    users_by_name: String => UserId
}

// ============================================================================
// GAMIFICATION TABLES
// ============================================================================

def_table! {
    badges: BadgeId => BadgeRecord
}

def_table! {
    badges_by_slug: String => BadgeId
}

def_table! {
    /// At most one row per (user, badge) pair; `awarded_at` never rewritten.
    user_badges: (UserId, BadgeId) => UserBadgeRecord
}

def_table! {
    /// Secret claim codes. `current_uses` only ever increments, bounded by
    /// `max_uses` when set.
    claim_links: String => ClaimLinkRecord
}

def_table! {
    /// Achievement definitions, keyed by their stable key.
    achievements: String => AchievementRecord
}

def_table! {
    /// Key: (user, achievement key). `completed_at` is latched at most once;
    /// `current_value` never decrements after the latch.
    achievement_progress: (UserId, String) => ProgressRecord
}

def_table! {
    /// Key: (user, entitlement name).
    user_entitlements: (UserId, String) => EntitlementRecord
}

def_table! {
    /// Onboarding step definitions, keyed by step key.
    onboarding_steps: String => OnboardingStepRecord
}

def_table! {
    /// Key: (user, step key). Present iff the step is complete.
    user_onboarding: (UserId, String) => UserOnboardingRecord
}

def_table! {
    /// Key: (event, user). Count of `Confirmed` rows never exceeds the
    /// event's `max_attendees`.
    rsvps: (EventId, UserId) => RsvpRecord
}

def_table! {
    /// Key: (event, code).
    checkin_codes: (EventId, String) => CheckinCodeRecord
}

def_table! {
    /// Key: (event, user); unique per pair.
    checkins: (EventId, UserId) => CheckinRecord
}

def_table! {
    /// Key: (user, group).
    favorites: (UserId, GroupId) => FavoriteRecord
}

def_table! {
    /// Reverse index for per-group favorite counts.
    favorites_by_group: (GroupId, UserId) => ()
}

// ============================================================================
// AUDIT TABLES
// ============================================================================

def_table! {
    /// One row per connection-sync attempt, keyed by start time for
    /// newest-first listing. Immutable once completed.
    sync_logs: (Timestamp, SyncLogId) => SyncLogRecord
}

def_table! {
    webhooks: WebhookId => WebhookRecord
}

def_table! {
    /// One immutable row per delivery attempt.
    webhook_deliveries: (WebhookId, DeliveryId) => DeliveryRecord
}
