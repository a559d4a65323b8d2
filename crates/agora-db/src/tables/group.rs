use std::collections::BTreeMap;

use agora_core::{Platform, Timestamp};
use bincode::{Decode, Encode};
use serde::Serialize;

/// One upstream platform bound to a group.
#[derive(Encode, Decode, Serialize, Debug, Clone, PartialEq)]
pub struct PlatformConnection {
    pub platform: Platform,
    /// Platform-side identifier (group urlname, organization id, calendar
    /// id, ...).
    pub platform_id: String,
    pub slug: String,
    pub link: Option<String>,
    pub active: bool,
    pub last_sync_at: Option<Timestamp>,
    pub last_error: Option<String>,
}

#[derive(Encode, Decode, Serialize, Debug, Clone, Default, PartialEq)]
pub struct SyncConfig {
    pub active: bool,
    pub last_sync_at: Option<Timestamp>,
    pub last_error: Option<String>,
}

/// Badge-governance limits for group-scoped badges.
#[derive(Encode, Decode, Serialize, Debug, Clone, PartialEq)]
pub struct BadgeLimits {
    pub max_badges: u32,
    pub max_points_per_badge: u32,
}

impl Default for BadgeLimits {
    fn default() -> Self {
        Self {
            max_badges: 10,
            max_points_per_badge: 50,
        }
    }
}

#[derive(Encode, Decode, Serialize, Debug, Clone)]
pub struct GroupRecord {
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub connections: Vec<PlatformConnection>,
    pub member_count: u32,
    pub photo_url: Option<String>,
    pub display: bool,
    pub featured: bool,
    pub tags: Vec<String>,
    pub social_links: BTreeMap<String, String>,
    pub sync: SyncConfig,
    pub badge_limits: BadgeLimits,
    pub created_at: Timestamp,
}

impl GroupRecord {
    pub fn connection(&self, platform: Platform, platform_id: &str) -> Option<&PlatformConnection> {
        self.connections
            .iter()
            .find(|c| c.platform == platform && c.platform_id == platform_id)
    }

    pub fn connection_mut(
        &mut self,
        platform: Platform,
        platform_id: &str,
    ) -> Option<&mut PlatformConnection> {
        self.connections
            .iter_mut()
            .find(|c| c.platform == platform && c.platform_id == platform_id)
    }
}
