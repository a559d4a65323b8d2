//! Core types shared by every Agora crate.
//!
//! Everything downstream of the provider adapters is written against the
//! canonical model defined here: [`canonical::CanonicalEvent`] and friends,
//! the [`Platform`] tag, typed ids, [`Timestamp`], and the
//! [`envelope::DomainEvent`] that flows through the event bus.

pub mod canonical;
pub mod duration;
pub mod envelope;
pub mod fmt;
pub mod id;
mod platform;

use std::time::{SystemTime, UNIX_EPOCH};

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

pub use self::duration::IsoDuration;
pub use self::platform::{Platform, PlatformParseError};

/// Unix-seconds timestamp used for all persisted times.
///
/// Wire formats (provider APIs, webhooks, MCP responses) use RFC 3339; the
/// bridge lives in [`Timestamp::parse_rfc3339`] and [`Timestamp::to_rfc3339`].
#[derive(
    Encode, Decode, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const ZERO: Self = Self(0);

    pub fn now() -> Self {
        Self(
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("Time went backwards")
                .as_secs(),
        )
    }

    pub fn as_secs(self) -> u64 {
        self.0
    }

    /// Seconds elapsed since `earlier`, saturating at zero.
    pub fn secs_since(self, earlier: Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }

    pub fn saturating_add_secs(self, secs: u64) -> Self {
        Self(self.0.saturating_add(secs))
    }

    pub fn parse_rfc3339(s: &str) -> Result<Self, time::error::Parse> {
        let odt = time::OffsetDateTime::parse(s, &time::format_description::well_known::Rfc3339)?;
        Ok(Self(odt.unix_timestamp().max(0) as u64))
    }

    pub fn to_rfc3339(self) -> String {
        time::OffsetDateTime::from_unix_timestamp(self.0 as i64)
            .expect("In-range unix timestamp")
            .format(&time::format_description::well_known::Rfc3339)
            .expect("RFC 3339 formatting")
    }
}

impl From<u64> for Timestamp {
    fn from(secs: u64) -> Self {
        Self(secs)
    }
}

impl From<Timestamp> for u64 {
    fn from(ts: Timestamp) -> Self {
        ts.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::Timestamp;

    #[test]
    fn timestamp_rfc3339_round_trip() {
        let ts = Timestamp::parse_rfc3339("2025-06-01T18:30:00Z").expect("valid");
        assert_eq!(ts.as_secs(), 1748802600);
        assert_eq!(ts.to_rfc3339(), "2025-06-01T18:30:00Z");
    }

    #[test]
    fn timestamp_secs_since_saturates() {
        let a = Timestamp::from(100);
        let b = Timestamp::from(200);
        assert_eq!(b.secs_since(a), 100);
        assert_eq!(a.secs_since(b), 0);
    }
}
