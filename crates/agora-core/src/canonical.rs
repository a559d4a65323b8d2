//! Canonical (provider-agnostic) shapes.
//!
//! Adapters own every platform-specific mismatch; sync, search and
//! notifications are written against these types only.

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use snafu::Snafu;

use crate::{IsoDuration, Platform, Timestamp};

#[derive(
    Encode, Decode, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Active,
    /// Terminal once reached through upstream cancellation or deletion
    /// inference.
    Cancelled,
    Draft,
}

impl EventStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EventStatus::Active => "active",
            EventStatus::Cancelled => "cancelled",
            EventStatus::Draft => "draft",
        }
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Snafu, PartialEq, Eq)]
#[snafu(display("Unknown event status `{value}`"))]
pub struct EventStatusParseError {
    pub value: String,
}

impl std::str::FromStr for EventStatus {
    type Err = EventStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(EventStatus::Active),
            "cancelled" => Ok(EventStatus::Cancelled),
            "draft" => Ok(EventStatus::Draft),
            other => Err(EventStatusParseError {
                value: other.to_string(),
            }),
        }
    }
}

#[derive(
    Encode, Decode, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Physical,
    Online,
    Hybrid,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Physical => "physical",
            EventKind::Online => "online",
            EventKind::Hybrid => "hybrid",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Venue as extracted from one provider response.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CanonicalVenue {
    /// Provider-side venue id; `"online"` for the shared online placeholder.
    pub platform_venue_id: String,
    pub name: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub is_online: bool,
}

impl CanonicalVenue {
    /// The single synthetic venue shared by all online events of a platform.
    pub fn online() -> Self {
        Self {
            platform_venue_id: "online".to_string(),
            name: "Online event".to_string(),
            address: None,
            city: None,
            region: None,
            postal_code: None,
            country: None,
            lat: None,
            lon: None,
            is_online: true,
        }
    }
}

/// One occurrence, normalized.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CanonicalEvent {
    pub platform_id: String,
    pub platform: Platform,
    pub title: String,
    pub description: Option<String>,
    pub event_url: String,
    pub photo_url: Option<String>,
    pub start_time: Timestamp,
    pub end_time: Option<Timestamp>,
    /// IANA timezone name, e.g. `America/New_York`.
    pub timezone: String,
    pub duration: Option<IsoDuration>,
    pub status: EventStatus,
    pub kind: EventKind,
    pub rsvp_count: u32,
    pub max_attendees: Option<u32>,
    pub venue: Option<CanonicalVenue>,
}

impl CanonicalEvent {
    /// End time, falling back to `start + duration` when the upstream gave a
    /// length but no end. Ends earlier than the start are dropped.
    pub fn effective_end_time(&self) -> Option<Timestamp> {
        let end = self.end_time.or_else(|| {
            self.duration
                .map(|d| self.start_time.saturating_add_secs(d.as_secs()))
        })?;
        (self.start_time <= end).then_some(end)
    }
}

/// Group metadata as extracted from one provider response.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CanonicalGroup {
    pub platform_id: String,
    pub platform: Platform,
    /// The platform-side slug ("urlname" upstream).
    pub urlname: String,
    pub name: String,
    pub description: Option<String>,
    pub link: String,
    pub member_count: Option<u32>,
    pub photo_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(start: u64, end: Option<u64>, duration: Option<&str>) -> CanonicalEvent {
        CanonicalEvent {
            platform_id: "e1".into(),
            platform: Platform::Meetup,
            title: "Monthly meetup".into(),
            description: None,
            event_url: "https://example.com/e1".into(),
            photo_url: None,
            start_time: Timestamp::from(start),
            end_time: end.map(Timestamp::from),
            timezone: "America/New_York".into(),
            duration: duration.map(|d| IsoDuration::parse(d).unwrap()),
            status: EventStatus::Active,
            kind: EventKind::Physical,
            rsvp_count: 0,
            max_attendees: None,
            venue: None,
        }
    }

    #[test]
    fn end_time_prefers_explicit_end() {
        let e = event(1_000, Some(2_000), Some("PT2H"));
        assert_eq!(e.effective_end_time(), Some(Timestamp::from(2_000)));
    }

    #[test]
    fn end_time_falls_back_to_duration() {
        let e = event(1_000, None, Some("PT2H"));
        assert_eq!(e.effective_end_time(), Some(Timestamp::from(8_200)));
    }

    #[test]
    fn end_before_start_is_dropped() {
        let e = event(5_000, Some(1_000), None);
        assert_eq!(e.effective_end_time(), None);
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&EventStatus::Cancelled).unwrap(),
            "\"cancelled\""
        );
        assert_eq!(
            serde_json::to_string(&EventKind::Physical).unwrap(),
            "\"physical\""
        );
    }
}
