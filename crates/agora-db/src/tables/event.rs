use agora_core::canonical::{CanonicalEvent, CanonicalVenue, EventKind, EventStatus};
use agora_core::id::{GroupId, VenueId};
use agora_core::{IsoDuration, Platform, Timestamp};
use bincode::{Decode, Encode};
use serde::Serialize;

#[derive(Encode, Decode, Serialize, Debug, Clone)]
pub struct VenueRecord {
    pub platform: Platform,
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

impl VenueRecord {
    pub fn from_canonical(platform: Platform, venue: &CanonicalVenue) -> Self {
        Self {
            platform,
            platform_venue_id: venue.platform_venue_id.clone(),
            name: venue.name.clone(),
            address: venue.address.clone(),
            city: venue.city.clone(),
            region: venue.region.clone(),
            postal_code: venue.postal_code.clone(),
            country: venue.country.clone(),
            lat: venue.lat,
            lon: venue.lon,
            is_online: venue.is_online,
        }
    }
}

#[derive(Encode, Decode, Serialize, Debug, Clone)]
pub struct EventRecord {
    pub platform: Platform,
    pub platform_id: String,
    pub group_id: GroupId,
    pub venue_id: Option<VenueId>,
    pub title: String,
    pub description: Option<String>,
    pub event_url: String,
    pub photo_url: Option<String>,
    pub start_time: Timestamp,
    pub end_time: Option<Timestamp>,
    pub timezone: String,
    pub duration: Option<IsoDuration>,
    pub status: EventStatus,
    pub kind: EventKind,
    pub rsvp_count: u32,
    pub max_attendees: Option<u32>,
    pub featured: bool,
    pub last_sync_at: Timestamp,
}

impl EventRecord {
    /// Overlay a fresh canonical fetch onto this row, preserving the local
    /// fields sync does not own (`featured`, ids).
    pub fn apply_canonical(
        &mut self,
        canonical: &CanonicalEvent,
        venue_id: Option<VenueId>,
        now: Timestamp,
    ) {
        self.venue_id = venue_id;
        self.title = canonical.title.clone();
        self.description = canonical.description.clone();
        self.event_url = canonical.event_url.clone();
        self.photo_url = canonical.photo_url.clone();
        self.start_time = canonical.start_time;
        self.end_time = canonical.effective_end_time();
        self.timezone = canonical.timezone.clone();
        self.duration = canonical.duration;
        self.status = canonical.status;
        self.kind = canonical.kind;
        self.rsvp_count = canonical.rsvp_count;
        self.max_attendees = canonical.max_attendees;
        self.last_sync_at = now;
    }

    pub fn from_canonical(
        canonical: &CanonicalEvent,
        group_id: GroupId,
        venue_id: Option<VenueId>,
        now: Timestamp,
    ) -> Self {
        Self {
            platform: canonical.platform,
            platform_id: canonical.platform_id.clone(),
            group_id,
            venue_id,
            title: canonical.title.clone(),
            description: canonical.description.clone(),
            event_url: canonical.event_url.clone(),
            photo_url: canonical.photo_url.clone(),
            start_time: canonical.start_time,
            end_time: canonical.effective_end_time(),
            timezone: canonical.timezone.clone(),
            duration: canonical.duration,
            status: canonical.status,
            kind: canonical.kind,
            rsvp_count: canonical.rsvp_count,
            max_attendees: canonical.max_attendees,
            featured: false,
            last_sync_at: now,
        }
    }
}
