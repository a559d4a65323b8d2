//! REST ticketing platform adapter (Eventbrite).
//!
//! Long-lived private token, verified on init with a `/users/me/` probe.
//! Organizer events are listed with continuation-token pagination, filtered
//! upstream to live/started; each event's full description is a follow-up
//! call returning HTML, flattened to text before it enters the canonical
//! record.

use agora_core::canonical::{
    CanonicalEvent, CanonicalGroup, CanonicalVenue, EventKind, EventStatus,
};
use agora_core::{IsoDuration, Platform, Timestamp};
use async_trait::async_trait;
use serde::Deserialize;
use snafu::ResultExt as _;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::{
    FetchError, FetchOpts, FetchOutcome, FetchResult, HttpSnafu, ProviderAdapter, ProviderEnv,
    html_to_text, http_client,
};

const LOG_TARGET: &str = "agora::provider::eventbrite";

const API_BASE: &str = "https://www.eventbriteapi.com/v3";
/// Fixed retry hint for HTTP 429; the API does not advertise a window.
const RETRY_AFTER_SECS: u64 = 60;

pub struct EventbriteAdapter {
    client: reqwest::Client,
    token: RwLock<Option<String>>,
}

impl Default for EventbriteAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl EventbriteAdapter {
    pub fn new() -> Self {
        Self {
            client: http_client(),
            token: RwLock::new(None),
        }
    }

    async fn bearer_token(&self) -> FetchResult<String> {
        self.token
            .read()
            .await
            .clone()
            .ok_or_else(|| FetchError::Authentication {
                message: "adapter not initialized".to_string(),
            })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> FetchResult<T> {
        let token = self.bearer_token().await?;
        let response = self
            .client
            .get(format!("{API_BASE}{path}"))
            .bearer_auth(token)
            .query(query)
            .send()
            .await
            .context(HttpSnafu)?;

        let status = response.status();
        match status.as_u16() {
            429 => Err(FetchError::RateLimited {
                retry_after_secs: RETRY_AFTER_SECS,
            }),
            401 | 403 => Err(FetchError::Authentication {
                message: format!("upstream returned {status}"),
            }),
            404 => Err(FetchError::InvalidIdentifier {
                message: format!("`{path}` does not resolve"),
            }),
            _ if !status.is_success() => Err(FetchError::Upstream {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            }),
            _ => response.json().await.context(HttpSnafu),
        }
    }

    /// Full HTML description, flattened. Absence is not an error; list
    /// payloads already carry a summary fallback.
    async fn fetch_description(&self, event_id: &str) -> Option<String> {
        let result: FetchResult<DescriptionResponse> = self
            .get_json(&format!("/events/{event_id}/description/"), &[])
            .await;
        match result {
            Ok(response) => {
                let text = html_to_text(&response.description);
                (!text.is_empty()).then_some(text)
            }
            Err(err) => {
                warn!(
                    target: LOG_TARGET,
                    event_id = %event_id,
                    err = %err,
                    "Failed to fetch full description"
                );
                None
            }
        }
    }
}

#[async_trait]
impl ProviderAdapter for EventbriteAdapter {
    fn platform(&self) -> Platform {
        Platform::Eventbrite
    }

    fn display_name(&self) -> &'static str {
        "Eventbrite"
    }

    fn is_configured(&self, env: &ProviderEnv) -> bool {
        env.eventbrite_token.is_some()
    }

    async fn initialize(&self, env: &ProviderEnv) -> FetchResult<()> {
        if self.token.read().await.is_some() {
            return Ok(());
        }
        let Some(token) = &env.eventbrite_token else {
            return Err(FetchError::NotConfigured {
                platform: Platform::Eventbrite,
            });
        };

        // Probe before caching so a bad token surfaces at init time.
        let response = self
            .client
            .get(format!("{API_BASE}/users/me/"))
            .bearer_auth(token)
            .send()
            .await
            .context(HttpSnafu)?;
        if !response.status().is_success() {
            return Err(FetchError::Authentication {
                message: format!("token probe returned {}", response.status()),
            });
        }

        *self.token.write().await = Some(token.clone());
        Ok(())
    }

    async fn fetch_events(
        &self,
        platform_id: &str,
        opts: &FetchOpts,
    ) -> FetchResult<FetchOutcome> {
        if platform_id.trim().is_empty() {
            return Err(FetchError::InvalidIdentifier {
                message: "empty organization id".to_string(),
            });
        }

        let mut raw_events = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let page: EventListResponse = {
                let mut query = vec![
                    ("status", "live,started"),
                    ("order_by", "start_asc"),
                    ("expand", "venue,logo"),
                ];
                if let Some(token) = &continuation {
                    query.push(("continuation", token.as_str()));
                }
                self.get_json(&format!("/organizations/{platform_id}/events/"), &query)
                    .await?
            };

            raw_events.extend(page.events);
            if opts.max_events <= raw_events.len() || !page.pagination.has_more_items {
                break;
            }
            match page.pagination.continuation {
                Some(token) => continuation = Some(token),
                None => break,
            }
        }
        raw_events.truncate(opts.max_events);

        let mut events = Vec::with_capacity(raw_events.len());
        for raw in &raw_events {
            let mut canonical = map_event(raw)?;
            if let Some(full) = self.fetch_description(&raw.id).await {
                canonical.description = Some(full);
            }
            events.push(canonical);
        }

        debug!(
            target: LOG_TARGET,
            organization = %platform_id,
            count = events.len(),
            "Fetched events"
        );
        Ok(FetchOutcome {
            group: self.fetch_group(platform_id).await?,
            events,
        })
    }

    async fn fetch_group(&self, platform_id: &str) -> FetchResult<Option<CanonicalGroup>> {
        let org: OrganizationResponse = self
            .get_json(&format!("/organizations/{platform_id}/"), &[])
            .await?;
        Ok(Some(CanonicalGroup {
            platform_id: org.id,
            platform: Platform::Eventbrite,
            urlname: org.name.clone(),
            name: org.name,
            description: None,
            link: org
                .website
                .unwrap_or_else(|| "https://www.eventbrite.com".to_string()),
            member_count: None,
            photo_url: org.logo.and_then(|logo| logo.url()),
        }))
    }
}

#[derive(Deserialize)]
struct EventListResponse {
    pagination: Pagination,
    events: Vec<RawEvent>,
}

#[derive(Deserialize)]
struct Pagination {
    #[serde(default)]
    has_more_items: bool,
    continuation: Option<String>,
}

#[derive(Deserialize)]
struct RawEvent {
    id: String,
    name: TextField,
    #[serde(default)]
    summary: Option<String>,
    url: String,
    start: DateTimeField,
    end: Option<DateTimeField>,
    status: String,
    #[serde(default)]
    online_event: bool,
    capacity: Option<u32>,
    logo: Option<Logo>,
    venue: Option<RawVenue>,
}

#[derive(Deserialize)]
struct TextField {
    text: Option<String>,
}

#[derive(Deserialize)]
struct DateTimeField {
    utc: String,
    timezone: Option<String>,
}

#[derive(Deserialize)]
struct Logo {
    original: Option<LogoOriginal>,
    url: Option<String>,
}

#[derive(Deserialize)]
struct LogoOriginal {
    url: Option<String>,
}

impl Logo {
    fn url(&self) -> Option<String> {
        self.original
            .as_ref()
            .and_then(|o| o.url.clone())
            .or_else(|| self.url.clone())
    }
}

#[derive(Deserialize)]
struct RawVenue {
    id: String,
    name: Option<String>,
    address: Option<RawAddress>,
    latitude: Option<String>,
    longitude: Option<String>,
}

#[derive(Deserialize)]
struct RawAddress {
    address_1: Option<String>,
    city: Option<String>,
    region: Option<String>,
    postal_code: Option<String>,
    country: Option<String>,
}

#[derive(Deserialize)]
struct DescriptionResponse {
    #[serde(default)]
    description: String,
}

#[derive(Deserialize)]
struct OrganizationResponse {
    id: String,
    name: String,
    website: Option<String>,
    logo: Option<Logo>,
}

fn map_status(status: &str) -> FetchResult<EventStatus> {
    match status {
        "live" | "started" | "ended" | "completed" => Ok(EventStatus::Active),
        "canceled" | "cancelled" => Ok(EventStatus::Cancelled),
        "draft" => Ok(EventStatus::Draft),
        other => Err(FetchError::Parse {
            message: format!("unknown event status `{other}`"),
        }),
    }
}

fn map_venue(raw: &RawEvent) -> Option<CanonicalVenue> {
    if raw.online_event {
        return Some(CanonicalVenue::online());
    }
    let venue = raw.venue.as_ref()?;
    let address = venue.address.as_ref();
    Some(CanonicalVenue {
        platform_venue_id: venue.id.clone(),
        name: venue
            .name
            .clone()
            .unwrap_or_else(|| "Unnamed venue".to_string()),
        address: address.and_then(|a| a.address_1.clone()),
        city: address.and_then(|a| a.city.clone()),
        region: address.and_then(|a| a.region.clone()),
        postal_code: address.and_then(|a| a.postal_code.clone()),
        country: address.and_then(|a| a.country.clone()),
        lat: venue.latitude.as_deref().and_then(|v| v.parse().ok()),
        lon: venue.longitude.as_deref().and_then(|v| v.parse().ok()),
        is_online: false,
    })
}

fn map_event(raw: &RawEvent) -> FetchResult<CanonicalEvent> {
    let status = map_status(&raw.status)?;

    let start_time =
        Timestamp::parse_rfc3339(&raw.start.utc).map_err(|err| FetchError::Parse {
            message: format!("bad start `{}`: {err}", raw.start.utc),
        })?;
    let end_time = raw
        .end
        .as_ref()
        .map(|end| {
            Timestamp::parse_rfc3339(&end.utc).map_err(|err| FetchError::Parse {
                message: format!("bad end `{}`: {err}", end.utc),
            })
        })
        .transpose()?;

    // This API has no duration field; derive one from the interval.
    let duration = end_time
        .filter(|end| start_time <= *end)
        .map(|end| IsoDuration::from_secs(end.secs_since(start_time)));

    let kind = if raw.online_event {
        EventKind::Online
    } else {
        EventKind::Physical
    };

    Ok(CanonicalEvent {
        platform_id: raw.id.clone(),
        platform: Platform::Eventbrite,
        title: raw.name.text.clone().unwrap_or_default(),
        description: raw.summary.clone(),
        event_url: raw.url.clone(),
        photo_url: raw.logo.as_ref().and_then(Logo::url),
        start_time,
        end_time,
        timezone: raw
            .start
            .timezone
            .clone()
            .unwrap_or_else(|| "UTC".to_string()),
        duration,
        status,
        kind,
        rsvp_count: 0,
        max_attendees: raw.capacity,
        venue: map_venue(raw),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_event(json: serde_json::Value) -> RawEvent {
        serde_json::from_value(json).expect("valid raw event")
    }

    fn base_event() -> serde_json::Value {
        serde_json::json!({
            "id": "987",
            "name": { "text": "Product demo night" },
            "summary": "Short blurb",
            "url": "https://www.eventbrite.com/e/987",
            "start": { "utc": "2025-07-04T22:00:00Z", "timezone": "America/New_York" },
            "end": { "utc": "2025-07-05T00:00:00Z", "timezone": "America/New_York" },
            "status": "live",
            "online_event": false,
            "capacity": 120,
            "logo": { "original": { "url": "https://img.example.com/o.png" }, "url": "https://img.example.com/s.png" },
            "venue": {
                "id": "ven-1",
                "name": "Union Hall",
                "address": {
                    "address_1": "1910 Blake St",
                    "city": "Denver",
                    "region": "CO",
                    "postal_code": "80202",
                    "country": "US"
                },
                "latitude": "39.7525",
                "longitude": "-104.9995"
            }
        })
    }

    #[test]
    fn maps_full_event_with_derived_duration() {
        let canonical = map_event(&raw_event(base_event())).expect("maps");
        assert_eq!(canonical.platform, Platform::Eventbrite);
        assert_eq!(canonical.status, EventStatus::Active);
        assert_eq!(canonical.kind, EventKind::Physical);
        assert_eq!(canonical.max_attendees, Some(120));
        assert_eq!(canonical.duration.map(|d| d.as_secs()), Some(7_200));
        assert_eq!(
            canonical.photo_url.as_deref(),
            Some("https://img.example.com/o.png")
        );
        let venue = canonical.venue.expect("venue");
        assert_eq!(venue.lat, Some(39.7525));
        assert_eq!(venue.city.as_deref(), Some("Denver"));
    }

    #[test]
    fn online_event_maps_to_shared_venue() {
        let mut json = base_event();
        json["online_event"] = serde_json::json!(true);
        let canonical = map_event(&raw_event(json)).expect("maps");
        assert_eq!(canonical.kind, EventKind::Online);
        assert!(canonical.venue.expect("venue").is_online);
    }

    #[test]
    fn cancelled_status_maps() {
        let mut json = base_event();
        json["status"] = serde_json::json!("canceled");
        let canonical = map_event(&raw_event(json)).expect("maps");
        assert_eq!(canonical.status, EventStatus::Cancelled);
    }

    #[test]
    fn bad_start_is_a_whole_record_error() {
        let mut json = base_event();
        json["start"] = serde_json::json!({ "utc": "soon" });
        assert!(matches!(
            map_event(&raw_event(json)),
            Err(FetchError::Parse { .. })
        ));
    }

    #[test]
    fn inverted_interval_drops_duration() {
        let mut json = base_event();
        json["end"] = serde_json::json!({ "utc": "2025-07-04T20:00:00Z" });
        let canonical = map_event(&raw_event(json)).expect("maps");
        assert_eq!(canonical.duration, None);
    }
}
