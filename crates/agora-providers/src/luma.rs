//! Calendar-invite platform adapter (Luma).
//!
//! Simplest of the three: static API key, one paginated listing endpoint.
//! The key is calendar-scoped, so there is no separate group lookup; group
//! metadata comes back `None` and sync keeps whatever the operator entered.

use agora_core::canonical::{
    CanonicalEvent, CanonicalGroup, CanonicalVenue, EventKind, EventStatus,
};
use agora_core::{IsoDuration, Platform, Timestamp};
use async_trait::async_trait;
use serde::Deserialize;
use snafu::ResultExt as _;
use tokio::sync::RwLock;
use tracing::debug;

use crate::{
    FetchError, FetchOpts, FetchOutcome, FetchResult, HttpSnafu, ProviderAdapter, ProviderEnv,
    http_client,
};

const LOG_TARGET: &str = "agora::provider::luma";

const API_BASE: &str = "https://api.lu.ma/public/v1";
const RETRY_AFTER_SECS: u64 = 60;

pub struct LumaAdapter {
    client: reqwest::Client,
    api_key: RwLock<Option<String>>,
}

impl Default for LumaAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl LumaAdapter {
    pub fn new() -> Self {
        Self {
            client: http_client(),
            api_key: RwLock::new(None),
        }
    }
}

#[async_trait]
impl ProviderAdapter for LumaAdapter {
    fn platform(&self) -> Platform {
        Platform::Luma
    }

    fn display_name(&self) -> &'static str {
        "Luma"
    }

    fn is_configured(&self, env: &ProviderEnv) -> bool {
        env.luma_api_key.is_some()
    }

    async fn initialize(&self, env: &ProviderEnv) -> FetchResult<()> {
        if self.api_key.read().await.is_some() {
            return Ok(());
        }
        let Some(key) = &env.luma_api_key else {
            return Err(FetchError::NotConfigured {
                platform: Platform::Luma,
            });
        };
        *self.api_key.write().await = Some(key.clone());
        Ok(())
    }

    async fn fetch_events(
        &self,
        platform_id: &str,
        opts: &FetchOpts,
    ) -> FetchResult<FetchOutcome> {
        if platform_id.trim().is_empty() {
            return Err(FetchError::InvalidIdentifier {
                message: "empty calendar id".to_string(),
            });
        }
        let api_key =
            self.api_key
                .read()
                .await
                .clone()
                .ok_or_else(|| FetchError::Authentication {
                    message: "adapter not initialized".to_string(),
                })?;

        let mut events = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let response = {
                let mut query: Vec<(&str, &str)> = vec![];
                if let Some(cursor) = &cursor {
                    query.push(("pagination_cursor", cursor.as_str()));
                }
                self.client
                    .get(format!("{API_BASE}/calendar/list-events"))
                    .header("x-luma-api-key", &api_key)
                    .query(&query)
                    .send()
                    .await
                    .context(HttpSnafu)?
            };

            let status = response.status();
            match status.as_u16() {
                429 => {
                    return Err(FetchError::RateLimited {
                        retry_after_secs: RETRY_AFTER_SECS,
                    });
                }
                401 | 403 => {
                    return Err(FetchError::Authentication {
                        message: format!("upstream returned {status}"),
                    });
                }
                _ if !status.is_success() => {
                    return Err(FetchError::Upstream {
                        status: status.as_u16(),
                        message: response.text().await.unwrap_or_default(),
                    });
                }
                _ => {}
            }

            let page: ListEventsResponse = response.json().await.context(HttpSnafu)?;
            for entry in &page.entries {
                events.push(map_event(&entry.event)?);
                if opts.max_events <= events.len() {
                    break;
                }
            }

            if opts.max_events <= events.len() || !page.has_more {
                break;
            }
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        debug!(
            target: LOG_TARGET,
            calendar = %platform_id,
            count = events.len(),
            "Fetched events"
        );
        Ok(FetchOutcome {
            group: None,
            events,
        })
    }

    async fn fetch_group(&self, _platform_id: &str) -> FetchResult<Option<CanonicalGroup>> {
        Ok(None)
    }
}

#[derive(Deserialize)]
struct ListEventsResponse {
    entries: Vec<EventEntry>,
    #[serde(default)]
    has_more: bool,
    next_cursor: Option<String>,
}

#[derive(Deserialize)]
struct EventEntry {
    event: RawEvent,
}

#[derive(Deserialize)]
struct RawEvent {
    api_id: String,
    name: String,
    description: Option<String>,
    cover_url: Option<String>,
    url: String,
    start_at: String,
    end_at: Option<String>,
    timezone: Option<String>,
    meeting_url: Option<String>,
    geo_address_json: Option<GeoAddress>,
}

#[derive(Deserialize)]
struct GeoAddress {
    id: Option<String>,
    name: Option<String>,
    address: Option<String>,
    city: Option<String>,
    region: Option<String>,
    zip_code: Option<String>,
    country: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

fn map_venue(raw: &RawEvent) -> Option<CanonicalVenue> {
    let Some(geo) = raw.geo_address_json.as_ref() else {
        return raw.meeting_url.is_some().then(CanonicalVenue::online);
    };
    Some(CanonicalVenue {
        platform_venue_id: geo
            .id
            .clone()
            .unwrap_or_else(|| format!("addr:{}", geo.address.clone().unwrap_or_default())),
        name: geo
            .name
            .clone()
            .or_else(|| geo.address.clone())
            .unwrap_or_else(|| "Unnamed venue".to_string()),
        address: geo.address.clone(),
        city: geo.city.clone(),
        region: geo.region.clone(),
        postal_code: geo.zip_code.clone(),
        country: geo.country.clone(),
        lat: geo.latitude,
        lon: geo.longitude,
        is_online: false,
    })
}

fn map_event(raw: &RawEvent) -> FetchResult<CanonicalEvent> {
    let start_time =
        Timestamp::parse_rfc3339(&raw.start_at).map_err(|err| FetchError::Parse {
            message: format!("bad start_at `{}`: {err}", raw.start_at),
        })?;
    let end_time = raw
        .end_at
        .as_deref()
        .map(|end| {
            Timestamp::parse_rfc3339(end).map_err(|err| FetchError::Parse {
                message: format!("bad end_at `{end}`: {err}"),
            })
        })
        .transpose()?;

    let duration = end_time
        .filter(|end| start_time <= *end)
        .map(|end| IsoDuration::from_secs(end.secs_since(start_time)));

    let venue = map_venue(raw);
    let kind = match (&raw.meeting_url, &venue) {
        (Some(_), Some(v)) if !v.is_online => EventKind::Hybrid,
        (Some(_), _) => EventKind::Online,
        _ => EventKind::Physical,
    };

    Ok(CanonicalEvent {
        platform_id: raw.api_id.clone(),
        platform: Platform::Luma,
        title: raw.name.clone(),
        description: raw.description.clone(),
        event_url: raw.url.clone(),
        photo_url: raw.cover_url.clone(),
        start_time,
        end_time,
        timezone: raw.timezone.clone().unwrap_or_else(|| "UTC".to_string()),
        duration,
        // The listing only returns published events.
        status: EventStatus::Active,
        kind,
        rsvp_count: 0,
        max_attendees: None,
        venue,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(json: serde_json::Value) -> RawEvent {
        serde_json::from_value(json).expect("valid raw event")
    }

    fn base_event() -> serde_json::Value {
        serde_json::json!({
            "api_id": "evt-abc",
            "name": "Coffee & Code",
            "description": "Casual morning session",
            "cover_url": "https://images.lu.ma/evt-abc.png",
            "url": "https://lu.ma/evt-abc",
            "start_at": "2025-08-09T13:00:00Z",
            "end_at": "2025-08-09T15:00:00Z",
            "timezone": "America/New_York",
            "meeting_url": null,
            "geo_address_json": {
                "id": "geo-1",
                "name": "Corvus Coffee",
                "address": "1740 S Broadway",
                "city": "Denver",
                "region": "CO",
                "zip_code": "80210",
                "country": "US",
                "latitude": 39.68,
                "longitude": -104.99
            }
        })
    }

    #[test]
    fn maps_physical_event() {
        let canonical = map_event(&raw(base_event())).expect("maps");
        assert_eq!(canonical.platform, Platform::Luma);
        assert_eq!(canonical.kind, EventKind::Physical);
        assert_eq!(canonical.duration.map(|d| d.as_secs()), Some(7_200));
        let venue = canonical.venue.expect("venue");
        assert_eq!(venue.platform_venue_id, "geo-1");
        assert_eq!(venue.name, "Corvus Coffee");
    }

    #[test]
    fn meeting_url_means_online() {
        let mut json = base_event();
        json["meeting_url"] = serde_json::json!("https://meet.example.com/x");
        json["geo_address_json"] = serde_json::json!(null);
        let canonical = map_event(&raw(json)).expect("maps");
        assert_eq!(canonical.kind, EventKind::Online);
        assert!(canonical.venue.expect("venue").is_online);
    }

    #[test]
    fn bad_start_is_a_whole_record_error() {
        let mut json = base_event();
        json["start_at"] = serde_json::json!("later");
        assert!(matches!(
            map_event(&raw(json)),
            Err(FetchError::Parse { .. })
        ));
    }
}
