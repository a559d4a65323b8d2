//! GraphQL platform adapter (Meetup).
//!
//! Auth is a signed-JWT OAuth grant: we sign a short-lived RS256 JWT with the
//! configured private key, exchange it for a bearer token, and cache the
//! token for the adapter's lifetime. Fetches issue one parameterized query
//! and paginate by cursor.

use agora_core::canonical::{
    CanonicalEvent, CanonicalGroup, CanonicalVenue, EventKind, EventStatus,
};
use agora_core::{IsoDuration, Platform, Timestamp};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use snafu::ResultExt as _;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::{
    FetchError, FetchOpts, FetchOutcome, FetchResult, HttpSnafu, ProviderAdapter, ProviderEnv,
    http_client,
};

const LOG_TARGET: &str = "agora::provider::meetup";

const AUTH_URL: &str = "https://secure.meetup.com/oauth2/access";
const API_URL: &str = "https://api.meetup.com/gql";
const JWT_TTL_SECS: u64 = 120;
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;
/// Hero-card size appended to photo base URLs.
const PHOTO_SIZE: &str = "676x380.webp";

const EVENTS_QUERY: &str = r#"
query ($urlname: String!, $itemsNum: Int!, $cursor: String) {
  groupByUrlname(urlname: $urlname) {
    id
    name
    urlname
    description
    link
    memberships { count }
    groupPhoto { id baseUrl }
    upcomingEvents(input: { first: $itemsNum, after: $cursor }) {
      pageInfo { hasNextPage endCursor }
      edges {
        node {
          id
          title
          description
          eventUrl
          dateTime
          endTime
          duration
          timezone
          status
          eventType
          going
          maxTickets
          featuredEventPhoto { id baseUrl }
          venues {
            id
            name
            address
            city
            state
            postalCode
            country
            lat
            lng
          }
        }
      }
    }
  }
}
"#;

pub struct MeetupAdapter {
    client: reqwest::Client,
    token: RwLock<Option<String>>,
}

impl Default for MeetupAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MeetupAdapter {
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

    async fn query(
        &self,
        urlname: &str,
        items: usize,
        cursor: Option<&str>,
    ) -> FetchResult<GroupNode> {
        let token = self.bearer_token().await?;
        let response = self
            .client
            .post(API_URL)
            .bearer_auth(token)
            .json(&serde_json::json!({
                "query": EVENTS_QUERY,
                "variables": {
                    "urlname": urlname,
                    "itemsNum": items,
                    "cursor": cursor,
                },
            }))
            .send()
            .await
            .context(HttpSnafu)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Upstream {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let body: GqlResponse = response.json().await.context(HttpSnafu)?;

        if let Some(errors) = &body.errors {
            if let Some(retry_after_secs) = rate_limit_from_errors(errors) {
                return Err(FetchError::RateLimited { retry_after_secs });
            }
            if !errors.is_empty() {
                return Err(FetchError::Upstream {
                    status: status.as_u16(),
                    message: errors
                        .iter()
                        .map(|e| e.message.as_str())
                        .collect::<Vec<_>>()
                        .join("; "),
                });
            }
        }

        body.data
            .and_then(|data| data.group_by_urlname)
            .ok_or_else(|| FetchError::InvalidIdentifier {
                message: format!("no group found for urlname `{urlname}`"),
            })
    }
}

#[async_trait]
impl ProviderAdapter for MeetupAdapter {
    fn platform(&self) -> Platform {
        Platform::Meetup
    }

    fn display_name(&self) -> &'static str {
        "Meetup"
    }

    fn is_configured(&self, env: &ProviderEnv) -> bool {
        env.meetup_client_key.is_some()
            && env.meetup_signing_key.is_some()
            && env.meetup_member_id.is_some()
    }

    async fn initialize(&self, env: &ProviderEnv) -> FetchResult<()> {
        if self.token.read().await.is_some() {
            return Ok(());
        }

        let (client_key, signing_key, member_id) = match (
            &env.meetup_client_key,
            &env.meetup_signing_key,
            &env.meetup_member_id,
        ) {
            (Some(a), Some(b), Some(c)) => (a, b, c),
            _ => {
                return Err(FetchError::NotConfigured {
                    platform: Platform::Meetup,
                });
            }
        };

        let assertion = sign_grant_jwt(client_key, signing_key, member_id)?;

        let response = self
            .client
            .post(AUTH_URL)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .context(HttpSnafu)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Authentication {
                message: format!(
                    "token endpoint returned {status}: {}",
                    response.text().await.unwrap_or_default()
                ),
            });
        }

        let grant: TokenResponse = response.json().await.context(HttpSnafu)?;
        *self.token.write().await = Some(grant.access_token);
        info!(target: LOG_TARGET, "Obtained access token");
        Ok(())
    }

    async fn fetch_events(
        &self,
        platform_id: &str,
        opts: &FetchOpts,
    ) -> FetchResult<FetchOutcome> {
        if platform_id.trim().is_empty() {
            return Err(FetchError::InvalidIdentifier {
                message: "empty group urlname".to_string(),
            });
        }

        let mut events = Vec::new();
        let mut cursor: Option<String> = None;
        let mut group = None;

        loop {
            let page_size = (opts.max_events - events.len()).min(50);
            let node = self
                .query(platform_id, page_size, cursor.as_deref())
                .await?;

            if group.is_none() {
                group = Some(map_group(&node)?);
            }

            let Some(connection) = &node.upcoming_events else {
                break;
            };
            for edge in &connection.edges {
                events.push(map_event(&edge.node)?);
                if opts.max_events <= events.len() {
                    break;
                }
            }

            if opts.max_events <= events.len() || !connection.page_info.has_next_page {
                break;
            }
            match &connection.page_info.end_cursor {
                Some(end) => cursor = Some(end.clone()),
                None => break,
            }
        }

        debug!(
            target: LOG_TARGET,
            urlname = %platform_id,
            count = events.len(),
            "Fetched events"
        );
        Ok(FetchOutcome { group, events })
    }

    async fn fetch_group(&self, platform_id: &str) -> FetchResult<Option<CanonicalGroup>> {
        let node = self.query(platform_id, 1, None).await?;
        Ok(Some(map_group(&node)?))
    }
}

#[derive(Serialize)]
struct GrantClaims<'a> {
    iss: &'a str,
    sub: &'a str,
    aud: &'a str,
    exp: u64,
}

fn sign_grant_jwt(client_key: &str, signing_key_pem: &str, member_id: &str) -> FetchResult<String> {
    let key = jsonwebtoken::EncodingKey::from_rsa_pem(signing_key_pem.as_bytes()).map_err(
        |err| FetchError::Authentication {
            message: format!("invalid signing key: {err}"),
        },
    )?;
    let claims = GrantClaims {
        iss: client_key,
        sub: member_id,
        aud: "api.meetup.com",
        exp: Timestamp::now().as_secs() + JWT_TTL_SECS,
    };
    jsonwebtoken::encode(
        &jsonwebtoken::Header::new(jsonwebtoken::Algorithm::RS256),
        &claims,
        &key,
    )
    .map_err(|err| FetchError::Authentication {
        message: format!("failed to sign grant: {err}"),
    })
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct GqlResponse {
    data: Option<GqlData>,
    errors: Option<Vec<GqlError>>,
}

#[derive(Deserialize)]
struct GqlData {
    #[serde(rename = "groupByUrlname")]
    group_by_urlname: Option<GroupNode>,
}

#[derive(Deserialize, Debug)]
struct GqlError {
    message: String,
    extensions: Option<GqlErrorExtensions>,
}

#[derive(Deserialize, Debug)]
struct GqlErrorExtensions {
    code: Option<String>,
    #[serde(rename = "retryAfter")]
    retry_after: Option<u64>,
}

#[derive(Deserialize)]
struct GroupNode {
    id: String,
    name: String,
    urlname: String,
    description: Option<String>,
    link: String,
    memberships: Option<MembershipCount>,
    #[serde(rename = "groupPhoto")]
    group_photo: Option<PhotoNode>,
    #[serde(rename = "upcomingEvents")]
    upcoming_events: Option<EventConnection>,
}

#[derive(Deserialize)]
struct MembershipCount {
    count: u32,
}

#[derive(Deserialize)]
struct PhotoNode {
    id: String,
    #[serde(rename = "baseUrl")]
    base_url: String,
}

#[derive(Deserialize)]
struct EventConnection {
    #[serde(rename = "pageInfo")]
    page_info: PageInfo,
    edges: Vec<EventEdge>,
}

#[derive(Deserialize)]
struct PageInfo {
    #[serde(rename = "hasNextPage")]
    has_next_page: bool,
    #[serde(rename = "endCursor")]
    end_cursor: Option<String>,
}

#[derive(Deserialize)]
struct EventEdge {
    node: EventNode,
}

#[derive(Deserialize)]
struct EventNode {
    id: String,
    title: String,
    description: Option<String>,
    #[serde(rename = "eventUrl")]
    event_url: String,
    #[serde(rename = "dateTime")]
    date_time: String,
    #[serde(rename = "endTime")]
    end_time: Option<String>,
    duration: Option<String>,
    timezone: String,
    status: String,
    #[serde(rename = "eventType")]
    event_type: String,
    going: Option<u32>,
    #[serde(rename = "maxTickets")]
    max_tickets: Option<u32>,
    #[serde(rename = "featuredEventPhoto")]
    featured_event_photo: Option<PhotoNode>,
    venues: Option<Vec<VenueNode>>,
}

#[derive(Deserialize)]
struct VenueNode {
    id: String,
    name: String,
    address: Option<String>,
    city: Option<String>,
    state: Option<String>,
    #[serde(rename = "postalCode")]
    postal_code: Option<String>,
    country: Option<String>,
    lat: Option<f64>,
    lng: Option<f64>,
}

fn rate_limit_from_errors(errors: &[GqlError]) -> Option<u64> {
    errors.iter().find_map(|err| {
        let extensions = err.extensions.as_ref()?;
        (extensions.code.as_deref() == Some("RATE_LIMITED"))
            .then(|| extensions.retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS))
    })
}

fn map_status(status: &str) -> FetchResult<EventStatus> {
    match status {
        "ACTIVE" | "PUBLISHED" => Ok(EventStatus::Active),
        "CANCELED" | "CANCELLED" => Ok(EventStatus::Cancelled),
        "DRAFT" => Ok(EventStatus::Draft),
        other => Err(FetchError::Parse {
            message: format!("unknown event status `{other}`"),
        }),
    }
}

fn map_event_type(event_type: &str) -> FetchResult<EventKind> {
    match event_type {
        "PHYSICAL" => Ok(EventKind::Physical),
        "ONLINE" => Ok(EventKind::Online),
        "HYBRID" => Ok(EventKind::Hybrid),
        other => Err(FetchError::Parse {
            message: format!("unknown event type `{other}`"),
        }),
    }
}

fn sized_photo_url(photo: &PhotoNode) -> String {
    format!(
        "{}/{}/{PHOTO_SIZE}",
        photo.base_url.trim_end_matches('/'),
        photo.id
    )
}

fn map_venue(node: &EventNode, kind: EventKind) -> Option<CanonicalVenue> {
    let venue = node.venues.as_ref().and_then(|v| v.first());
    match venue {
        // No venue, or the upstream "Online event" placeholder, both collapse
        // onto the shared online venue.
        None => (kind == EventKind::Online).then(CanonicalVenue::online),
        Some(v) if v.name == "Online event" => Some(CanonicalVenue::online()),
        Some(v) => Some(CanonicalVenue {
            platform_venue_id: v.id.clone(),
            name: v.name.clone(),
            address: v.address.clone(),
            city: v.city.clone(),
            region: v.state.clone(),
            postal_code: v.postal_code.clone(),
            country: v.country.clone(),
            lat: v.lat,
            lon: v.lng,
            is_online: false,
        }),
    }
}

fn map_event(node: &EventNode) -> FetchResult<CanonicalEvent> {
    let status = map_status(&node.status)?;
    let kind = map_event_type(&node.event_type)?;

    let start_time =
        Timestamp::parse_rfc3339(&node.date_time).map_err(|err| FetchError::Parse {
            message: format!("bad dateTime `{}`: {err}", node.date_time),
        })?;

    let duration = node
        .duration
        .as_deref()
        .map(|d| {
            IsoDuration::parse(d).map_err(|err| FetchError::Parse {
                message: format!("bad duration `{d}`: {err}"),
            })
        })
        .transpose()?;

    let end_time = match &node.end_time {
        Some(end) => Some(
            Timestamp::parse_rfc3339(end).map_err(|err| FetchError::Parse {
                message: format!("bad endTime `{end}`: {err}"),
            })?,
        ),
        // Derived from the duration when the upstream omits an end.
        None => duration.map(|d| start_time.saturating_add_secs(d.as_secs())),
    };

    Ok(CanonicalEvent {
        platform_id: node.id.clone(),
        platform: Platform::Meetup,
        title: node.title.clone(),
        description: node.description.clone(),
        event_url: node.event_url.clone(),
        photo_url: node.featured_event_photo.as_ref().map(sized_photo_url),
        start_time,
        end_time,
        timezone: node.timezone.clone(),
        duration,
        status,
        kind,
        rsvp_count: node.going.unwrap_or(0),
        max_attendees: node.max_tickets,
        venue: map_venue(node, kind),
    })
}

fn map_group(node: &GroupNode) -> FetchResult<CanonicalGroup> {
    Ok(CanonicalGroup {
        platform_id: node.id.clone(),
        platform: Platform::Meetup,
        urlname: node.urlname.clone(),
        name: node.name.clone(),
        description: node.description.clone(),
        link: node.link.clone(),
        member_count: node.memberships.as_ref().map(|m| m.count),
        photo_url: node.group_photo.as_ref().map(sized_photo_url),
    })
}
