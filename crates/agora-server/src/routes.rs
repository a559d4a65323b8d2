//! HTTP surface: thin JSON adapters over the services and the MCP
//! dispatcher. Handlers publish the domain events services return; no
//! business logic lives here.

use std::sync::Arc;

use agora_core::id::{EventId, GroupId, UserId};
use agora_db::Database;
use agora_engine::{
    BusSender, CheckinService, ClaimService, FavoritesService, Notifier, ProfileService,
    ProfileUpdate, RsvpService, ServiceError, SyncOpts, SyncService,
};
use agora_mcp::{McpAuth, McpContext, McpDispatcher, well_known_document};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::error::{ApiError, ApiResult};

pub struct AppInner {
    pub db: Arc<Database>,
    pub bus: BusSender,
    pub sync: Arc<SyncService>,
    pub rsvps: RsvpService,
    pub favorites: FavoritesService,
    pub claims: ClaimService,
    pub checkins: CheckinService,
    pub profiles: ProfileService,
    pub mcp: McpDispatcher,
    pub notifier: Notifier,
}

pub type AppState = Arc<AppInner>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/.well-known/mcp-configuration", get(mcp_well_known))
        .route("/mcp", post(mcp_endpoint))
        .route("/admin/sync", post(admin_sync))
        .route("/admin/sync/logs", get(admin_sync_logs))
        .route("/events/{event_id}/rsvp", post(rsvp_create))
        .route("/events/{event_id}/rsvp/cancel", post(rsvp_cancel))
        .route("/events/{event_id}/checkin", post(checkin))
        .route("/groups/{slug}/favorite", post(favorite_add))
        .route("/groups/{slug}/unfavorite", post(favorite_remove))
        .route("/claim/{code}", post(claim_badge))
        .route("/users/{user_id}/profile", post(profile_update))
        .layer(axum::extract::DefaultBodyLimit::max(agora_mcp::MAX_BODY_BYTES))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn mcp_well_known() -> Json<serde_json::Value> {
    Json(well_known_document())
}

/// Scope extraction for MCP calls. OAuth issuance and validation live in the
/// fronting auth layer; it injects the granted scopes. No Authorization
/// header at all means a trusted session (all scopes).
fn mcp_auth(headers: &HeaderMap) -> McpAuth {
    if headers.get("authorization").is_none() {
        return McpAuth::session();
    }
    let scopes = headers
        .get("x-granted-scopes")
        .and_then(|value| value.to_str().ok())
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToOwned::to_owned)
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    McpAuth::with_scopes(scopes)
}

async fn mcp_endpoint(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    let ctx = McpContext {
        db: state.db.clone(),
        bus: state.bus.clone(),
        sync: state.sync.clone(),
        auth: mcp_auth(&headers),
    };
    match state.mcp.handle(&body, &ctx).await {
        Some(response) => Json(response).into_response(),
        // Notifications only: acknowledged, nothing to say.
        None => StatusCode::ACCEPTED.into_response(),
    }
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct SyncRequest {
    group_ids: Option<Vec<String>>,
    #[serde(default)]
    force: bool,
}

async fn admin_sync(
    State(state): State<AppState>,
    body: axum::body::Bytes,
) -> ApiResult<Json<agora_engine::SyncAllResult>> {
    let request: SyncRequest = if body.is_empty() {
        SyncRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|err| {
            ApiError(ServiceError::BadRequest {
                message: format!("invalid request body: {err}"),
            })
        })?
    };
    let group_ids = request
        .group_ids
        .map(|raw| {
            raw.iter()
                .map(|id| {
                    id.parse::<GroupId>().map_err(|_| {
                        ApiError(ServiceError::BadRequest {
                            message: format!("`{id}` is not a valid group id"),
                        })
                    })
                })
                .collect::<Result<Vec<_>, _>>()
        })
        .transpose()?;

    let result = state
        .sync
        .sync_all_groups(&SyncOpts {
            group_ids,
            force: request.force,
            ..Default::default()
        })
        .await?;
    Ok(Json(result))
}

#[derive(Deserialize)]
struct SyncLogsQuery {
    limit: Option<usize>,
    group_id: Option<String>,
}

async fn admin_sync_logs(
    State(state): State<AppState>,
    Query(query): Query<SyncLogsQuery>,
) -> ApiResult<Json<Vec<agora_db::SyncLogRecord>>> {
    let group_id = query
        .group_id
        .map(|raw| {
            raw.parse::<GroupId>().map_err(|_| {
                ApiError(ServiceError::BadRequest {
                    message: format!("`{raw}` is not a valid group id"),
                })
            })
        })
        .transpose()?;
    let logs = state
        .sync
        .get_sync_logs(query.limit.unwrap_or(50), group_id)
        .await?;
    Ok(Json(logs))
}

fn parse_id<T: std::str::FromStr>(raw: &str, what: &str) -> Result<T, ApiError> {
    raw.parse().map_err(|_| {
        ApiError(ServiceError::BadRequest {
            message: format!("`{raw}` is not a valid {what}"),
        })
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserBody {
    user_id: String,
}

async fn rsvp_create(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    Json(body): Json<UserBody>,
) -> ApiResult<Json<agora_engine::RsvpOutput>> {
    let event_id: EventId = parse_id(&event_id, "event id")?;
    let user_id: UserId = parse_id(&body.user_id, "user id")?;
    let (output, events) = state.rsvps.create_rsvp(event_id, user_id).await?;
    for event in events {
        let _ = state.bus.emit(event).await;
    }
    Ok(Json(output))
}

async fn rsvp_cancel(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    Json(body): Json<UserBody>,
) -> ApiResult<Json<agora_engine::RsvpOutput>> {
    let event_id: EventId = parse_id(&event_id, "event id")?;
    let user_id: UserId = parse_id(&body.user_id, "user id")?;
    let (output, events) = state.rsvps.cancel_rsvp(event_id, user_id).await?;
    for event in events {
        let _ = state.bus.emit(event).await;
    }
    Ok(Json(output))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckinBody {
    user_id: String,
    code: String,
}

async fn checkin(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    Json(body): Json<CheckinBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let event_id: EventId = parse_id(&event_id, "event id")?;
    let user_id: UserId = parse_id(&body.user_id, "user id")?;
    let events = state.checkins.check_in(event_id, &body.code, user_id).await?;
    for event in events {
        let _ = state.bus.emit(event).await;
    }
    Ok(Json(json!({ "checkedIn": true })))
}

async fn favorite_add(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Json(body): Json<UserBody>,
) -> ApiResult<Json<agora_engine::FavoriteOutput>> {
    let user_id: UserId = parse_id(&body.user_id, "user id")?;
    let (output, events) = state.favorites.add_favorite(user_id, &slug).await?;
    for event in events {
        let _ = state.bus.emit(event).await;
    }
    Ok(Json(output))
}

async fn favorite_remove(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Json(body): Json<UserBody>,
) -> ApiResult<Json<agora_engine::FavoriteOutput>> {
    let user_id: UserId = parse_id(&body.user_id, "user id")?;
    let (output, events) = state.favorites.remove_favorite(user_id, &slug).await?;
    for event in events {
        let _ = state.bus.emit(event).await;
    }
    Ok(Json(output))
}

async fn claim_badge(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(body): Json<UserBody>,
) -> ApiResult<Json<agora_engine::ClaimOutput>> {
    let user_id: UserId = parse_id(&body.user_id, "user id")?;
    let (output, events) = state.claims.claim_badge(&code, user_id).await?;
    for event in events {
        let _ = state.bus.emit(event).await;
    }
    Ok(Json(output))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileBody {
    display_name: Option<String>,
    bio: Option<String>,
    avatar_url: Option<String>,
    public: Option<bool>,
}

async fn profile_update(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(body): Json<ProfileBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let user_id: UserId = parse_id(&user_id, "user id")?;
    let events = state
        .profiles
        .update_profile(
            user_id,
            ProfileUpdate {
                display_name: body.display_name,
                bio: body.bio,
                avatar_url: body.avatar_url,
                public: body.public,
            },
        )
        .await?;
    for event in events {
        let _ = state.bus.emit(event).await;
    }
    Ok(Json(json!({ "updated": true })))
}
