//! Built-in tool, resource, and prompt registrations.
//!
//! Read paths go straight through the store; mutating tools call the same
//! services the HTTP layer uses and publish the returned domain events on
//! the bus.

use std::collections::BTreeMap;

use agora_core::Timestamp;
use agora_core::id::{EventId, UserId};
use agora_engine::{RsvpService, ServiceError, SyncOpts};
use async_trait::async_trait;
use serde_json::{Map, Value, json};

use crate::registry::{
    McpRegistry, Prompt, PromptArgument, PromptHandler, Resource, ResourceHandler,
    ResourceTemplate, Tool, ToolHandler, ToolResult,
};
use crate::{McpContext, scopes};

fn schema(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

fn arg_str(args: &Map<String, Value>, name: &str) -> String {
    args.get(name)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn service_error(err: ServiceError) -> ToolResult {
    ToolResult::error(err.to_string())
}

struct GroupsList;

#[async_trait]
impl ToolHandler for GroupsList {
    async fn call(&self, _args: Map<String, Value>, ctx: &McpContext) -> ToolResult {
        match ctx.db.list_groups().await {
            Ok(groups) => {
                let listed: Vec<Value> = groups
                    .iter()
                    .filter(|(_, g)| g.display)
                    .map(|(id, g)| {
                        json!({
                            "id": id.to_string(),
                            "slug": g.slug,
                            "name": g.name,
                            "memberCount": g.member_count,
                            "featured": g.featured,
                            "tags": g.tags,
                        })
                    })
                    .collect();
                ToolResult::json(&listed)
            }
            Err(err) => ToolResult::error(err.to_string()),
        }
    }
}

struct GroupsGet;

#[async_trait]
impl ToolHandler for GroupsGet {
    async fn call(&self, args: Map<String, Value>, ctx: &McpContext) -> ToolResult {
        let slug = arg_str(&args, "slug");
        match ctx.db.get_group_by_slug(&slug).await {
            Ok(Some((id, group))) => ToolResult::json(&json!({
                "id": id.to_string(),
                "slug": group.slug,
                "name": group.name,
                "description": group.description,
                "memberCount": group.member_count,
                "tags": group.tags,
                "socialLinks": group.social_links,
                "connections": group.connections,
            })),
            Ok(None) => ToolResult::error(format!("group `{slug}` not found")),
            Err(err) => ToolResult::error(err.to_string()),
        }
    }
}

struct EventsList;

#[async_trait]
impl ToolHandler for EventsList {
    async fn call(&self, args: Map<String, Value>, ctx: &McpContext) -> ToolResult {
        let limit = args
            .get("limit")
            .and_then(Value::as_u64)
            .unwrap_or(20)
            .min(100) as usize;
        match ctx.db.list_upcoming_events(Timestamp::now(), limit).await {
            Ok(events) => {
                let listed: Vec<Value> = events
                    .iter()
                    .map(|(id, event)| {
                        json!({
                            "id": id.to_string(),
                            "title": event.title,
                            "url": event.event_url,
                            "startTime": event.start_time.to_rfc3339(),
                            "platform": event.platform.as_str(),
                            "status": event.status.as_str(),
                            "kind": event.kind.as_str(),
                            "rsvpCount": event.rsvp_count,
                        })
                    })
                    .collect();
                ToolResult::json(&listed)
            }
            Err(err) => ToolResult::error(err.to_string()),
        }
    }
}

struct EventsGet;

#[async_trait]
impl ToolHandler for EventsGet {
    async fn call(&self, args: Map<String, Value>, ctx: &McpContext) -> ToolResult {
        let raw_id = arg_str(&args, "event_id");
        let Ok(event_id) = raw_id.parse::<EventId>() else {
            return ToolResult::error(format!("`{raw_id}` is not a valid event id"));
        };
        match ctx.db.get_event(event_id).await {
            Ok(Some(event)) => ToolResult::json(&event),
            Ok(None) => ToolResult::error(format!("event `{raw_id}` not found")),
            Err(err) => ToolResult::error(err.to_string()),
        }
    }
}

struct BadgesList;

#[async_trait]
impl ToolHandler for BadgesList {
    async fn call(&self, _args: Map<String, Value>, ctx: &McpContext) -> ToolResult {
        match ctx.db.list_directory_badges().await {
            Ok(badges) => {
                let listed: Vec<Value> = badges
                    .iter()
                    .map(|(id, badge)| {
                        json!({
                            "id": id.to_string(),
                            "slug": badge.slug,
                            "name": badge.name,
                            "points": badge.points,
                        })
                    })
                    .collect();
                ToolResult::json(&listed)
            }
            Err(err) => ToolResult::error(err.to_string()),
        }
    }
}

struct AchievementsList;

#[async_trait]
impl ToolHandler for AchievementsList {
    async fn call(&self, _args: Map<String, Value>, ctx: &McpContext) -> ToolResult {
        match ctx.db.list_achievements().await {
            Ok(achievements) => {
                let listed: Vec<Value> = achievements
                    .iter()
                    .filter(|(_, a)| a.enabled && !a.hidden)
                    .map(|(key, a)| {
                        json!({
                            "key": key,
                            "name": a.name,
                            "description": a.description,
                            "targetValue": a.target_value,
                            "points": a.points,
                        })
                    })
                    .collect();
                ToolResult::json(&listed)
            }
            Err(err) => ToolResult::error(err.to_string()),
        }
    }
}

struct UserBadgesList;

#[async_trait]
impl ToolHandler for UserBadgesList {
    async fn call(&self, args: Map<String, Value>, ctx: &McpContext) -> ToolResult {
        let username = arg_str(&args, "username");
        let user = match ctx.db.get_user_by_username(&username).await {
            Ok(Some((user_id, _))) => user_id,
            Ok(None) => return ToolResult::error(format!("user `{username}` not found")),
            Err(err) => return ToolResult::error(err.to_string()),
        };
        match ctx.db.list_user_badges(user).await {
            Ok(badges) => {
                let listed: Vec<Value> = badges
                    .iter()
                    .map(|(_, badge, awarded)| {
                        json!({
                            "slug": badge.slug,
                            "name": badge.name,
                            "points": badge.points,
                            "awardedAt": awarded.awarded_at.to_rfc3339(),
                        })
                    })
                    .collect();
                ToolResult::json(&listed)
            }
            Err(err) => ToolResult::error(err.to_string()),
        }
    }
}

struct RsvpCreate;

#[async_trait]
impl ToolHandler for RsvpCreate {
    async fn call(&self, args: Map<String, Value>, ctx: &McpContext) -> ToolResult {
        let raw_event = arg_str(&args, "event_id");
        let Ok(event_id) = raw_event.parse::<EventId>() else {
            return ToolResult::error(format!("`{raw_event}` is not a valid event id"));
        };
        let user_id = match args.get("user_id").and_then(Value::as_str) {
            Some(raw) => match raw.parse::<UserId>() {
                Ok(user_id) => user_id,
                Err(_) => return ToolResult::error(format!("`{raw}` is not a valid user id")),
            },
            None => match ctx.auth.user_id {
                Some(user_id) => user_id,
                None => return ToolResult::error("no user to RSVP as".to_string()),
            },
        };

        let service = RsvpService::new(ctx.db.clone());
        match service.create_rsvp(event_id, user_id).await {
            Ok((output, events)) => {
                for event in events {
                    ctx.bus.emit_nowait(event);
                }
                ToolResult::json(&output)
            }
            Err(err) => service_error(err),
        }
    }
}

struct SyncTrigger;

#[async_trait]
impl ToolHandler for SyncTrigger {
    async fn call(&self, args: Map<String, Value>, ctx: &McpContext) -> ToolResult {
        let force = args.get("force").and_then(Value::as_bool).unwrap_or(false);
        match ctx
            .sync
            .sync_all_groups(&SyncOpts {
                force,
                ..Default::default()
            })
            .await
        {
            Ok(result) => ToolResult::json(&result),
            Err(err) => service_error(err),
        }
    }
}

struct AdminListUsers;

#[async_trait]
impl ToolHandler for AdminListUsers {
    async fn call(&self, args: Map<String, Value>, ctx: &McpContext) -> ToolResult {
        let limit = args
            .get("limit")
            .and_then(Value::as_u64)
            .unwrap_or(50)
            .min(500) as usize;
        match ctx.db.list_users(limit).await {
            Ok(users) => {
                let listed: Vec<Value> = users
                    .iter()
                    .map(|(id, user)| {
                        json!({
                            "id": id.to_string(),
                            "username": user.username,
                            "role": user.role,
                            "public": user.public,
                        })
                    })
                    .collect();
                ToolResult::json(&listed)
            }
            Err(err) => ToolResult::error(err.to_string()),
        }
    }
}

struct GroupsResource;

#[async_trait]
impl ResourceHandler for GroupsResource {
    async fn read(
        &self,
        _uri: &str,
        _params: BTreeMap<String, String>,
        ctx: &McpContext,
    ) -> Result<Value, String> {
        let groups = ctx.db.list_groups().await.map_err(|e| e.to_string())?;
        Ok(json!(
            groups
                .iter()
                .filter(|(_, g)| g.display)
                .map(|(id, g)| json!({
                    "id": id.to_string(),
                    "slug": g.slug,
                    "name": g.name,
                }))
                .collect::<Vec<_>>()
        ))
    }
}

struct GroupBySlugResource;

#[async_trait]
impl ResourceHandler for GroupBySlugResource {
    async fn read(
        &self,
        _uri: &str,
        params: BTreeMap<String, String>,
        ctx: &McpContext,
    ) -> Result<Value, String> {
        let slug = params.get("slug").cloned().unwrap_or_default();
        let Some((id, group)) = ctx
            .db
            .get_group_by_slug(&slug)
            .await
            .map_err(|e| e.to_string())?
        else {
            return Err(format!("group `{slug}` not found"));
        };
        Ok(json!({
            "id": id.to_string(),
            "slug": group.slug,
            "name": group.name,
            "description": group.description,
            "memberCount": group.member_count,
        }))
    }
}

struct UpcomingEventsResource;

#[async_trait]
impl ResourceHandler for UpcomingEventsResource {
    async fn read(
        &self,
        _uri: &str,
        _params: BTreeMap<String, String>,
        ctx: &McpContext,
    ) -> Result<Value, String> {
        let events = ctx
            .db
            .list_upcoming_events(Timestamp::now(), 50)
            .await
            .map_err(|e| e.to_string())?;
        Ok(json!(
            events
                .iter()
                .map(|(id, event)| json!({
                    "id": id.to_string(),
                    "title": event.title,
                    "startTime": event.start_time.to_rfc3339(),
                    "url": event.event_url,
                }))
                .collect::<Vec<_>>()
        ))
    }
}

struct EventAnnouncementPrompt;

#[async_trait]
impl PromptHandler for EventAnnouncementPrompt {
    async fn get(
        &self,
        args: Map<String, Value>,
        ctx: &McpContext,
    ) -> Result<Value, String> {
        let raw_id = arg_str(&args, "event_id");
        let event_id: EventId = raw_id
            .parse()
            .map_err(|_| format!("`{raw_id}` is not a valid event id"))?;
        let Some(event) = ctx.db.get_event(event_id).await.map_err(|e| e.to_string())? else {
            return Err(format!("event `{raw_id}` not found"));
        };
        Ok(json!({
            "description": "Draft an announcement post for an upcoming event",
            "messages": [{
                "role": "user",
                "content": {
                    "type": "text",
                    "text": format!(
                        "Write a short, enthusiastic announcement for this event.\n\n\
                         Title: {}\nStarts: {}\nLink: {}\n\n{}",
                        event.title,
                        event.start_time.to_rfc3339(),
                        event.event_url,
                        event.description.unwrap_or_default(),
                    ),
                },
            }],
        }))
    }
}

struct GroupDigestPrompt;

#[async_trait]
impl PromptHandler for GroupDigestPrompt {
    async fn get(
        &self,
        args: Map<String, Value>,
        ctx: &McpContext,
    ) -> Result<Value, String> {
        let slug = arg_str(&args, "slug");
        let Some((group_id, group)) = ctx
            .db
            .get_group_by_slug(&slug)
            .await
            .map_err(|e| e.to_string())?
        else {
            return Err(format!("group `{slug}` not found"));
        };
        let events = ctx
            .db
            .list_events_by_group(group_id)
            .await
            .map_err(|e| e.to_string())?;
        let upcoming: Vec<String> = events
            .iter()
            .filter(|(_, e)| Timestamp::now() <= e.start_time)
            .map(|(_, e)| format!("- {} ({})", e.title, e.start_time.to_rfc3339()))
            .collect();
        Ok(json!({
            "description": "Draft a digest of a group's upcoming events",
            "messages": [{
                "role": "user",
                "content": {
                    "type": "text",
                    "text": format!(
                        "Summarize the upcoming schedule for {}:\n{}",
                        group.name,
                        upcoming.join("\n"),
                    ),
                },
            }],
        }))
    }
}

/// Register every built-in tool, resource, and prompt.
pub fn register_builtins(registry: &mut McpRegistry) {
    registry.register_tool(Tool {
        name: "groups_list",
        description: "List the community groups in the directory",
        input_schema: schema(json!({}), &[]),
        required_scope: None,
        handler: std::sync::Arc::new(GroupsList),
    });
    registry.register_tool(Tool {
        name: "groups_get",
        description: "Fetch one group by its slug",
        input_schema: schema(json!({ "slug": { "type": "string" } }), &["slug"]),
        required_scope: None,
        handler: std::sync::Arc::new(GroupsGet),
    });
    registry.register_tool(Tool {
        name: "events_list",
        description: "List upcoming events across all groups",
        input_schema: schema(json!({ "limit": { "type": "integer" } }), &[]),
        required_scope: Some(scopes::READ_EVENTS),
        handler: std::sync::Arc::new(EventsList),
    });
    registry.register_tool(Tool {
        name: "events_get",
        description: "Fetch one event by id",
        input_schema: schema(json!({ "event_id": { "type": "string" } }), &["event_id"]),
        required_scope: Some(scopes::READ_EVENTS),
        handler: std::sync::Arc::new(EventsGet),
    });
    registry.register_tool(Tool {
        name: "badges_list",
        description: "List badges visible in the public directory",
        input_schema: schema(json!({}), &[]),
        required_scope: None,
        handler: std::sync::Arc::new(BadgesList),
    });
    registry.register_tool(Tool {
        name: "achievements_list",
        description: "List visible achievements",
        input_schema: schema(json!({}), &[]),
        required_scope: None,
        handler: std::sync::Arc::new(AchievementsList),
    });
    registry.register_tool(Tool {
        name: "user_badges_list",
        description: "List the badges a user has earned",
        input_schema: schema(json!({ "username": { "type": "string" } }), &["username"]),
        required_scope: Some(scopes::READ_USERS),
        handler: std::sync::Arc::new(UserBadgesList),
    });
    registry.register_tool(Tool {
        name: "rsvp_create",
        description: "RSVP to an event",
        input_schema: schema(
            json!({
                "event_id": { "type": "string" },
                "user_id": { "type": "string" },
            }),
            &["event_id"],
        ),
        required_scope: Some(scopes::WRITE_RSVPS),
        handler: std::sync::Arc::new(RsvpCreate),
    });
    registry.register_tool(Tool {
        name: "sync_trigger",
        description: "Run a sync pass over all connected platforms",
        input_schema: schema(json!({ "force": { "type": "boolean" } }), &[]),
        required_scope: Some(scopes::ADMIN),
        handler: std::sync::Arc::new(SyncTrigger),
    });
    registry.register_tool(Tool {
        name: "admin_list_users",
        description: "List registered users",
        input_schema: schema(json!({ "limit": { "type": "integer" } }), &[]),
        required_scope: Some(scopes::ADMIN),
        handler: std::sync::Arc::new(AdminListUsers),
    });

    registry.register_resource(Resource {
        uri: "agora://groups",
        name: "Groups",
        description: "The public group directory",
        required_scope: None,
        handler: std::sync::Arc::new(GroupsResource),
    });
    registry.register_resource(Resource {
        uri: "agora://events/upcoming",
        name: "Upcoming events",
        description: "Upcoming events across all groups",
        required_scope: Some(scopes::READ_EVENTS),
        handler: std::sync::Arc::new(UpcomingEventsResource),
    });
    registry.register_template(ResourceTemplate {
        uri_template: "agora://groups/{slug}",
        name: "Group by slug",
        description: "One group's public profile",
        required_scope: None,
        handler: std::sync::Arc::new(GroupBySlugResource),
    });

    registry.register_prompt(Prompt {
        name: "event_announcement",
        description: "Draft an announcement post for an event",
        arguments: vec![PromptArgument {
            name: "event_id",
            description: "Canonical event id",
            required: true,
        }],
        required_scope: None,
        handler: std::sync::Arc::new(EventAnnouncementPrompt),
    });
    registry.register_prompt(Prompt {
        name: "group_digest",
        description: "Draft a digest of a group's upcoming events",
        arguments: vec![PromptArgument {
            name: "slug",
            description: "Group slug",
            required: true,
        }],
        required_scope: None,
        handler: std::sync::Arc::new(GroupDigestPrompt),
    });
}
