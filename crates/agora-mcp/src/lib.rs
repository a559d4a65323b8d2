//! MCP surface: a JSON-RPC 2.0 server exposing tools, resources, and
//! prompts over the same store and services the HTTP API uses.
//!
//! Everything is registered at startup into [`McpRegistry`] and read-only
//! afterwards. Each registered item declares a required scope (or none);
//! list methods filter by the caller's scopes, `tools/call` re-checks and
//! answers denials as in-band `isError` results rather than protocol
//! errors.

mod auth;
mod dispatcher;
mod registry;
mod rpc;
mod schema;
mod tools;
mod uri_template;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use agora_db::Database;
use agora_engine::{BusSender, SyncService};

pub use self::auth::{McpAuth, ScopeSet};
pub use self::dispatcher::{McpDispatcher, well_known_document};
pub use self::registry::{
    McpRegistry, Prompt, PromptArgument, PromptHandler, Resource, ResourceHandler,
    ResourceTemplate, Tool, ToolContent, ToolHandler, ToolResult,
};
pub use self::schema::validate_arguments;
pub use self::tools::register_builtins;

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "agora";
pub const MAX_BODY_BYTES: usize = 1024 * 1024;
pub const MAX_BATCH: usize = 10;

/// Well-known scope names used by the built-in registrations.
pub mod scopes {
    pub const READ_EVENTS: &str = "read:events";
    pub const READ_USERS: &str = "read:users";
    pub const WRITE_RSVPS: &str = "write:rsvps";
    pub const ADMIN: &str = "admin";
}

/// Everything a tool/resource/prompt handler may touch.
#[derive(Clone)]
pub struct McpContext {
    pub db: Arc<Database>,
    pub bus: BusSender,
    pub sync: Arc<SyncService>,
    pub auth: McpAuth,
}
