//! Tool / resource / prompt registries.
//!
//! Populated once by the composition root (see [`crate::register_builtins`])
//! and read-only afterwards. Every item declares the scope it requires, or
//! none for public items.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::McpContext;
use crate::auth::ScopeSet;
use crate::uri_template::match_template;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    Text { text: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolResult {
    pub content: Vec<ToolContent>,
    #[serde(rename = "isError")]
    pub is_error: bool,
}

impl ToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: false,
        }
    }

    pub fn json(value: &impl Serialize) -> Self {
        Self::text(serde_json::to_string_pretty(value).expect("JSON serialization"))
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: true,
        }
    }
}

#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, args: serde_json::Map<String, Value>, ctx: &McpContext) -> ToolResult;
}

pub struct Tool {
    pub name: &'static str,
    pub description: &'static str,
    /// JSON-schema subset the arguments are validated against.
    pub input_schema: Value,
    pub required_scope: Option<&'static str>,
    pub handler: Arc<dyn ToolHandler>,
}

#[async_trait]
pub trait ResourceHandler: Send + Sync {
    /// `params` carries the template variables (empty for exact resources).
    async fn read(
        &self,
        uri: &str,
        params: BTreeMap<String, String>,
        ctx: &McpContext,
    ) -> Result<Value, String>;
}

pub struct Resource {
    pub uri: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub required_scope: Option<&'static str>,
    pub handler: Arc<dyn ResourceHandler>,
}

pub struct ResourceTemplate {
    pub uri_template: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub required_scope: Option<&'static str>,
    pub handler: Arc<dyn ResourceHandler>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PromptArgument {
    pub name: &'static str,
    pub description: &'static str,
    pub required: bool,
}

#[async_trait]
pub trait PromptHandler: Send + Sync {
    async fn get(
        &self,
        args: serde_json::Map<String, Value>,
        ctx: &McpContext,
    ) -> Result<Value, String>;
}

pub struct Prompt {
    pub name: &'static str,
    pub description: &'static str,
    pub arguments: Vec<PromptArgument>,
    pub required_scope: Option<&'static str>,
    pub handler: Arc<dyn PromptHandler>,
}

#[derive(Default)]
pub struct McpRegistry {
    tools: BTreeMap<&'static str, Tool>,
    resources: BTreeMap<&'static str, Resource>,
    templates: Vec<ResourceTemplate>,
    prompts: BTreeMap<&'static str, Prompt>,
}

impl McpRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_tool(&mut self, tool: Tool) {
        self.tools.insert(tool.name, tool);
    }

    pub fn register_resource(&mut self, resource: Resource) {
        self.resources.insert(resource.uri, resource);
    }

    pub fn register_template(&mut self, template: ResourceTemplate) {
        self.templates.push(template);
    }

    pub fn register_prompt(&mut self, prompt: Prompt) {
        self.prompts.insert(prompt.name, prompt);
    }

    pub fn get_tool(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    pub fn get_prompt(&self, name: &str) -> Option<&Prompt> {
        self.prompts.get(name)
    }

    /// Tools the given scope set admits.
    pub fn list_tools(&self, scopes: &ScopeSet) -> Vec<&Tool> {
        self.tools
            .values()
            .filter(|tool| scopes.admits(tool.required_scope))
            .collect()
    }

    pub fn list_resources(&self, scopes: &ScopeSet) -> Vec<&Resource> {
        self.resources
            .values()
            .filter(|resource| scopes.admits(resource.required_scope))
            .collect()
    }

    pub fn list_templates(&self, scopes: &ScopeSet) -> Vec<&ResourceTemplate> {
        self.templates
            .iter()
            .filter(|template| scopes.admits(template.required_scope))
            .collect()
    }

    pub fn list_prompts(&self, scopes: &ScopeSet) -> Vec<&Prompt> {
        self.prompts
            .values()
            .filter(|prompt| scopes.admits(prompt.required_scope))
            .collect()
    }

    /// Exact-URI lookup first, then template matching.
    pub fn resolve_resource(
        &self,
        uri: &str,
    ) -> Option<(
        Option<&'static str>,
        &Arc<dyn ResourceHandler>,
        BTreeMap<String, String>,
    )> {
        if let Some(resource) = self.resources.get(uri) {
            return Some((
                resource.required_scope,
                &resource.handler,
                BTreeMap::new(),
            ));
        }
        for template in &self.templates {
            if let Some(params) = match_template(template.uri_template, uri) {
                return Some((template.required_scope, &template.handler, params));
            }
        }
        None
    }
}
