//! JSON-RPC dispatch.
//!
//! Accepts a single request or a batch of at most [`crate::MAX_BATCH`],
//! bodies capped at 1 MiB. Notifications (no `id`) produce no response
//! entry; a batch of nothing but notifications produces no body at all.

use serde_json::{Value, json};
use tracing::debug;

use crate::registry::ToolResult;
use crate::rpc::{
    self, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR, RpcRequest,
    RpcResponse, parse_message,
};
use crate::schema::validate_arguments;
use crate::{MAX_BATCH, MAX_BODY_BYTES, McpContext, McpRegistry, PROTOCOL_VERSION, SERVER_NAME};

const LOG_TARGET: &str = "agora::mcp";

/// The well-known configuration document advertising the endpoint.
pub fn well_known_document() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "serverInfo": {
            "name": SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION"),
        },
        "capabilities": {
            "tools": {},
            "resources": {},
            "prompts": {},
        },
    })
}

pub struct McpDispatcher {
    registry: McpRegistry,
}

impl McpDispatcher {
    pub fn new(registry: McpRegistry) -> Self {
        Self { registry }
    }

    /// Handle one HTTP body. `None` means "no response body" (notifications
    /// only).
    pub async fn handle(&self, body: &[u8], ctx: &McpContext) -> Option<Value> {
        if MAX_BODY_BYTES < body.len() {
            return Some(to_value(RpcResponse::error(
                Value::Null,
                INVALID_REQUEST,
                "request body too large",
            )));
        }

        let parsed: Value = match serde_json::from_slice(body) {
            Ok(parsed) => parsed,
            Err(err) => {
                debug!(target: LOG_TARGET, err = %err, "Unparsable request body");
                return Some(to_value(RpcResponse::error(
                    Value::Null,
                    PARSE_ERROR,
                    "parse error",
                )));
            }
        };

        match parsed {
            Value::Array(batch) => {
                if batch.is_empty() || MAX_BATCH < batch.len() {
                    return Some(to_value(RpcResponse::error(
                        Value::Null,
                        INVALID_REQUEST,
                        format!("batch size must be 1..={MAX_BATCH}"),
                    )));
                }
                let mut responses = Vec::new();
                for message in &batch {
                    if let Some(response) = self.handle_message(message, ctx).await {
                        responses.push(to_value(response));
                    }
                }
                (!responses.is_empty()).then(|| Value::Array(responses))
            }
            single => self
                .handle_message(&single, ctx)
                .await
                .map(to_value),
        }
    }

    async fn handle_message(&self, message: &Value, ctx: &McpContext) -> Option<RpcResponse> {
        let request = match parse_message(message) {
            Ok(request) => request,
            Err(response) => return Some(response),
        };

        let is_notification = request.id.is_none();
        debug!(
            target: LOG_TARGET,
            method = %request.method,
            notification = is_notification,
            "Dispatching"
        );

        // Notifications only run side-effect-free methods; a lost response
        // to a mutating call would leave the caller blind.
        if is_notification && request.method == "tools/call" {
            return None;
        }

        let response = self.dispatch(&request, ctx).await;
        if is_notification {
            return None;
        }
        let id = request.id.unwrap_or(Value::Null);
        Some(match response {
            Ok(result) => RpcResponse::success(id, result),
            Err((code, message)) => RpcResponse::error(id, code, message),
        })
    }

    async fn dispatch(
        &self,
        request: &RpcRequest,
        ctx: &McpContext,
    ) -> Result<Value, (i64, String)> {
        let scopes = &ctx.auth.scopes;
        match request.method.as_str() {
            "initialize" => Ok(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "serverInfo": {
                    "name": SERVER_NAME,
                    "version": env!("CARGO_PKG_VERSION"),
                },
                "capabilities": {
                    "tools": {},
                    "resources": {},
                    "prompts": {},
                },
            })),
            "ping" => Ok(json!({})),
            "tools/list" => {
                let tools: Vec<Value> = self
                    .registry
                    .list_tools(scopes)
                    .iter()
                    .map(|tool| {
                        json!({
                            "name": tool.name,
                            "description": tool.description,
                            "inputSchema": tool.input_schema,
                        })
                    })
                    .collect();
                Ok(json!({ "tools": tools }))
            }
            "tools/call" => {
                let name = request
                    .params
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or((INVALID_PARAMS, "missing tool name".to_string()))?;
                let Some(tool) = self.registry.get_tool(name) else {
                    return Err((INVALID_PARAMS, format!("unknown tool `{name}`")));
                };

                // Scope denial is an in-band tool failure, not a protocol
                // error.
                if !scopes.admits(tool.required_scope) {
                    let required = tool.required_scope.unwrap_or_default();
                    return Ok(to_value(ToolResult::error(format!(
                        "missing required scope `{required}` for tool `{name}`"
                    ))));
                }

                let args = match request.params.get("arguments") {
                    None | Some(Value::Null) => serde_json::Map::new(),
                    Some(Value::Object(args)) => args.clone(),
                    Some(_) => {
                        return Err((
                            INVALID_PARAMS,
                            "arguments must be an object".to_string(),
                        ));
                    }
                };

                let violations = validate_arguments(&args, &tool.input_schema);
                if !violations.is_empty() {
                    return Ok(to_value(ToolResult::error(format!(
                        "invalid arguments: {}",
                        violations.join("; ")
                    ))));
                }

                Ok(to_value(tool.handler.call(args, ctx).await))
            }
            "resources/list" => {
                let resources: Vec<Value> = self
                    .registry
                    .list_resources(scopes)
                    .iter()
                    .map(|resource| {
                        json!({
                            "uri": resource.uri,
                            "name": resource.name,
                            "description": resource.description,
                            "mimeType": "application/json",
                        })
                    })
                    .collect();
                Ok(json!({ "resources": resources }))
            }
            "resources/templates/list" => {
                let templates: Vec<Value> = self
                    .registry
                    .list_templates(scopes)
                    .iter()
                    .map(|template| {
                        json!({
                            "uriTemplate": template.uri_template,
                            "name": template.name,
                            "description": template.description,
                            "mimeType": "application/json",
                        })
                    })
                    .collect();
                Ok(json!({ "resourceTemplates": templates }))
            }
            "resources/read" => {
                let uri = request
                    .params
                    .get("uri")
                    .and_then(Value::as_str)
                    .ok_or((INVALID_PARAMS, "missing uri".to_string()))?;
                let Some((required_scope, handler, params)) =
                    self.registry.resolve_resource(uri)
                else {
                    return Err((INVALID_PARAMS, format!("unknown resource `{uri}`")));
                };
                if !scopes.admits(required_scope) {
                    return Err((
                        INVALID_PARAMS,
                        format!(
                            "missing required scope `{}` for resource `{uri}`",
                            required_scope.unwrap_or_default()
                        ),
                    ));
                }
                let contents = handler
                    .read(uri, params, ctx)
                    .await
                    .map_err(|message| (rpc::INTERNAL_ERROR, message))?;
                Ok(json!({
                    "contents": [{
                        "uri": uri,
                        "mimeType": "application/json",
                        "text": serde_json::to_string_pretty(&contents)
                            .expect("JSON serialization"),
                    }],
                }))
            }
            "prompts/list" => {
                let prompts: Vec<Value> = self
                    .registry
                    .list_prompts(scopes)
                    .iter()
                    .map(|prompt| {
                        json!({
                            "name": prompt.name,
                            "description": prompt.description,
                            "arguments": prompt.arguments,
                        })
                    })
                    .collect();
                Ok(json!({ "prompts": prompts }))
            }
            "prompts/get" => {
                let name = request
                    .params
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or((INVALID_PARAMS, "missing prompt name".to_string()))?;
                let Some(prompt) = self.registry.get_prompt(name) else {
                    return Err((INVALID_PARAMS, format!("unknown prompt `{name}`")));
                };
                if !scopes.admits(prompt.required_scope) {
                    return Err((
                        INVALID_PARAMS,
                        format!("missing required scope for prompt `{name}`"),
                    ));
                }
                let args = match request.params.get("arguments") {
                    None | Some(Value::Null) => serde_json::Map::new(),
                    Some(Value::Object(args)) => args.clone(),
                    Some(_) => {
                        return Err((
                            INVALID_PARAMS,
                            "arguments must be an object".to_string(),
                        ));
                    }
                };
                prompt
                    .handler
                    .get(args, ctx)
                    .await
                    .map_err(|message| (INVALID_PARAMS, message))
            }
            other => Err((METHOD_NOT_FOUND, format!("unknown method `{other}`"))),
        }
    }
}

fn to_value(value: impl serde::Serialize) -> Value {
    serde_json::to_value(value).expect("JSON serialization")
}
