//! JSON-RPC 2.0 message shapes and error codes.

use serde_json::Value;

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

#[derive(Debug, Clone, serde::Serialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

/// One incoming message, already shape-checked.
#[derive(Debug)]
pub struct RpcRequest {
    /// `None` for notifications; notifications get no response entry.
    pub id: Option<Value>,
    pub method: String,
    pub params: Value,
}

/// Shape-check a single JSON-RPC message.
pub fn parse_message(value: &Value) -> Result<RpcRequest, RpcResponse> {
    let Some(object) = value.as_object() else {
        return Err(RpcResponse::error(
            Value::Null,
            INVALID_REQUEST,
            "request must be an object",
        ));
    };

    let id = object.get("id").cloned();

    if object.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
        return Err(RpcResponse::error(
            id.unwrap_or(Value::Null),
            INVALID_REQUEST,
            "missing or wrong jsonrpc version",
        ));
    }

    let Some(method) = object.get("method").and_then(Value::as_str) else {
        return Err(RpcResponse::error(
            id.unwrap_or(Value::Null),
            INVALID_REQUEST,
            "missing method",
        ));
    };

    Ok(RpcRequest {
        id,
        method: method.to_string(),
        params: object.get("params").cloned().unwrap_or(Value::Null),
    })
}
