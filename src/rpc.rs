//! JSON-RPC 2.0 envelope types shared by every surface (HTTP, SSE, stdio,
//! HTTP backend dispatch).
//!
//! Grounded on the teacher's `mcp::types::{JsonRpcRequest, JsonRpcResponse,
//! JsonRpcError}` (field names and serde shape kept; the large
//! MCP-method-specific payload types that accompanied them in the teacher
//! were part of its full client/session negotiation surface and are not
//! needed by a pass-through gateway).

use std::fmt;

use serde::{Deserialize, Serialize};

/// Standard JSON-RPC 2.0 and MCP-specific error codes, mirrored from
/// `router.models.ErrorCode` in the original implementation.
pub mod error_code {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;

    /// Circuit breaker open.
    pub const SERVER_ERROR: i64 = -32000;
    pub const TIMEOUT: i64 = -32001;
    pub const UPSTREAM_ERROR: i64 = -32002;
}

/// A JSON-RPC 2.0 request object.
///
/// `jsonrpc` MUST always be `"2.0"`. `id` is `None` only for notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcRequest {
    pub fn new(id: Option<serde_json::Value>, method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self { jsonrpc: "2.0".to_string(), id, method: method.into(), params }
    }
}

/// A JSON-RPC 2.0 response object. Exactly one of `result`/`error` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Option<serde_json::Value>, result: serde_json::Value) -> Self {
        Self { jsonrpc: "2.0".to_string(), id, result: Some(result), error: None }
    }

    pub fn failure(id: Option<serde_json::Value>, code: i64, message: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError { code, message: message.into(), data }),
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JSON-RPC error {}: {}", self.code, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_round_trips() {
        let resp = JsonRpcResponse::success(Some(serde_json::json!(1)), serde_json::json!({"ok": true}));
        let s = serde_json::to_string(&resp).unwrap();
        assert!(s.contains("\"result\""));
        assert!(!s.contains("\"error\""));
    }

    #[test]
    fn failure_sets_error_not_result() {
        let resp = JsonRpcResponse::failure(None, error_code::SERVER_ERROR, "circuit open", None);
        assert!(resp.result.is_none());
        assert_eq!(resp.error.unwrap().code, error_code::SERVER_ERROR);
    }

    #[test]
    fn error_display() {
        let e = JsonRpcError { code: -32600, message: "Invalid Request".into(), data: None };
        assert_eq!(e.to_string(), "JSON-RPC error -32600: Invalid Request");
    }
}
