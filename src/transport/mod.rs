//! Backend transport abstraction.
//!
//! Unlike the teacher's `mcp::transport::Transport` (a fire-and-forget
//! `send`/`receive` stream pair built for a full MCP client session), the
//! gateway only ever needs request/response correlation against a single
//! backend call: [`BackendTransport::call`]. The stdio implementation still
//! borrows the teacher's subprocess/channel/background-task technique; the
//! http implementation borrows its status-code and content-type handling
//! conventions. This narrowing from stream to call/response is recorded as
//! a deliberate REDESIGN in DESIGN.md.

use crate::error::Result;
use crate::rpc::{JsonRpcRequest, JsonRpcResponse};

pub mod http;
pub mod stdio;

/// A backend capable of taking a single JSON-RPC request and returning its
/// response. Implemented by [`stdio::StdioAdapter`] and [`http::HttpBackend`].
#[async_trait::async_trait]
pub trait BackendTransport: Send + Sync + std::fmt::Debug {
    async fn call(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse>;

    /// Cheap liveness check; does not perform network I/O.
    fn is_healthy(&self) -> bool;
}
