//! Routing gateway for the Model Context Protocol.
//!
//! Multiplexes JSON-RPC 2.0 requests across HTTP and stdio MCP backends,
//! isolating faults with per-server circuit breakers, serving an SSE
//! transport for streaming clients, and optionally enhancing prompts
//! through a local Ollama model before they reach a backend.

pub mod breaker;
pub mod cache;
pub mod cli;
pub mod config;
pub mod enhance;
pub mod error;
pub mod http_api;
pub mod registry;
pub mod rpc;
pub mod sse;
pub mod transport;

pub use error::{GatewayError, Result};
