//! Error taxonomy for the routing gateway.
//!
//! [`GatewayError`] is the single error enum used across every component.
//! Most call sites propagate it via [`Result`], which is an alias over
//! `anyhow::Result` so that context can be layered on with `.context(...)`
//! without every leaf function needing its own error type.

use thiserror::Error;

/// Errors produced by the gateway's own components.
///
/// Transport- and upstream-specific failures are wrapped here rather than
/// surfaced as raw `reqwest`/`io` errors so that HTTP handlers can map them
/// to a stable set of status codes (see `http_api::error_response`).
#[derive(Error, Debug)]
pub enum GatewayError {
    /// A configuration file could not be parsed or a required value was
    /// missing.
    #[error("configuration error: {0}")]
    Config(String),

    /// A stdio backend's child process could not be spawned, restarted, or
    /// exceeded its restart ceiling.
    #[error("stdio transport error for server '{server}': {message}")]
    StdioTransport { server: String, message: String },

    /// An HTTP backend call failed at the transport level (connect timeout,
    /// non-2xx status, malformed body).
    #[error("http transport error for server '{server}': {message}")]
    HttpTransport { server: String, message: String },

    /// No server is registered under the requested name.
    #[error("unknown server: {0}")]
    UnknownServer(String),

    /// The circuit breaker for a server is open; the request was rejected
    /// without being attempted.
    #[error("circuit breaker open for server '{0}'")]
    BreakerOpen(String),

    /// An SSE session id was not found, or a session-scoped operation was
    /// attempted against a closed session.
    #[error("sse session error: {0}")]
    Session(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("http client error: {0}")]
    Reqwest(#[from] reqwest::Error),
}

impl GatewayError {
    /// Maps an error to an HTTP status code; `http_api` uses this directly
    /// instead of duplicating the mapping per handler.
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::UnknownServer(_) => 404,
            GatewayError::BreakerOpen(_) => 503,
            GatewayError::Config(_) => 500,
            GatewayError::StdioTransport { .. } | GatewayError::HttpTransport { .. } => 502,
            GatewayError::Session(_) => 404,
            GatewayError::Io(_) | GatewayError::Json(_) | GatewayError::Reqwest(_) => 500,
        }
    }
}

/// Convenience alias used throughout the crate; carries `GatewayError` (or
/// any other error convertible via `anyhow`) with contextual messages
/// attached along the call chain.
pub type Result<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(
            GatewayError::UnknownServer("foo".into()).to_string(),
            "unknown server: foo"
        );
        assert_eq!(
            GatewayError::BreakerOpen("foo".into()).to_string(),
            "circuit breaker open for server 'foo'"
        );
    }

    #[test]
    fn status_codes() {
        assert_eq!(GatewayError::UnknownServer("x".into()).status_code(), 404);
        assert_eq!(GatewayError::BreakerOpen("x".into()).status_code(), 503);
        assert_eq!(GatewayError::Config("x".into()).status_code(), 500);
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<GatewayError>();
    }
}
