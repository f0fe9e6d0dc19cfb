//! SSE session manager for the MCP Server-Sent Events transport.
//!
//! A client `GET`s `/sse`, gets a session id and a message-posting URL back
//! as the first event, then `POST`s JSON-RPC to `/message?session_id=...`;
//! responses are delivered asynchronously over the SSE stream rather than
//! in the POST response. Grounded on `original_source/router/sse.py`.
//! Session storage there is an unsynchronized global dict with a code
//! review note flagging the race; here it is a `tokio::sync::Mutex`-guarded
//! map from the start.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use uuid::Uuid;

use crate::error::{GatewayError, Result};
use crate::rpc::JsonRpcResponse;

const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(30);
const QUEUE_CAPACITY: usize = 64;

/// A single SSE connection's outbound event queue.
pub struct SseSession {
    pub id: String,
    active: std::sync::atomic::AtomicBool,
    tx: mpsc::Sender<String>,
}

impl SseSession {
    /// Queue a `data:`/`event:`-framed SSE message. No-op if the session
    /// has already been closed.
    pub async fn send_event(&self, event: &str, data: serde_json::Value) {
        if !self.active.load(std::sync::atomic::Ordering::SeqCst) {
            return;
        }
        let message = format!("event: {event}\ndata: {data}\n\n");
        let _ = self.tx.send(message).await;
    }

    pub async fn send_json_rpc(&self, response: &JsonRpcResponse) {
        self.send_event("message", serde_json::to_value(response).unwrap_or(serde_json::Value::Null)).await;
    }

    pub fn close(&self) {
        self.active.store(false, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Number of frames currently buffered and not yet consumed by the
    /// stream pump.
    pub fn queue_size(&self) -> usize {
        QUEUE_CAPACITY - self.tx.capacity()
    }
}

/// Registry of live SSE sessions.
#[derive(Default)]
pub struct SseSessionManager {
    sessions: Mutex<HashMap<String, Arc<SseSession>>>,
}

impl SseSessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new session and return it along with the receiving half of
    /// its event queue (consumed by the axum SSE handler's stream).
    pub async fn connect(&self) -> (Arc<SseSession>, mpsc::Receiver<String>) {
        let id = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let session = Arc::new(SseSession { id: id.clone(), active: std::sync::atomic::AtomicBool::new(true), tx });

        self.sessions.lock().await.insert(id, session.clone());
        (session, rx)
    }

    pub async fn get(&self, session_id: &str) -> Option<Arc<SseSession>> {
        self.sessions.lock().await.get(session_id).cloned()
    }

    pub async fn disconnect(&self, session_id: &str) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        match sessions.remove(session_id) {
            Some(session) => {
                session.close();
                Ok(())
            }
            None => Err(GatewayError::Session(format!("session not found: {session_id}")).into()),
        }
    }

    /// Remove a session without erroring if absent (used by the pump
    /// loop's own cleanup-on-close path).
    pub async fn remove_silently(&self, session_id: &str) {
        self.sessions.lock().await.remove(session_id);
    }

    pub async fn list(&self) -> Vec<serde_json::Value> {
        let sessions = self.sessions.lock().await;
        sessions
            .values()
            .map(|s| serde_json::json!({"session_id": s.id, "active": s.is_active(), "queue_size": s.queue_size()}))
            .collect()
    }

    pub async fn count(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

/// Pull the next queued event for `rx`, or emit a keepalive comment after
/// [`KEEPALIVE_TIMEOUT`] of inactivity. Returns `None` once the channel is
/// closed (session torn down).
pub async fn next_frame(rx: &mut mpsc::Receiver<String>) -> Option<String> {
    match tokio::time::timeout(KEEPALIVE_TIMEOUT, rx.recv()).await {
        Ok(Some(message)) => Some(message),
        Ok(None) => None,
        Err(_) => Some(": keepalive\n\n".to_string()),
    }
}

/// Adapt a session's raw event queue into a stream of fully-framed SSE
/// text, injecting a `: keepalive\n\n` comment whenever the queue has been
/// idle for [`KEEPALIVE_TIMEOUT`] — the axum handler maps this onto
/// [`axum::response::sse::Event`].
pub fn into_frame_stream(rx: mpsc::Receiver<String>) -> impl futures::Stream<Item = String> {
    ReceiverStream::new(rx).timeout(KEEPALIVE_TIMEOUT).map(|frame| frame.unwrap_or_else(|_| ": keepalive\n\n".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_registers_session() {
        let manager = SseSessionManager::new();
        let (session, _rx) = manager.connect().await;
        assert_eq!(manager.count().await, 1);
        assert!(manager.get(&session.id).await.is_some());
    }

    #[tokio::test]
    async fn disconnect_removes_and_closes() {
        let manager = SseSessionManager::new();
        let (session, _rx) = manager.connect().await;
        manager.disconnect(&session.id).await.unwrap();
        assert_eq!(manager.count().await, 0);
        assert!(!session.is_active());
    }

    #[tokio::test]
    async fn disconnect_unknown_session_errors() {
        let manager = SseSessionManager::new();
        assert!(manager.disconnect("nope").await.is_err());
    }

    #[tokio::test]
    async fn send_after_close_is_noop() {
        let manager = SseSessionManager::new();
        let (session, mut rx) = manager.connect().await;
        session.close();
        session.send_event("message", serde_json::json!({"x": 1})).await;
        // The channel should have no queued message, and next_frame should
        // hit the keepalive path quickly since nothing was ever sent; we
        // only assert nothing panics and the queue stays empty.
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn list_reports_queue_size() {
        let manager = SseSessionManager::new();
        let (session, _rx) = manager.connect().await;
        session.send_event("endpoint", serde_json::json!("http://x/message")).await;
        let sessions = manager.list().await;
        assert_eq!(sessions[0]["queue_size"], 1);
    }

    #[tokio::test]
    async fn next_frame_delivers_queued_message() {
        let manager = SseSessionManager::new();
        let (session, mut rx) = manager.connect().await;
        session.send_event("endpoint", serde_json::json!("http://x/message")).await;
        let frame = next_frame(&mut rx).await.unwrap();
        assert!(frame.starts_with("event: endpoint"));
    }
}
