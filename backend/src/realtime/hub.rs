//! In-memory fan-out registry: session id → live connections.
//!
//! Pure cache; holds no durable state. Each WebSocket task owns its socket and
//! registers an outbound channel here; broadcasts never touch the socket
//! directly, so a half-closed peer can never make a broadcast fail.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{close_code, CloseFrame, Message};
use tokio::sync::{mpsc, RwLock};

use crate::realtime::events::SessionEvent;
use crate::types::{ConnectionId, SessionId};

type Connections = HashMap<ConnectionId, mpsc::UnboundedSender<Message>>;

#[derive(Clone, Default)]
pub struct RealtimeHub {
    inner: Arc<RwLock<HashMap<SessionId, Connections>>>,
}

impl RealtimeHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection and returns its id plus the receiving end the
    /// socket task forwards from. The caller must `unsubscribe` on teardown.
    pub async fn subscribe(
        &self,
        session_id: SessionId,
    ) -> (ConnectionId, mpsc::UnboundedReceiver<Message>) {
        let connection_id = ConnectionId::new();
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut sessions = self.inner.write().await;
        sessions
            .entry(session_id)
            .or_default()
            .insert(connection_id, sender);
        (connection_id, receiver)
    }

    /// Drops one connection; removes the session entry when it empties so
    /// churn never grows the map.
    pub async fn unsubscribe(&self, session_id: SessionId, connection_id: ConnectionId) {
        let mut sessions = self.inner.write().await;
        if let Some(connections) = sessions.get_mut(&session_id) {
            connections.remove(&connection_id);
            if connections.is_empty() {
                sessions.remove(&session_id);
            }
        }
    }

    /// Sends one event to every live connection of its session. The envelope
    /// is serialized once; connections whose channel has closed are pruned.
    pub async fn broadcast(&self, event: &SessionEvent) {
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(error = %err, session_id = %event.session_id, "Failed to serialize event");
                return;
            }
        };

        let mut sessions = self.inner.write().await;
        let Some(connections) = sessions.get_mut(&event.session_id) else {
            return;
        };

        connections.retain(|connection_id, sender| {
            let delivered = sender.send(Message::Text(payload.clone().into())).is_ok();
            if !delivered {
                tracing::debug!(
                    session_id = %event.session_id,
                    connection_id = %connection_id,
                    "Pruned dead connection during broadcast"
                );
            }
            delivered
        });
        if connections.is_empty() {
            sessions.remove(&event.session_id);
        }
    }

    /// Force-closes every connection of a session and drops the entry. Used
    /// when the session reaches a terminal state and no further events are
    /// expected.
    pub async fn close(&self, session_id: SessionId) {
        let Some(connections) = self.inner.write().await.remove(&session_id) else {
            return;
        };
        for (_, sender) in connections {
            let _ = sender.send(Message::Close(Some(CloseFrame {
                code: close_code::NORMAL,
                reason: "session closed".into(),
            })));
        }
    }

    pub async fn connection_count(&self, session_id: SessionId) -> usize {
        self.inner
            .read()
            .await
            .get(&session_id)
            .map(|connections| connections.len())
            .unwrap_or(0)
    }
}
