//! Lifecycle events fanned out to session subscribers.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use crate::models::{Player, RaceSession};
use crate::types::{SessionId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEventKind {
    Connected,
    SessionCreated,
    PlayerJoined,
    ReadyUpdated,
    RaceStarted,
    RaceFinished,
    PlayerLeft,
    HostPromoted,
    SessionClosed,
}

/// The envelope every subscriber receives. Serialized once per broadcast.
#[derive(Debug, Clone, Serialize)]
pub struct SessionEvent {
    pub session_id: SessionId,
    pub timestamp: DateTime<Utc>,
    pub event: SessionEventKind,
    pub payload: Value,
}

impl SessionEvent {
    fn new(session_id: SessionId, event: SessionEventKind, payload: Value) -> Self {
        Self {
            session_id,
            timestamp: Utc::now(),
            event,
            payload,
        }
    }

    /// Initial acknowledgment sent to a connection right after subscribe.
    pub fn connected(session_id: SessionId, user_id: UserId) -> Self {
        Self::new(
            session_id,
            SessionEventKind::Connected,
            json!({ "user_id": user_id }),
        )
    }

    pub fn session_created(session: &RaceSession, host: &Player) -> Self {
        Self::new(
            session.id,
            SessionEventKind::SessionCreated,
            json!({ "session": session, "player": host }),
        )
    }

    pub fn player_joined(session_id: SessionId, player: &Player) -> Self {
        Self::new(
            session_id,
            SessionEventKind::PlayerJoined,
            json!({ "player": player }),
        )
    }

    pub fn ready_updated(session_id: SessionId, player: &Player) -> Self {
        Self::new(
            session_id,
            SessionEventKind::ReadyUpdated,
            json!({ "player": player }),
        )
    }

    pub fn race_started(session: &RaceSession) -> Self {
        Self::new(
            session.id,
            SessionEventKind::RaceStarted,
            json!({ "session": session }),
        )
    }

    pub fn race_finished(session: &RaceSession) -> Self {
        Self::new(
            session.id,
            SessionEventKind::RaceFinished,
            json!({ "session": session }),
        )
    }

    pub fn player_left(session_id: SessionId, user_id: UserId) -> Self {
        Self::new(
            session_id,
            SessionEventKind::PlayerLeft,
            json!({ "user_id": user_id }),
        )
    }

    pub fn host_promoted(session_id: SessionId, new_host: &Player) -> Self {
        Self::new(
            session_id,
            SessionEventKind::HostPromoted,
            json!({ "host_user_id": new_host.user_id, "player": new_host }),
        )
    }

    pub fn session_closed(session_id: SessionId) -> Self {
        Self::new(session_id, SessionEventKind::SessionClosed, json!({}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_shape_is_stable() {
        let session_id = SessionId::new();
        let user_id = UserId::new();
        let event = SessionEvent::player_left(session_id, user_id);
        let value = serde_json::to_value(&event).expect("serialize event");

        assert_eq!(value["session_id"], session_id.to_string());
        assert_eq!(value["event"], "player_left");
        assert_eq!(value["payload"]["user_id"], user_id.to_string());
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&SessionEventKind::HostPromoted).expect("serialize");
        assert_eq!(json, "\"host_promoted\"");
    }
}
