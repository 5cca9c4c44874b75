//! Session-scoped membership records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::types::{PlayerId, SessionId, UserId};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
/// One user's membership in one race session.
pub struct Player {
    pub id: PlayerId,
    pub session_id: SessionId,
    /// External identity of the participant; unique within the session.
    pub user_id: UserId,
    pub display_name: Option<String>,
    pub ready: bool,
    pub joined_at: DateTime<Utc>,
    /// Heartbeat timestamp; bumped by explicit heartbeats and ready/host actions.
    pub last_seen: DateTime<Utc>,
}
