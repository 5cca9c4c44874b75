//! Models for race sessions and their lifecycle states.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::types::{SessionId, ShelterId, UserId};

/// Lifecycle state of a race session.
///
/// `lobby → racing → finished`, with `closed` reachable from any non-terminal
/// state via leave/expiry. `finished` and `closed` accept no further
/// transitions from callers; only the reaper folds stale rows into `closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Lobby,
    Racing,
    Finished,
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Lobby => "lobby",
            SessionState::Racing => "racing",
            SessionState::Finished => "finished",
            SessionState::Closed => "closed",
        }
    }

    /// A session in this state blocks new sessions for the same shelter.
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Lobby | SessionState::Racing)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
/// Database representation of one race bound to a single shelter.
pub struct RaceSession {
    pub id: SessionId,
    /// Resolved shelter the players are racing toward.
    pub shelter_id: ShelterId,
    /// The human-shareable code used to create/join this session.
    pub public_code: String,
    /// Current host; reassigned when the host leaves.
    pub host_user_id: UserId,
    pub state: SessionState,
    pub max_players: i32,
    /// Deadline after which the session is invalid for join/racing.
    pub expires_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
