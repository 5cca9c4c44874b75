//! Player membership rows.

use chrono::{DateTime, Utc};
use sqlx::PgExecutor;

use crate::models::Player;
use crate::types::{PlayerId, SessionId, UserId};

const PLAYER_COLUMNS: &str = "id, session_id, user_id, display_name, ready, joined_at, last_seen";

/// Inserts a player, or refreshes `display_name`/`last_seen` when the user is
/// already in the session. Keyed on `(session_id, user_id)` so a retried join
/// never duplicates a row.
pub async fn upsert_player(
    executor: impl PgExecutor<'_>,
    session_id: SessionId,
    user_id: UserId,
    display_name: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Player, sqlx::Error> {
    sqlx::query_as::<_, Player>(&format!(
        "INSERT INTO players (id, session_id, user_id, display_name, ready, joined_at, last_seen) \
         VALUES ($1, $2, $3, $4, FALSE, $5, $5) \
         ON CONFLICT (session_id, user_id) DO UPDATE SET \
             display_name = COALESCE(EXCLUDED.display_name, players.display_name), \
             last_seen = EXCLUDED.last_seen \
         RETURNING {PLAYER_COLUMNS}"
    ))
    .bind(PlayerId::new())
    .bind(session_id)
    .bind(user_id)
    .bind(display_name)
    .bind(now)
    .fetch_one(executor)
    .await
}

pub async fn find_by_user(
    executor: impl PgExecutor<'_>,
    session_id: SessionId,
    user_id: UserId,
) -> Result<Option<Player>, sqlx::Error> {
    sqlx::query_as::<_, Player>(&format!(
        "SELECT {PLAYER_COLUMNS} FROM players WHERE session_id = $1 AND user_id = $2"
    ))
    .bind(session_id)
    .bind(user_id)
    .fetch_optional(executor)
    .await
}

pub async fn count_for_session(
    executor: impl PgExecutor<'_>,
    session_id: SessionId,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM players WHERE session_id = $1")
        .bind(session_id)
        .fetch_one(executor)
        .await
}

pub async fn list_for_session(
    executor: impl PgExecutor<'_>,
    session_id: SessionId,
) -> Result<Vec<Player>, sqlx::Error> {
    sqlx::query_as::<_, Player>(&format!(
        "SELECT {PLAYER_COLUMNS} FROM players WHERE session_id = $1 ORDER BY joined_at, id"
    ))
    .bind(session_id)
    .fetch_all(executor)
    .await
}

pub async fn set_ready(
    executor: impl PgExecutor<'_>,
    session_id: SessionId,
    user_id: UserId,
    ready: bool,
    now: DateTime<Utc>,
) -> Result<Option<Player>, sqlx::Error> {
    sqlx::query_as::<_, Player>(&format!(
        "UPDATE players SET ready = $3, last_seen = $4 \
         WHERE session_id = $1 AND user_id = $2 \
         RETURNING {PLAYER_COLUMNS}"
    ))
    .bind(session_id)
    .bind(user_id)
    .bind(ready)
    .bind(now)
    .fetch_optional(executor)
    .await
}

pub async fn touch_last_seen(
    executor: impl PgExecutor<'_>,
    session_id: SessionId,
    user_id: UserId,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE players SET last_seen = $3 WHERE session_id = $1 AND user_id = $2",
    )
    .bind(session_id)
    .bind(user_id)
    .bind(now)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete_player(
    executor: impl PgExecutor<'_>,
    session_id: SessionId,
    user_id: UserId,
) -> Result<Option<Player>, sqlx::Error> {
    sqlx::query_as::<_, Player>(&format!(
        "DELETE FROM players WHERE session_id = $1 AND user_id = $2 RETURNING {PLAYER_COLUMNS}"
    ))
    .bind(session_id)
    .bind(user_id)
    .fetch_optional(executor)
    .await
}

/// Earliest-joined remaining player, the promotion order for a departing host.
pub async fn earliest_for_session(
    executor: impl PgExecutor<'_>,
    session_id: SessionId,
) -> Result<Option<Player>, sqlx::Error> {
    sqlx::query_as::<_, Player>(&format!(
        "SELECT {PLAYER_COLUMNS} FROM players WHERE session_id = $1 \
         ORDER BY joined_at, id LIMIT 1"
    ))
    .bind(session_id)
    .fetch_optional(executor)
    .await
}
