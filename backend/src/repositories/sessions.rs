//! Session rows and the invariant-bearing queries against them.

use chrono::{DateTime, Utc};
use sqlx::PgExecutor;

use crate::models::RaceSession;
use crate::types::{SessionId, ShelterId, UserId};

const SESSION_COLUMNS: &str = "id, shelter_id, public_code, host_user_id, state, max_players, \
     expires_at, started_at, ended_at, created_at";

/// SQL fragment matching sessions whose players all went silent before the
/// bound timestamp. Shared between `create`'s preflight cleanup and the
/// reaper so the two idle definitions cannot drift.
fn idle_players_predicate(bind_index: usize) -> String {
    format!(
        "NOT EXISTS (SELECT 1 FROM players p \
         WHERE p.session_id = race_sessions.id AND p.last_seen > ${bind_index})"
    )
}

/// Closes lobby/racing sessions for a shelter that are past their deadline or
/// whose players all stopped heartbeating. Run inside `create`'s transaction
/// so a dead session never holds the partial unique index against a fresh
/// one until the next sweep.
pub async fn close_stale_for_shelter(
    executor: impl PgExecutor<'_>,
    shelter_id: ShelterId,
    now: DateTime<Utc>,
    idle_cutoff: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let sql = format!(
        "UPDATE race_sessions SET state = 'closed' \
         WHERE shelter_id = $1 AND state IN ('lobby', 'racing') \
         AND (expires_at <= $2 OR {})",
        idle_players_predicate(3)
    );
    let result = sqlx::query(&sql)
        .bind(shelter_id)
        .bind(now)
        .bind(idle_cutoff)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}

/// Finds a live (lobby/racing, unexpired) session for a shelter.
pub async fn find_live_for_shelter(
    executor: impl PgExecutor<'_>,
    shelter_id: ShelterId,
    now: DateTime<Utc>,
) -> Result<Option<RaceSession>, sqlx::Error> {
    sqlx::query_as::<_, RaceSession>(&format!(
        "SELECT {SESSION_COLUMNS} FROM race_sessions \
         WHERE shelter_id = $1 AND state IN ('lobby', 'racing') AND expires_at > $2"
    ))
    .bind(shelter_id)
    .bind(now)
    .fetch_optional(executor)
    .await
}

/// Same lookup with a row lock, serializing concurrent joins on one session.
pub async fn find_live_for_shelter_for_update(
    executor: impl PgExecutor<'_>,
    shelter_id: ShelterId,
    now: DateTime<Utc>,
) -> Result<Option<RaceSession>, sqlx::Error> {
    sqlx::query_as::<_, RaceSession>(&format!(
        "SELECT {SESSION_COLUMNS} FROM race_sessions \
         WHERE shelter_id = $1 AND state IN ('lobby', 'racing') AND expires_at > $2 \
         FOR UPDATE"
    ))
    .bind(shelter_id)
    .bind(now)
    .fetch_optional(executor)
    .await
}

pub async fn insert_session(
    executor: impl PgExecutor<'_>,
    shelter_id: ShelterId,
    public_code: &str,
    host_user_id: UserId,
    max_players: i32,
    expires_at: DateTime<Utc>,
) -> Result<RaceSession, sqlx::Error> {
    sqlx::query_as::<_, RaceSession>(&format!(
        "INSERT INTO race_sessions \
             (id, shelter_id, public_code, host_user_id, state, max_players, expires_at, created_at) \
         VALUES ($1, $2, $3, $4, 'lobby', $5, $6, $7) \
         RETURNING {SESSION_COLUMNS}"
    ))
    .bind(SessionId::new())
    .bind(shelter_id)
    .bind(public_code)
    .bind(host_user_id)
    .bind(max_players)
    .bind(expires_at)
    .bind(Utc::now())
    .fetch_one(executor)
    .await
}

pub async fn find_by_id(
    executor: impl PgExecutor<'_>,
    session_id: SessionId,
) -> Result<Option<RaceSession>, sqlx::Error> {
    sqlx::query_as::<_, RaceSession>(&format!(
        "SELECT {SESSION_COLUMNS} FROM race_sessions WHERE id = $1"
    ))
    .bind(session_id)
    .fetch_optional(executor)
    .await
}

/// Locks the session row for the rest of the transaction. All state
/// transitions go through this so two concurrent `start` calls serialize.
pub async fn find_by_id_for_update(
    executor: impl PgExecutor<'_>,
    session_id: SessionId,
) -> Result<Option<RaceSession>, sqlx::Error> {
    sqlx::query_as::<_, RaceSession>(&format!(
        "SELECT {SESSION_COLUMNS} FROM race_sessions WHERE id = $1 FOR UPDATE"
    ))
    .bind(session_id)
    .fetch_optional(executor)
    .await
}

pub async fn set_racing(
    executor: impl PgExecutor<'_>,
    session_id: SessionId,
    started_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> Result<RaceSession, sqlx::Error> {
    sqlx::query_as::<_, RaceSession>(&format!(
        "UPDATE race_sessions \
         SET state = 'racing', started_at = $2, expires_at = $3 \
         WHERE id = $1 \
         RETURNING {SESSION_COLUMNS}"
    ))
    .bind(session_id)
    .bind(started_at)
    .bind(expires_at)
    .fetch_one(executor)
    .await
}

pub async fn set_finished(
    executor: impl PgExecutor<'_>,
    session_id: SessionId,
    ended_at: DateTime<Utc>,
) -> Result<RaceSession, sqlx::Error> {
    sqlx::query_as::<_, RaceSession>(&format!(
        "UPDATE race_sessions \
         SET state = 'finished', ended_at = $2 \
         WHERE id = $1 \
         RETURNING {SESSION_COLUMNS}"
    ))
    .bind(session_id)
    .bind(ended_at)
    .fetch_one(executor)
    .await
}

pub async fn set_host(
    executor: impl PgExecutor<'_>,
    session_id: SessionId,
    host_user_id: UserId,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE race_sessions SET host_user_id = $2 WHERE id = $1")
        .bind(session_id)
        .bind(host_user_id)
        .execute(executor)
        .await
        .map(|_| ())
}

pub async fn set_closed(
    executor: impl PgExecutor<'_>,
    session_id: SessionId,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE race_sessions SET state = 'closed' WHERE id = $1")
        .bind(session_id)
        .execute(executor)
        .await
        .map(|_| ())
}

/// Closes every non-closed session that is past its deadline or whose players
/// all went idle. A single guarded UPDATE, so repeat or concurrent sweeps are
/// no-ops on already-closed rows.
pub async fn expire_stale(
    executor: impl PgExecutor<'_>,
    now: DateTime<Utc>,
    idle_cutoff: DateTime<Utc>,
) -> Result<Vec<SessionId>, sqlx::Error> {
    let sql = format!(
        "UPDATE race_sessions SET state = 'closed' \
         WHERE state <> 'closed' AND (expires_at <= $1 OR {}) \
         RETURNING id",
        idle_players_predicate(2)
    );
    sqlx::query_scalar::<_, SessionId>(&sql)
        .bind(now)
        .bind(idle_cutoff)
        .fetch_all(executor)
        .await
}
