//! Session service: every operation is one bounded transaction against the
//! store. Privilege (host-only start/finish) is always re-checked against the
//! live session row, never taken from token claims.

use chrono::{Duration, Utc};
use sqlx::PgPool;

use crate::config::Config;
use crate::error::AppError;
use crate::models::{Player, RaceSession, SessionState};
use crate::repositories::{players, sessions, shelters};
use crate::types::{SessionId, UserId};

pub const MIN_PLAYERS: i32 = 2;
pub const MAX_PLAYERS: i32 = 16;

/// A session together with its current roster.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub session: RaceSession,
    pub players: Vec<Player>,
}

/// Result of `create`/`join`: the session, the caller's player row, and the
/// full roster as of the commit.
#[derive(Debug, Clone)]
pub struct JoinedSession {
    pub session: RaceSession,
    pub player: Player,
    pub players: Vec<Player>,
}

/// What `leave` did, so the gateway knows which events to broadcast.
#[derive(Debug, Clone)]
pub struct LeaveOutcome {
    pub session_id: SessionId,
    pub departed: Player,
    pub promoted: Option<Player>,
    pub closed: bool,
}

/// Creates a session in `lobby` with the caller as host.
///
/// Abandoned or expired sessions for the same shelter are closed first; a
/// remaining live session aborts with `Conflict`. Two creates racing past the
/// pre-check are resolved by the partial unique index, classified into the
/// same `Conflict`.
pub async fn create(
    pool: &PgPool,
    config: &Config,
    shelter_code: &str,
    host_user_id: UserId,
    display_name: Option<&str>,
    max_players: Option<i32>,
) -> Result<JoinedSession, AppError> {
    let max_players = max_players.unwrap_or(config.default_max_players);
    if !(MIN_PLAYERS..=MAX_PLAYERS).contains(&max_players) {
        return Err(AppError::BadRequest(format!(
            "max_players must be between {} and {}",
            MIN_PLAYERS, MAX_PLAYERS
        )));
    }

    let shelter = shelters::resolve_by_code(pool, shelter_code)
        .await
        .map_err(AppError::from)?
        .ok_or_else(|| AppError::NotFound("Unknown shelter code".to_string()))?;

    let now = Utc::now();
    let mut tx = pool.begin().await.map_err(AppError::from)?;

    let reaped =
        sessions::close_stale_for_shelter(&mut *tx, shelter.id, now, config.idle_cutoff(now))
            .await?;
    if reaped > 0 {
        tracing::info!(shelter_id = %shelter.id, count = reaped, "Closed stale sessions before create");
    }

    if sessions::find_live_for_shelter(&mut *tx, shelter.id, now)
        .await?
        .is_some()
    {
        return Err(conflict_active_session());
    }

    let expires_at = now + Duration::minutes(config.lobby_ttl_minutes);
    let session = sessions::insert_session(
        &mut *tx,
        shelter.id,
        &shelter.public_code,
        host_user_id,
        max_players,
        expires_at,
    )
    .await
    .map_err(classify_unique_violation)?;

    let host = players::upsert_player(&mut *tx, session.id, host_user_id, display_name, now).await?;

    tx.commit().await.map_err(classify_unique_violation)?;

    tracing::info!(session_id = %session.id, shelter_id = %shelter.id, "Session created");
    Ok(JoinedSession {
        session,
        players: vec![host.clone()],
        player: host,
    })
}

/// Joins the live session for a shelter code. Idempotent per `(session, user)`:
/// a repeat join refreshes `display_name`/`last_seen` instead of failing.
pub async fn join(
    pool: &PgPool,
    shelter_code: &str,
    user_id: UserId,
    display_name: Option<&str>,
) -> Result<JoinedSession, AppError> {
    let shelter = shelters::resolve_by_code(pool, shelter_code)
        .await
        .map_err(AppError::from)?
        .ok_or_else(|| AppError::NotFound("Unknown shelter code".to_string()))?;

    let now = Utc::now();
    let mut tx = pool.begin().await.map_err(AppError::from)?;

    let session = sessions::find_live_for_shelter_for_update(&mut *tx, shelter.id, now)
        .await?
        .ok_or_else(|| AppError::NotFound("No active session for this shelter".to_string()))?;

    let already_member = players::find_by_user(&mut *tx, session.id, user_id)
        .await?
        .is_some();
    if !already_member {
        let count = players::count_for_session(&mut *tx, session.id).await?;
        if count >= session.max_players as i64 {
            return Err(AppError::Conflict("Session is full".to_string()));
        }
    }

    let player = players::upsert_player(&mut *tx, session.id, user_id, display_name, now).await?;
    let players = players::list_for_session(&mut *tx, session.id).await?;

    tx.commit().await.map_err(AppError::from)?;

    Ok(JoinedSession {
        session,
        player,
        players,
    })
}

pub async fn toggle_ready(
    pool: &PgPool,
    session_id: SessionId,
    user_id: UserId,
    ready: bool,
) -> Result<Player, AppError> {
    players::set_ready(pool, session_id, user_id, ready, Utc::now())
        .await?
        .ok_or_else(|| AppError::NotFound("Player not found in session".to_string()))
}

pub async fn heartbeat(
    pool: &PgPool,
    session_id: SessionId,
    user_id: UserId,
) -> Result<(), AppError> {
    let touched = players::touch_last_seen(pool, session_id, user_id, Utc::now()).await?;
    if !touched {
        return Err(AppError::NotFound("Player not found in session".to_string()));
    }
    Ok(())
}

/// `lobby → racing`. Host-only, checked against the live row; extends the
/// deadline by the configured race duration.
pub async fn start(
    pool: &PgPool,
    config: &Config,
    session_id: SessionId,
    user_id: UserId,
) -> Result<RaceSession, AppError> {
    let mut tx = pool.begin().await.map_err(AppError::from)?;

    let session = sessions::find_by_id_for_update(&mut *tx, session_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Session not found".to_string()))?;

    if session.host_user_id != user_id {
        return Err(AppError::InvalidTransition(
            "Only the current host can start the race".to_string(),
        ));
    }
    if session.state != SessionState::Lobby {
        return Err(AppError::InvalidTransition(format!(
            "Cannot start a race from state '{}'",
            session.state.as_str()
        )));
    }

    let now = Utc::now();
    let expires_at = now + Duration::minutes(config.race_duration_minutes);
    let session = sessions::set_racing(&mut *tx, session_id, now, expires_at).await?;
    players::touch_last_seen(&mut *tx, session_id, user_id, now).await?;

    tx.commit().await.map_err(AppError::from)?;

    tracing::info!(session_id = %session.id, "Race started");
    Ok(session)
}

/// `racing → finished`. Host-only, checked against the live row.
pub async fn finish(
    pool: &PgPool,
    session_id: SessionId,
    user_id: UserId,
) -> Result<RaceSession, AppError> {
    let mut tx = pool.begin().await.map_err(AppError::from)?;

    let session = sessions::find_by_id_for_update(&mut *tx, session_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Session not found".to_string()))?;

    if session.host_user_id != user_id {
        return Err(AppError::InvalidTransition(
            "Only the current host can finish the race".to_string(),
        ));
    }
    if session.state != SessionState::Racing {
        return Err(AppError::InvalidTransition(format!(
            "Cannot finish a race from state '{}'",
            session.state.as_str()
        )));
    }

    let now = Utc::now();
    let session = sessions::set_finished(&mut *tx, session_id, now).await?;
    players::touch_last_seen(&mut *tx, session_id, user_id, now).await?;

    tx.commit().await.map_err(AppError::from)?;

    tracing::info!(session_id = %session.id, "Race finished");
    Ok(session)
}

/// Removes the caller's player row. Promotes the earliest-joined remaining
/// player when the host departs; closes the session when nobody remains.
pub async fn leave(
    pool: &PgPool,
    session_id: SessionId,
    user_id: UserId,
) -> Result<LeaveOutcome, AppError> {
    let mut tx = pool.begin().await.map_err(AppError::from)?;

    let session = sessions::find_by_id_for_update(&mut *tx, session_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Session not found".to_string()))?;

    let departed = players::delete_player(&mut *tx, session_id, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Player not found in session".to_string()))?;

    let mut promoted = None;
    let mut closed = false;

    match players::earliest_for_session(&mut *tx, session_id).await? {
        Some(next) => {
            if departed.user_id == session.host_user_id {
                sessions::set_host(&mut *tx, session_id, next.user_id).await?;
                tracing::info!(
                    session_id = %session_id,
                    new_host = %next.user_id,
                    "Host left, promoted next player"
                );
                promoted = Some(next);
            }
        }
        None => {
            if session.state.is_active() {
                sessions::set_closed(&mut *tx, session_id).await?;
                closed = true;
            }
        }
    }

    tx.commit().await.map_err(AppError::from)?;

    Ok(LeaveOutcome {
        session_id,
        departed,
        promoted,
        closed,
    })
}

/// The reaper: closes sessions past their deadline or with a fully idle
/// roster. Idempotent; safe to run concurrently with itself and with
/// `create`'s preflight, which uses the same idle definition.
pub async fn expire_stale(pool: &PgPool, config: &Config) -> Result<Vec<SessionId>, AppError> {
    let now = Utc::now();
    let closed = sessions::expire_stale(pool, now, config.idle_cutoff(now)).await?;
    if !closed.is_empty() {
        tracing::info!(count = closed.len(), "Reaper closed stale sessions");
    }
    Ok(closed)
}

pub async fn get_with_players(
    pool: &PgPool,
    session_id: SessionId,
) -> Result<SessionSnapshot, AppError> {
    let session = sessions::find_by_id(pool, session_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Session not found".to_string()))?;
    let players = players::list_for_session(pool, session_id).await?;
    Ok(SessionSnapshot { session, players })
}

fn conflict_active_session() -> AppError {
    AppError::Conflict("An active session already exists for this shelter".to_string())
}

/// The race loser of two concurrent creates hits the partial unique index at
/// insert/commit time; it must see the same error as the pre-check.
fn classify_unique_violation(err: sqlx::Error) -> AppError {
    if err
        .as_database_error()
        .is_some_and(|db| db.is_unique_violation())
    {
        conflict_active_session()
    } else {
        err.into()
    }
}
