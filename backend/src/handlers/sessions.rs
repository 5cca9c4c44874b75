//! HTTP surface for session lifecycle operations. Each handler awaits its
//! service call (one committed transaction) and only then broadcasts, so
//! events go out in commit order.

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    error::AppError,
    models::{Player, RaceSession},
    realtime::SessionEvent,
    services::sessions as session_service,
    state::AppState,
    types::{SessionId, UserId},
    utils::jwt::{create_race_token, RaceClaims, ROLE_HOST, ROLE_PLAYER},
};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateSessionRequest {
    #[validate(length(min = 1, max = 64))]
    pub shelter_code: String,
    pub user_id: UserId,
    #[validate(length(max = 64))]
    pub display_name: Option<String>,
    #[validate(range(min = 2, max = 16))]
    pub max_players: Option<i32>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct JoinSessionRequest {
    #[validate(length(min = 1, max = 64))]
    pub shelter_code: String,
    pub user_id: UserId,
    #[validate(length(max = 64))]
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReadyRequest {
    pub ready: bool,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session: RaceSession,
    pub player: Player,
    pub players: Vec<Player>,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct SessionSnapshotResponse {
    pub session: RaceSession,
    pub players: Vec<Player>,
}

pub async fn create_session(
    State(state): State<AppState>,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), AppError> {
    payload.validate()?;

    let joined = session_service::create(
        &state.pool,
        &state.config,
        &payload.shelter_code,
        payload.user_id,
        payload.display_name.as_deref(),
        payload.max_players,
    )
    .await?;

    let token = mint_token(&state, &joined.session, &joined.player)?;

    state
        .hub
        .broadcast(&SessionEvent::session_created(
            &joined.session,
            &joined.player,
        ))
        .await;

    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            session: joined.session,
            player: joined.player,
            players: joined.players,
            token,
        }),
    ))
}

pub async fn join_session(
    State(state): State<AppState>,
    Json(payload): Json<JoinSessionRequest>,
) -> Result<Json<SessionResponse>, AppError> {
    payload.validate()?;

    let joined = session_service::join(
        &state.pool,
        &payload.shelter_code,
        payload.user_id,
        payload.display_name.as_deref(),
    )
    .await?;

    let token = mint_token(&state, &joined.session, &joined.player)?;

    state
        .hub
        .broadcast(&SessionEvent::player_joined(
            joined.session.id,
            &joined.player,
        ))
        .await;

    Ok(Json(SessionResponse {
        session: joined.session,
        player: joined.player,
        players: joined.players,
        token,
    }))
}

pub async fn get_session(
    State(state): State<AppState>,
    Extension(claims): Extension<RaceClaims>,
    Path(session_id): Path<SessionId>,
) -> Result<Json<SessionSnapshotResponse>, AppError> {
    claims.ensure_session(session_id)?;

    let snapshot = session_service::get_with_players(&state.pool, session_id).await?;
    Ok(Json(SessionSnapshotResponse {
        session: snapshot.session,
        players: snapshot.players,
    }))
}

pub async fn toggle_ready(
    State(state): State<AppState>,
    Extension(claims): Extension<RaceClaims>,
    Path(session_id): Path<SessionId>,
    Json(payload): Json<ReadyRequest>,
) -> Result<Json<Player>, AppError> {
    claims.ensure_session(session_id)?;

    let player =
        session_service::toggle_ready(&state.pool, session_id, claims.user_id()?, payload.ready)
            .await?;

    state
        .hub
        .broadcast(&SessionEvent::ready_updated(session_id, &player))
        .await;

    Ok(Json(player))
}

pub async fn heartbeat(
    State(state): State<AppState>,
    Extension(claims): Extension<RaceClaims>,
    Path(session_id): Path<SessionId>,
) -> Result<StatusCode, AppError> {
    claims.ensure_session(session_id)?;

    session_service::heartbeat(&state.pool, session_id, claims.user_id()?).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn start_race(
    State(state): State<AppState>,
    Extension(claims): Extension<RaceClaims>,
    Path(session_id): Path<SessionId>,
) -> Result<Json<RaceSession>, AppError> {
    claims.ensure_session(session_id)?;

    let session =
        session_service::start(&state.pool, &state.config, session_id, claims.user_id()?).await?;

    state
        .hub
        .broadcast(&SessionEvent::race_started(&session))
        .await;

    Ok(Json(session))
}

pub async fn finish_race(
    State(state): State<AppState>,
    Extension(claims): Extension<RaceClaims>,
    Path(session_id): Path<SessionId>,
) -> Result<Json<RaceSession>, AppError> {
    claims.ensure_session(session_id)?;

    let session = session_service::finish(&state.pool, session_id, claims.user_id()?).await?;

    state
        .hub
        .broadcast(&SessionEvent::race_finished(&session))
        .await;
    // Terminal state: nothing further will be broadcast for this session.
    state.hub.close(session_id).await;

    Ok(Json(session))
}

pub async fn leave_session(
    State(state): State<AppState>,
    Extension(claims): Extension<RaceClaims>,
    Path(session_id): Path<SessionId>,
) -> Result<StatusCode, AppError> {
    claims.ensure_session(session_id)?;

    let outcome = session_service::leave(&state.pool, session_id, claims.user_id()?).await?;

    // Promotion goes out before player_left so clients never observe a
    // hostless roster.
    if let Some(new_host) = &outcome.promoted {
        state
            .hub
            .broadcast(&SessionEvent::host_promoted(session_id, new_host))
            .await;
    }
    state
        .hub
        .broadcast(&SessionEvent::player_left(
            session_id,
            outcome.departed.user_id,
        ))
        .await;
    if outcome.closed {
        state
            .hub
            .broadcast(&SessionEvent::session_closed(session_id))
            .await;
        state.hub.close(session_id).await;
    }

    Ok(StatusCode::NO_CONTENT)
}

fn mint_token(
    state: &AppState,
    session: &RaceSession,
    player: &Player,
) -> Result<String, AppError> {
    // Role is fixed at mint time; privileged calls re-check the live host.
    let role = if session.host_user_id == player.user_id {
        ROLE_HOST
    } else {
        ROLE_PLAYER
    };
    let claims = RaceClaims::new(
        player.user_id,
        session.id,
        player.id,
        role,
        state.config.jwt_expiration_hours,
    );
    create_race_token(&claims, &state.config.jwt_secret).map_err(AppError::from)
}
