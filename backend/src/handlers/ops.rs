//! Operator-only endpoints, guarded by a shared secret rather than per-user
//! tokens.

use axum::{extract::State, http::HeaderMap, Json};
use serde::Serialize;

use crate::{
    error::AppError, realtime::SessionEvent, services::sessions as session_service,
    state::AppState, types::SessionId,
};

const OPERATOR_SECRET_HEADER: &str = "x-operator-secret";

#[derive(Debug, Serialize)]
pub struct SweepResponse {
    pub closed: Vec<SessionId>,
}

/// Manually triggers the stale-session reaper. Same code path as the
/// background sweep, so running both concurrently is harmless.
pub async fn sweep(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<SweepResponse>, AppError> {
    let presented = headers
        .get(OPERATOR_SECRET_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Operator secret required".to_string()))?;
    if presented != state.config.operator_secret {
        return Err(AppError::Unauthorized("Invalid operator secret".to_string()));
    }

    let closed = session_service::expire_stale(&state.pool, &state.config).await?;
    for session_id in &closed {
        state
            .hub
            .broadcast(&SessionEvent::session_closed(*session_id))
            .await;
        state.hub.close(*session_id).await;
    }

    Ok(Json(SweepResponse { closed }))
}
