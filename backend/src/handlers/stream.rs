//! WebSocket subscribe endpoint: one long-lived connection per client,
//! registered with the hub and fed broadcasts until the peer or the session
//! goes away.

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{header, HeaderMap},
    response::Response,
};
use serde::Deserialize;

use crate::{
    realtime::SessionEvent,
    state::AppState,
    types::SessionId,
    utils::jwt::{verify_race_token, RaceClaims},
};

#[derive(Debug, Deserialize)]
pub struct StreamParams {
    pub token: Option<String>,
}

pub async fn session_stream(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
    Query(params): Query<StreamParams>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let auth = authorize(&state, session_id, &params, &headers);

    // Auth failures still upgrade, then close with a short reason code; the
    // stream never carries business-level error events.
    ws.on_upgrade(move |socket| async move {
        match auth {
            Ok(claims) => handle_socket(state, session_id, claims, socket).await,
            Err(reason) => close_unauthorized(socket, reason).await,
        }
    })
}

fn authorize(
    state: &AppState,
    session_id: SessionId,
    params: &StreamParams,
    headers: &HeaderMap,
) -> Result<RaceClaims, &'static str> {
    let token = params
        .token
        .clone()
        .or_else(|| {
            headers
                .get(header::AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.strip_prefix("Bearer "))
                .map(|value| value.to_string())
        })
        .ok_or("missing token")?;

    let claims =
        verify_race_token(&token, &state.config.jwt_secret).map_err(|_| "invalid token")?;
    claims
        .ensure_session(session_id)
        .map_err(|_| "session mismatch")?;
    Ok(claims)
}

async fn close_unauthorized(mut socket: WebSocket, reason: &'static str) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: close_code::POLICY,
            reason: reason.into(),
        })))
        .await;
}

async fn handle_socket(state: AppState, session_id: SessionId, claims: RaceClaims, mut socket: WebSocket) {
    let Ok(user_id) = claims.user_id() else {
        close_unauthorized(socket, "invalid token").await;
        return;
    };

    let (connection_id, mut outbound) = state.hub.subscribe(session_id).await;
    tracing::debug!(
        session_id = %session_id,
        connection_id = %connection_id,
        "Stream subscribed"
    );

    let ack = SessionEvent::connected(session_id, user_id);
    match serde_json::to_string(&ack) {
        Ok(payload) => {
            if socket.send(Message::Text(payload.into())).await.is_err() {
                state.hub.unsubscribe(session_id, connection_id).await;
                return;
            }
        }
        Err(err) => {
            tracing::warn!(error = %err, session_id = %session_id, "Failed to serialize ack");
            state.hub.unsubscribe(session_id, connection_id).await;
            return;
        }
    }

    loop {
        tokio::select! {
            maybe_outbound = outbound.recv() => {
                match maybe_outbound {
                    Some(message) => {
                        let closing = matches!(message, Message::Close(_));
                        if socket.send(message).await.is_err() || closing {
                            break;
                        }
                    }
                    // Hub dropped this session's entry.
                    None => break,
                }
            }
            maybe_inbound = socket.recv() => {
                match maybe_inbound {
                    Some(Ok(Message::Ping(payload))) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    state.hub.unsubscribe(session_id, connection_id).await;
    tracing::debug!(
        session_id = %session_id,
        connection_id = %connection_id,
        "Stream unsubscribed"
    );
}
