//! HTTP surface tests driving the axum routers the way main.rs wires them.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use shelterrun_backend::{
    handlers,
    middleware::auth,
    models::SessionState,
    realtime::RealtimeHub,
    state::AppState,
    types::{SessionId, UserId},
};
use sqlx::PgPool;
use std::sync::Arc;
use tower::ServiceExt;

mod support;

use support::{seed_player, seed_session, seed_shelter, test_config, test_pool};

fn test_app(pool: PgPool) -> (Router, AppState) {
    let state = AppState::new(Arc::new(pool), test_config(), RealtimeHub::new());

    let public_routes = Router::new()
        .route("/api/sessions", post(handlers::sessions::create_session))
        .route("/api/sessions/join", post(handlers::sessions::join_session));

    let session_routes = Router::new()
        .route("/api/sessions/{id}", get(handlers::sessions::get_session))
        .route(
            "/api/sessions/{id}/ready",
            put(handlers::sessions::toggle_ready),
        )
        .route(
            "/api/sessions/{id}/heartbeat",
            post(handlers::sessions::heartbeat),
        )
        .route(
            "/api/sessions/{id}/start",
            post(handlers::sessions::start_race),
        )
        .route(
            "/api/sessions/{id}/finish",
            post(handlers::sessions::finish_race),
        )
        .route(
            "/api/sessions/{id}/leave",
            post(handlers::sessions::leave_session),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth::auth,
        ));

    let ops_routes = Router::new().route("/api/ops/sweep", post(handlers::ops::sweep));

    let app = Router::new()
        .merge(public_routes)
        .merge(session_routes)
        .merge(ops_routes)
        .with_state(state.clone());

    (app, state)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn authed_request(method: &str, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

async fn response_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}

async fn create_session(app: &Router, shelter_code: &str, user_id: UserId) -> Value {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/sessions",
            json!({ "shelter_code": shelter_code, "user_id": user_id, "display_name": "host" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    response_json(response).await
}

async fn join_session(app: &Router, shelter_code: &str, user_id: UserId) -> Value {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/sessions/join",
            json!({ "shelter_code": shelter_code, "user_id": user_id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    response_json(response).await
}

#[tokio::test]
async fn create_then_fetch_with_minted_token() {
    let pool = test_pool().await;
    let (app, _state) = test_app(pool.clone());
    let shelter = seed_shelter(&pool).await;

    let created = create_session(&app, &shelter.public_code, UserId::new()).await;
    let session_id = created["session"]["id"].as_str().unwrap().to_string();
    let token = created["token"].as_str().unwrap().to_string();
    assert_eq!(created["session"]["state"], "lobby");
    assert_eq!(created["players"].as_array().unwrap().len(), 1);

    let response = app
        .clone()
        .oneshot(authed_request(
            "GET",
            &format!("/api/sessions/{}", session_id),
            &token,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["session"]["id"], session_id.as_str());
    assert_eq!(body["players"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn missing_token_is_unauthorized() {
    let pool = test_pool().await;
    let (app, _state) = test_app(pool);

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/sessions/{}", SessionId::new()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn token_bound_to_another_session_is_rejected() {
    let pool = test_pool().await;
    let (app, _state) = test_app(pool.clone());
    let shelter_a = seed_shelter(&pool).await;
    let shelter_b = seed_shelter(&pool).await;

    let created_a = create_session(&app, &shelter_a.public_code, UserId::new()).await;
    let created_b = create_session(&app, &shelter_b.public_code, UserId::new()).await;
    let token_a = created_a["token"].as_str().unwrap();
    let session_b = created_b["session"]["id"].as_str().unwrap();

    let response = app
        .clone()
        .oneshot(authed_request(
            "GET",
            &format!("/api/sessions/{}", session_b),
            token_a,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn create_validates_payload() {
    let pool = test_pool().await;
    let (app, _state) = test_app(pool);

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/sessions",
            json!({ "shelter_code": "", "user_id": UserId::new() }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn duplicate_create_conflicts() {
    let pool = test_pool().await;
    let (app, _state) = test_app(pool.clone());
    let shelter = seed_shelter(&pool).await;

    create_session(&app, &shelter.public_code, UserId::new()).await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/sessions",
            json!({ "shelter_code": shelter.public_code, "user_id": UserId::new() }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = response_json(response).await;
    assert_eq!(body["code"], "CONFLICT");
}

#[tokio::test]
async fn non_host_start_is_invalid_transition() {
    let pool = test_pool().await;
    let (app, _state) = test_app(pool.clone());
    let shelter = seed_shelter(&pool).await;

    let created = create_session(&app, &shelter.public_code, UserId::new()).await;
    let session_id = created["session"]["id"].as_str().unwrap().to_string();
    let joined = join_session(&app, &shelter.public_code, UserId::new()).await;
    let player_token = joined["token"].as_str().unwrap();

    let response = app
        .clone()
        .oneshot(authed_request(
            "POST",
            &format!("/api/sessions/{}/start", session_id),
            player_token,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = response_json(response).await;
    assert_eq!(body["code"], "INVALID_TRANSITION");
}

#[tokio::test]
async fn host_start_and_finish_flow() {
    let pool = test_pool().await;
    let (app, _state) = test_app(pool.clone());
    let shelter = seed_shelter(&pool).await;

    let created = create_session(&app, &shelter.public_code, UserId::new()).await;
    let session_id = created["session"]["id"].as_str().unwrap().to_string();
    let token = created["token"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(authed_request(
            "POST",
            &format!("/api/sessions/{}/start", session_id),
            &token,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["state"], "racing");
    assert!(body["started_at"].is_string());

    let response = app
        .clone()
        .oneshot(authed_request(
            "POST",
            &format!("/api/sessions/{}/finish", session_id),
            &token,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["state"], "finished");
    assert!(body["ended_at"].is_string());
}

#[tokio::test]
async fn heartbeat_returns_no_content() {
    let pool = test_pool().await;
    let (app, _state) = test_app(pool.clone());
    let shelter = seed_shelter(&pool).await;

    let created = create_session(&app, &shelter.public_code, UserId::new()).await;
    let session_id = created["session"]["id"].as_str().unwrap().to_string();
    let token = created["token"].as_str().unwrap();

    let response = app
        .clone()
        .oneshot(authed_request(
            "POST",
            &format!("/api/sessions/{}/heartbeat", session_id),
            token,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn ready_change_is_broadcast_to_subscribers() {
    let pool = test_pool().await;
    let (app, state) = test_app(pool.clone());
    let shelter = seed_shelter(&pool).await;

    let created = create_session(&app, &shelter.public_code, UserId::new()).await;
    let session_id: SessionId = created["session"]["id"]
        .as_str()
        .unwrap()
        .parse()
        .unwrap();
    let token = created["token"].as_str().unwrap();

    let (_connection_id, mut rx) = state.hub.subscribe(session_id).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri(format!("/api/sessions/{}/ready", session_id))
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({ "ready": true }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let player = response_json(response).await;
    assert_eq!(player["ready"], true);

    let message = rx.recv().await.expect("broadcast received");
    let axum::extract::ws::Message::Text(text) = message else {
        panic!("expected text frame");
    };
    let event: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(event["event"], "ready_updated");
    assert_eq!(event["payload"]["player"]["ready"], true);
}

#[tokio::test]
async fn host_leave_emits_promotion_before_departure() {
    let pool = test_pool().await;
    let (app, state) = test_app(pool.clone());
    let shelter = seed_shelter(&pool).await;
    let host = UserId::new();

    let created = create_session(&app, &shelter.public_code, host).await;
    let session_id: SessionId = created["session"]["id"]
        .as_str()
        .unwrap()
        .parse()
        .unwrap();
    let host_token = created["token"].as_str().unwrap();
    let joined = join_session(&app, &shelter.public_code, UserId::new()).await;
    let successor = joined["player"]["user_id"].as_str().unwrap().to_string();

    let (_connection_id, mut rx) = state.hub.subscribe(session_id).await;

    let response = app
        .clone()
        .oneshot(authed_request(
            "POST",
            &format!("/api/sessions/{}/leave", session_id),
            host_token,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let first = rx.recv().await.expect("first event");
    let axum::extract::ws::Message::Text(text) = first else {
        panic!("expected text frame");
    };
    let event: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(event["event"], "host_promoted");
    assert_eq!(event["payload"]["host_user_id"], successor.as_str());

    let second = rx.recv().await.expect("second event");
    let axum::extract::ws::Message::Text(text) = second else {
        panic!("expected text frame");
    };
    let event: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(event["event"], "player_left");
    assert_eq!(event["payload"]["user_id"], host.to_string().as_str());
}

#[tokio::test]
async fn sweep_requires_operator_secret() {
    let pool = test_pool().await;
    let (app, _state) = test_app(pool.clone());
    let shelter = seed_shelter(&pool).await;
    let host = UserId::new();
    let stale = seed_session(
        &pool,
        &shelter,
        host,
        SessionState::Lobby,
        Utc::now() - Duration::minutes(1),
    )
    .await;
    seed_player(&pool, stale.id, host, Utc::now() - Duration::minutes(10)).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/ops/sweep")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/ops/sweep")
                .header("x-operator-secret", "wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/ops/sweep")
                .header("x-operator-secret", "test-operator-secret")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    let closed: Vec<String> = body["closed"]
        .as_array()
        .unwrap()
        .iter()
        .map(|id| id.as_str().unwrap().to_string())
        .collect();
    assert!(closed.contains(&stale.id.to_string()));
}
