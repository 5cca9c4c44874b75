use axum::{
    http::{HeaderValue, Method},
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use std::net::SocketAddr;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shelterrun_backend::{
    config::Config,
    db::connection::create_pool,
    handlers,
    middleware::{auth, request_id},
    realtime::{RealtimeHub, SessionEvent},
    services::sessions as session_service,
    state::AppState,
};

fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return "<empty>".into();
    }
    let prefix = s.chars().take(4).collect::<String>();
    format!("{}*** (len={})", prefix, s.len())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shelterrun_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load()?;
    tracing::info!(
        database_url = %config.database_url,
        jwt_secret = %mask_secret(&config.jwt_secret),
        jwt_expiration_hours = config.jwt_expiration_hours,
        idle_timeout_seconds = config.idle_timeout_seconds,
        sweep_interval_seconds = config.sweep_interval_seconds,
        "Loaded configuration from environment/.env"
    );

    // Initialize database
    let pool = create_pool(&config.database_url).await?;
    sqlx::migrate!("./migrations").run(pool.as_ref()).await?;

    let hub = RealtimeHub::new();
    let state = AppState::new(pool, config.clone(), hub);

    // Background reaper: same sweep as the operator endpoint.
    let reaper_state = state.clone();
    tokio::spawn(async move {
        let period = std::time::Duration::from_secs(reaper_state.config.sweep_interval_seconds);
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            match session_service::expire_stale(&reaper_state.pool, &reaper_state.config).await {
                Ok(closed) => {
                    for session_id in closed {
                        reaper_state
                            .hub
                            .broadcast(&SessionEvent::session_closed(session_id))
                            .await;
                        reaper_state.hub.close(session_id).await;
                    }
                }
                Err(err) => tracing::warn!(error = ?err, "Reaper sweep failed"),
            }
        }
    });

    // Public routes (identity comes from the request body; tokens are minted here)
    let public_routes = Router::new()
        .route("/api/sessions", post(handlers::sessions::create_session))
        .route("/api/sessions/join", post(handlers::sessions::join_session));

    // Token-protected session routes
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

    // The stream endpoint authenticates inside the upgrade handshake.
    let stream_routes = Router::new().route(
        "/api/sessions/{id}/stream",
        get(handlers::stream::session_stream),
    );

    // Operator routes guarded by the shared secret header.
    let ops_routes = Router::new().route("/api/ops/sweep", post(handlers::ops::sweep));

    let cors_origins: Vec<HeaderValue> = state
        .config
        .cors_allow_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let app = Router::new()
        .merge(public_routes)
        .merge(session_routes)
        .merge(stream_routes)
        .merge(ops_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(axum_middleware::from_fn(request_id::request_id))
                .layer(
                    CorsLayer::new()
                        .allow_origin(cors_origins)
                        .allow_methods([
                            Method::GET,
                            Method::POST,
                            Method::PUT,
                            Method::DELETE,
                            Method::OPTIONS,
                        ])
                        .allow_headers(Any)
                        .max_age(std::time::Duration::from_secs(24 * 60 * 60)),
                ),
        )
        .with_state(state.clone());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.port));
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
