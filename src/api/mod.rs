//! HTTP surface: router assembly and server lifecycle.

use crate::{
    auth::{
        rate_limit::{
            RateLimiter, DEFAULT_CLEANUP_INTERVAL, DEFAULT_MAX_AGE, DEFAULT_MAX_ENTRIES,
        },
        roles::ROLE_ADMIN,
        token::TokenService,
    },
    audit::TracingAuditLogger,
    cli::globals::GlobalArgs,
};
use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::{DefaultBodyLimit, MatchedPath, Request},
    http::{HeaderName, HeaderValue},
    middleware::{from_fn, Next},
    routing::{get, post},
    Extension, Router,
};
use sqlx::postgres::PgPoolOptions;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;

pub mod handlers;
pub mod middleware;
pub mod openapi;
pub mod state;
pub mod storage;

pub use state::{ApiConfig, AuthState};

/// Build the application router around the shared auth state.
///
/// Every route sits behind CORS, the body cap and the per-IP throttle, in
/// that order; the authenticated and admin sub-routers add the bearer and
/// role gates per route.
#[must_use]
pub fn router(state: Arc<AuthState>) -> Router {
    let public = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/openapi.json", get(openapi::openapi_json))
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/auth/refresh", post(handlers::auth::refresh))
        .route("/api/auth/logout", post(handlers::auth::logout))
        .route("/api/invites/accept", post(handlers::invites::accept_invite));

    let authenticated = Router::new()
        .route("/api/me", get(handlers::me::me))
        .route_layer(from_fn(middleware::require_auth));

    let admin = Router::new()
        .route("/api/invites", post(handlers::invites::create_invite))
        .route_layer(from_fn(|request: Request, next: Next| {
            middleware::require_role(ROLE_ADMIN, request, next)
        }))
        .route_layer(from_fn(middleware::require_auth));

    let max_body_bytes = state.config().max_body_bytes();

    public.merge(authenticated).merge(admin).layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(Extension(state))
            .layer(from_fn(middleware::cors))
            .layer(from_fn(middleware::body_limit))
            .layer(DefaultBodyLimit::max(max_body_bytes))
            .layer(from_fn(middleware::rate_limit)),
    )
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, dsn: String, globals: &GlobalArgs, config: ApiConfig) -> Result<()> {
    // Connect to database
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    let limiter = RateLimiter::new(DEFAULT_MAX_ENTRIES, DEFAULT_CLEANUP_INTERVAL, DEFAULT_MAX_AGE);
    let state = Arc::new(AuthState::new(
        TokenService::new(&globals.jwt_secret),
        Arc::clone(&limiter),
        Arc::new(storage::PgUserStore::new(pool.clone())),
        Arc::new(TracingAuditLogger),
        config,
    ));

    let app = router(Arc::clone(&state)).layer(Extension(pool));

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Gracefully shutdown");
    })
    .await?;

    // The cleanup task must not outlive the server.
    limiter.stop();

    Ok(())
}

fn make_span(request: &axum::http::Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
