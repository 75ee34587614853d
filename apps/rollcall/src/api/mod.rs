//! # Rollcall HTTP API Module
//!
//! This module implements the HTTP JSON API using axum.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /status` - Record counts
//! - `GET /groups`, `POST /groups` - List or create groups
//! - `PUT /groups/{id}`, `DELETE /groups/{id}` - Update or delete a group
//! - `GET /groups/{id}/students` - Members found by the last filter run
//! - `POST /groups/run-filters` - Recompute every group's membership
//! - `GET /students`, `POST /students` - List or create students
//! - `GET /students/{id}` - One student
//! - `GET /rolls`, `POST /rolls` - List or record rolls
//!
//! ## Security Configuration
//!
//! - `server.cors_origins` / `ROLLCALL_CORS_ORIGINS`: allowed origins, or "*" for all (default: localhost only)
//! - `server.rate_limit` / `ROLLCALL_RATE_LIMIT`: requests per second (default: 100, 0 to disable)

mod handlers;
mod middleware;
mod types;

// Re-exports for integration tests (via `rollcall::api::*`)
pub use middleware::{GlobalRateLimiter, create_rate_limiter};
pub use types::{
    ApiError, ApiResponse, CreateGroupRequest, CreateRollRequest, CreateStudentRequest, EmptyData,
    ErrorResponse, GroupData, GroupsData, HealthResponse, INTERNAL_ERROR_MESSAGE, MembersData,
    RollData, RollMarkRequest, RollsData, RunData, StatusData, StudentData, StudentsData,
    UpdateGroupRequest,
};

use crate::config::ServerConfig;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{get, post, put},
};
use rollcall_core::{RollcallError, Store};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state containing the store.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RwLock<Store>>,
}

impl AppState {
    #[must_use]
    pub fn new(store: Store) -> Self {
        Self {
            store: Arc::new(RwLock::new(store)),
        }
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

/// Build the CORS layer from the configured origins.
///
/// - `["*"]`: allows all origins
/// - empty: localhost only
/// - otherwise: exactly the listed origins; invalid entries are skipped
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        tracing::warn!("CORS: Allowing ALL origins. This is insecure for production!");
        return CorsLayer::permissive();
    }
    if origins.is_empty() {
        tracing::info!("CORS: No origins configured, defaulting to localhost only");
        return build_localhost_cors();
    }

    let allowed_origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(hv) => {
                tracing::info!("CORS: Allowing origin: {}", origin);
                Some(hv)
            }
            Err(e) => {
                tracing::warn!("CORS: Invalid origin '{}': {}", origin, e);
                None
            }
        })
        .collect();

    if allowed_origins.is_empty() {
        tracing::warn!("CORS: No valid origins configured, defaulting to localhost only");
        build_localhost_cors()
    } else {
        restricted_cors(allowed_origins)
    }
}

/// Build a restrictive CORS layer that only allows localhost origins.
fn build_localhost_cors() -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        "http://localhost:3000",
        "http://localhost:8080",
        "http://127.0.0.1:3000",
        "http://127.0.0.1:8080",
    ]
    .into_iter()
    .filter_map(|o| o.parse::<HeaderValue>().ok())
    .collect();

    restricted_cors(origins)
}

fn restricted_cors(origins: Vec<HeaderValue>) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE])
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
///
/// Middleware stack (outer to inner):
/// 1. Tracing - logs all requests
/// 2. CORS - handles preflight requests
/// 3. Body limit - 1 MiB
/// 4. Rate Limiting - global limiter (if enabled)
pub fn create_router(state: AppState, config: &ServerConfig) -> Router {
    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/status", get(handlers::status_handler))
        .route(
            "/groups",
            get(handlers::list_groups_handler).post(handlers::create_group_handler),
        )
        .route("/groups/run-filters", post(handlers::run_filters_handler))
        .route(
            "/groups/{id}",
            put(handlers::update_group_handler).delete(handlers::delete_group_handler),
        )
        .route(
            "/groups/{id}/students",
            get(handlers::group_students_handler),
        )
        .route(
            "/students",
            get(handlers::list_students_handler).post(handlers::create_student_handler),
        )
        .route("/students/{id}", get(handlers::get_student_handler))
        .route(
            "/rolls",
            get(handlers::list_rolls_handler).post(handlers::create_roll_handler),
        )
        .fallback(handlers::not_found_handler);

    match create_rate_limiter(config.rate_limit) {
        Some(limiter) => {
            tracing::info!(
                "Rate limiting enabled: {} requests/second",
                config.rate_limit
            );
            router = router.layer(axum_middleware::from_fn_with_state(
                limiter,
                middleware::rate_limit_middleware,
            ));
        }
        None => tracing::info!("Rate limiting disabled"),
    }

    router
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors_layer(&config.cors_origins))
                .layer(DefaultBodyLimit::max(MAX_BODY_BYTES)),
        )
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Start the HTTP server and serve until Ctrl-C.
pub async fn run_server(config: &ServerConfig, store: Store) -> Result<(), RollcallError> {
    let router = create_router(AppState::new(store), config);
    let addr = config.bind_addr();

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| RollcallError::Io(format!("Bind failed: {}", e)))?;

    tracing::info!("Rollcall HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| RollcallError::Io(format!("Server error: {}", e)))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
