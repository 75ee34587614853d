//! # Middleware Module
//!
//! Global rate limiting for the Rollcall HTTP API.
//!
//! ## Configuration
//!
//! The limit comes from `server.rate_limit` in the config file or
//! `ROLLCALL_RATE_LIMIT`: requests per second, 0 disables the limiter.

use super::types::ApiError;
use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use std::num::NonZeroU32;
use std::sync::Arc;

// =============================================================================
// RATE LIMITER
// =============================================================================

/// Global rate limiter type alias.
pub type GlobalRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

/// Create a limiter allowing `requests_per_second`, or `None` when it is 0.
pub fn create_rate_limiter(requests_per_second: u32) -> Option<GlobalRateLimiter> {
    let rps = NonZeroU32::new(requests_per_second)?;
    Some(Arc::new(RateLimiter::direct(Quota::per_second(rps))))
}

/// Rate limiting middleware.
///
/// Returns 429 in the error envelope once the limit is exceeded.
pub async fn rate_limit_middleware(
    State(limiter): State<GlobalRateLimiter>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    match limiter.check() {
        Ok(_) => Ok(next.run(request).await),
        Err(_) => {
            tracing::warn!(path = %request.uri().path(), "rate limit exceeded");
            Err(ApiError::Rejected(
                StatusCode::TOO_MANY_REQUESTS,
                "Too Many Requests".to_string(),
            ))
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
