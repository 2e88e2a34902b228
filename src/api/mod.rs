//! HTTP API
//!
//! This module handles:
//! - Routing the power endpoints to the engine
//! - Mapping engine errors to status codes and JSON bodies
//! - Per-client request throttling

pub mod rate_limit;
pub mod routes;

use crate::config::RateLimitConfig;
use crate::engine::PowerEngine;
use axum::Router;
use rate_limit::RateLimiter;
use std::sync::Arc;
use tracing::info;

/// Build the application router
pub fn create_app(engine: Arc<PowerEngine>, rate_limit: RateLimitConfig) -> Router {
    let limiter = Arc::new(RateLimiter::new(rate_limit));

    let app = routes::power_routes()
        .layer(axum::middleware::from_fn_with_state(
            limiter,
            rate_limit::limit_requests,
        ))
        .with_state(engine);

    info!("HTTP routes ready: /, /power, /power/on, /power/off");
    app
}
