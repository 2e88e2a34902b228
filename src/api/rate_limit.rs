//! Fixed-window request limiter keyed by client IP

use crate::config::RateLimitConfig;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::warn;

const RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("ratelimit-limit");
const RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("ratelimit-remaining");
const RATELIMIT_RESET: HeaderName = HeaderName::from_static("ratelimit-reset");
const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

struct Window {
    started: Instant,
    count: u32,
}

/// Outcome of counting one request against its client's window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Time left in the current window
    pub reset_after: Duration,
}

impl Quota {
    /// Seconds until the window resets, rounded up
    pub fn reset_secs(&self) -> u64 {
        let millis = self.reset_after.as_millis() as u64;
        millis.div_ceil(1000)
    }

    /// `RateLimit-*` headers (seconds until reset) and the legacy
    /// `X-RateLimit-*` set (reset as a Unix timestamp)
    pub fn apply_headers(&self, headers: &mut HeaderMap) {
        let reset_at = (SystemTime::now() + self.reset_after)
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let reset_at_secs = (reset_at.as_millis() as u64).div_ceil(1000);

        headers.insert(RATELIMIT_LIMIT, HeaderValue::from(self.limit));
        headers.insert(RATELIMIT_REMAINING, HeaderValue::from(self.remaining));
        headers.insert(RATELIMIT_RESET, HeaderValue::from(self.reset_secs()));
        headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(self.limit));
        headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(self.remaining));
        headers.insert(X_RATELIMIT_RESET, HeaderValue::from(reset_at_secs));
    }
}

pub struct RateLimiter {
    config: RateLimitConfig,
    windows: Mutex<HashMap<IpAddr, Window>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Count a request from `client` against its window
    pub async fn check(&self, client: IpAddr) -> Quota {
        let now = Instant::now();
        let window_len = self.config.window;
        let limit = self.config.max_requests;
        let mut windows = self.windows.lock().await;

        if !windows.contains_key(&client) {
            windows.retain(|_, w| now.duration_since(w.started) < window_len);
        }

        let window = windows.entry(client).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(window.started) >= window_len {
            window.started = now;
            window.count = 0;
        }

        let allowed = window.count < limit;
        if allowed {
            window.count += 1;
        }

        Quota {
            allowed,
            limit,
            remaining: limit.saturating_sub(window.count),
            reset_after: window_len.saturating_sub(now.duration_since(window.started)),
        }
    }
}

/// Middleware: attach quota headers; reject clients over their limit with 429
///
/// Requests served without connection info share one bucket.
pub async fn limit_requests(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

    let quota = limiter.check(client).await;

    let mut response = if quota.allowed {
        next.run(request).await
    } else {
        warn!("Rate limit exceeded for {}", client);
        let body = json!({
            "code": 429,
            "message": "Too many requests, please try again later.",
        });
        let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
        response
            .headers_mut()
            .insert(RETRY_AFTER, HeaderValue::from(quota.reset_secs()));
        response
    };

    quota.apply_headers(response.headers_mut());
    response
}
