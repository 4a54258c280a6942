use crate::auth::Principal;
use crate::containment::middleware::ClientAddress;
use crate::metrics::{RATE_LIMIT_ALLOWED, RATE_LIMIT_DENIED};
use axum::{
    extract::{Request, State},
    http::{HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

pub const DEFAULT_WINDOW_MS: u64 = 60_000;
pub const DEFAULT_MAX_REQUESTS: u64 = 100;
/// Longest window accepted; larger requests are clamped
pub const MAX_WINDOW_MS: u64 = 86_400_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RateLimitEntry {
    count: u64,
    reset_time: DateTime<Utc>,
    /// Denied for the rest of the window whatever limit the caller checks with
    exhausted: bool,
}

fn window_end(now: DateTime<Utc>, window_ms: u64) -> DateTime<Utc> {
    now + ChronoDuration::milliseconds(window_ms.min(MAX_WINDOW_MS) as i64)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitResponse {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    pub reset_time: DateTime<Utc>,
}

impl RateLimitResponse {
    pub fn reset_epoch_secs(&self) -> i64 {
        self.reset_time.timestamp()
    }

    /// Seconds until the window resets, only reported for denied checks
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> Option<u64> {
        if self.allowed {
            return None;
        }
        let millis = (self.reset_time - now).num_milliseconds().max(0) as u64;
        Some(millis.div_ceil(1000).max(1))
    }

    /// Response headers describing this check
    pub fn headers(&self, now: DateTime<Utc>) -> Vec<(HeaderName, HeaderValue)> {
        let mut headers = vec![
            (
                HeaderName::from_static("x-ratelimit-limit"),
                HeaderValue::from(self.limit),
            ),
            (
                HeaderName::from_static("x-ratelimit-remaining"),
                HeaderValue::from(self.remaining),
            ),
            (
                HeaderName::from_static("x-ratelimit-reset"),
                HeaderValue::from(self.reset_epoch_secs()),
            ),
        ];
        if let Some(retry_after) = self.retry_after_secs(now) {
            headers.push((axum::http::header::RETRY_AFTER, HeaderValue::from(retry_after)));
        }
        headers
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RateLimiterStats {
    pub tracked_identifiers: usize,
    pub active_identifiers: usize,
}

/// Fixed-window request counter keyed by caller identity.
///
/// Entries live in a mutex-guarded map, so concurrent checks on one
/// identifier are serialized and never lose increments.
pub struct RateLimiter {
    entries: Mutex<HashMap<String, RateLimitEntry>>,
    default_window_ms: u64,
    default_max_requests: u64,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_MS, DEFAULT_MAX_REQUESTS)
    }
}

impl RateLimiter {
    pub fn new(default_window_ms: u64, default_max_requests: u64) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            default_window_ms,
            default_max_requests,
        }
    }

    pub fn default_window_ms(&self) -> u64 {
        self.default_window_ms
    }

    pub fn default_max_requests(&self) -> u64 {
        self.default_max_requests
    }

    /// Check with the limiter's configured window and limit
    pub async fn check_default(&self, identifier: &str) -> RateLimitResponse {
        self.check(identifier, self.default_window_ms, self.default_max_requests)
            .await
    }

    pub async fn check(
        &self,
        identifier: &str,
        window_ms: u64,
        max_requests: u64,
    ) -> RateLimitResponse {
        self.check_at(identifier, window_ms, max_requests, Utc::now())
            .await
    }

    pub(crate) async fn check_at(
        &self,
        identifier: &str,
        window_ms: u64,
        max_requests: u64,
        now: DateTime<Utc>,
    ) -> RateLimitResponse {
        let mut entries = self.entries.lock().await;

        let current = entries
            .get_mut(identifier)
            .filter(|entry| now <= entry.reset_time);

        let response = if let Some(entry) = current {
            if entry.exhausted || entry.count >= max_requests {
                tracing::debug!(
                    identifier = identifier,
                    count = entry.count,
                    exhausted = entry.exhausted,
                    limit = max_requests,
                    "Rate limit exceeded"
                );
                RateLimitResponse {
                    allowed: false,
                    limit: max_requests,
                    remaining: 0,
                    reset_time: entry.reset_time,
                }
            } else {
                entry.count += 1;
                RateLimitResponse {
                    allowed: true,
                    limit: max_requests,
                    remaining: max_requests - entry.count,
                    reset_time: entry.reset_time,
                }
            }
        } else {
            // Missing or stale: start a fresh window instead of incrementing
            let reset_time = window_end(now, window_ms);
            entries.insert(
                identifier.to_string(),
                RateLimitEntry {
                    count: 1,
                    reset_time,
                    exhausted: false,
                },
            );
            RateLimitResponse {
                allowed: true,
                limit: max_requests,
                remaining: max_requests.saturating_sub(1),
                reset_time,
            }
        };

        if response.allowed {
            RATE_LIMIT_ALLOWED.inc();
        } else {
            RATE_LIMIT_DENIED.inc();
        }

        response
    }

    /// Put an identifier into the denied state until a full window elapses
    pub async fn exhaust(&self, identifier: &str, window_ms: u64) {
        let reset_time = window_end(Utc::now(), window_ms);
        let mut entries = self.entries.lock().await;
        entries.insert(
            identifier.to_string(),
            RateLimitEntry {
                count: 0,
                reset_time,
                exhausted: true,
            },
        );
        tracing::info!(identifier = identifier, %reset_time, "Rate limit window exhausted");
    }

    /// Drop every entry whose window has passed
    pub async fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Utc::now()).await
    }

    pub(crate) async fn sweep_expired_at(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| now <= entry.reset_time);
        let removed = before - entries.len();
        if removed > 0 {
            tracing::debug!(removed = removed, "Swept expired rate limit entries");
        }
        removed
    }

    pub async fn stats(&self) -> RateLimiterStats {
        let now = Utc::now();
        let entries = self.entries.lock().await;
        RateLimiterStats {
            tracked_identifiers: entries.len(),
            active_identifiers: entries.values().filter(|e| now <= e.reset_time).count(),
        }
    }

    /// Run [`sweep_expired`](Self::sweep_expired) on a fixed period.
    ///
    /// The returned handle owns the task; abort it on shutdown.
    pub fn spawn_sweeper(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                self.sweep_expired().await;
            }
        })
    }
}

/// Identity used for rate limiting: the address resolved by the gateway,
/// else the socket peer. Only requests with no address at all share a bucket.
pub fn client_identifier(request: &Request) -> String {
    let address = match request.extensions().get::<ClientAddress>() {
        Some(address) => address.clone(),
        None => ClientAddress::resolve(request, false),
    };
    address
        .client_ip()
        .map(|ip| format!("ip:{}", ip))
        .unwrap_or_else(|| "ip:unknown".to_string())
}

/// Bucket for a marketplace account or authenticated principal
pub fn user_identifier(user_id: &str) -> String {
    format!("user:{}", user_id)
}

/// Per-address window, applied before authentication
pub async fn rate_limit_middleware(
    State(rate_limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let identifier = client_identifier(&request);
    enforce(&rate_limiter, identifier, request, next).await
}

/// Per-principal window, applied after authentication.
///
/// This is the bucket the API-abuse playbook exhausts, so a throttled
/// account is refused from any address. Anonymous requests pass through.
pub async fn principal_rate_limit_middleware(
    State(rate_limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let identifier = match request.extensions().get::<Principal>() {
        Some(principal) => user_identifier(&principal.admin_id),
        None => return next.run(request).await,
    };
    enforce(&rate_limiter, identifier, request, next).await
}

async fn enforce(
    rate_limiter: &RateLimiter,
    identifier: String,
    request: Request,
    next: Next,
) -> Response {
    let result = rate_limiter.check_default(&identifier).await;
    let now = Utc::now();

    let mut response = if result.allowed {
        next.run(request).await
    } else {
        tracing::warn!(identifier = %identifier, "Request rejected by rate limiter");
        (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({
                "error": "rate_limited",
                "message": "Too many requests",
                "retry_after": result.retry_after_secs(now),
            })),
        )
            .into_response()
    };

    let headers = response.headers_mut();
    for (name, value) in result.headers(now) {
        headers.insert(name, value);
    }

    response
}
