use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;

use crate::containment::IpBlocklist;
use crate::rate_limiter::RateLimiter;
use crate::security_log::EventStore;

const STORE_CHECK_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Serialize)]
pub struct DependencyHealth {
    pub status: ServiceStatus,
    pub latency_ms: u64,
    pub error_message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: ServiceStatus,
    pub timestamp: DateTime<Utc>,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub event_store: DependencyHealth,
    pub rate_limit_identifiers: usize,
    pub blocked_ips: usize,
}

pub struct HealthCheckManager {
    store: Arc<dyn EventStore>,
    rate_limiter: Arc<RateLimiter>,
    blocklist: Arc<IpBlocklist>,
    startup_time: Instant,
}

impl HealthCheckManager {
    pub fn new(
        store: Arc<dyn EventStore>,
        rate_limiter: Arc<RateLimiter>,
        blocklist: Arc<IpBlocklist>,
    ) -> Self {
        Self {
            store,
            rate_limiter,
            blocklist,
            startup_time: Instant::now(),
        }
    }

    /// Liveness plus a bounded ping of the event store.
    ///
    /// A slow or failing store degrades the report; the service itself keeps
    /// answering.
    pub async fn check(&self) -> HealthReport {
        let event_store = self.check_event_store().await;
        let stats = self.rate_limiter.stats().await;

        HealthReport {
            status: event_store.status,
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION"),
            uptime_seconds: self.startup_time.elapsed().as_secs(),
            event_store,
            rate_limit_identifiers: stats.tracked_identifiers,
            blocked_ips: self.blocklist.list().await.len(),
        }
    }

    async fn check_event_store(&self) -> DependencyHealth {
        let started = Instant::now();
        let result = timeout(STORE_CHECK_TIMEOUT, self.store.health_check()).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        let error_message = match result {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some(format!(
                "Health check timed out after {}s",
                STORE_CHECK_TIMEOUT.as_secs()
            )),
        };

        if let Some(message) = &error_message {
            tracing::warn!(error = %message, "Event store health check failed");
        }

        DependencyHealth {
            status: if error_message.is_none() {
                ServiceStatus::Healthy
            } else {
                ServiceStatus::Degraded
            },
            latency_ms,
            error_message,
        }
    }
}
