use axum::{http::StatusCode, response::Response, routing::get, Router};
use once_cell::sync::Lazy;
use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

// Global metrics
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();

    registry.register(Box::new(SECURITY_LOG_WRITES.clone())).unwrap();
    registry.register(Box::new(SECURITY_LOG_FAILURES.clone())).unwrap();
    registry.register(Box::new(CONTAINMENT_ACTIONS.clone())).unwrap();
    registry.register(Box::new(PLAYBOOK_RUNS.clone())).unwrap();
    registry.register(Box::new(RATE_LIMIT_ALLOWED.clone())).unwrap();
    registry.register(Box::new(RATE_LIMIT_DENIED.clone())).unwrap();
    registry.register(Box::new(FORENSIC_EXPORTS.clone())).unwrap();
    registry.register(Box::new(BLOCKED_IPS.clone())).unwrap();

    registry
});

pub static SECURITY_LOG_WRITES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("scrapsoc_security_log_writes_total", "Security log entries written")
        .expect("metric can be created")
});

pub static SECURITY_LOG_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "scrapsoc_security_log_failures_total",
        "Security log writes that failed and were dropped",
    )
    .expect("metric can be created")
});

pub static CONTAINMENT_ACTIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("scrapsoc_containment_actions_total", "Containment actions applied"),
        &["action"],
    )
    .expect("metric can be created")
});

pub static PLAYBOOK_RUNS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("scrapsoc_playbook_runs_total", "Playbook executions by outcome"),
        &["playbook", "outcome"],
    )
    .expect("metric can be created")
});

pub static RATE_LIMIT_ALLOWED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("scrapsoc_rate_limit_allowed_total", "Requests allowed by the rate limiter")
        .expect("metric can be created")
});

pub static RATE_LIMIT_DENIED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("scrapsoc_rate_limit_denied_total", "Requests denied by the rate limiter")
        .expect("metric can be created")
});

pub static FORENSIC_EXPORTS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("scrapsoc_forensic_exports_total", "Forensic exports produced")
        .expect("metric can be created")
});

pub static BLOCKED_IPS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("scrapsoc_blocked_ips", "Addresses currently in the block set")
        .expect("metric can be created")
});

pub fn create_metrics_router() -> Router {
    Router::new().route("/metrics", get(metrics_handler))
}

async fn metrics_handler() -> Result<Response<String>, StatusCode> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    match encoder.encode_to_string(&metric_families) {
        Ok(output) => {
            let response = Response::builder()
                .status(200)
                .header("content-type", "text/plain; version=0.0.4")
                .body(output)
                .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
            Ok(response)
        }
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}
