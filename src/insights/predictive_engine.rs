use crate::security_log::{EventKind, EventStore, LogLevel, SecurityLogEntry};
use chrono::{Duration, Utc};
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error};

pub const DEFAULT_WINDOW_HOURS: i64 = 24;
pub const DEFAULT_SAMPLE_LIMIT: usize = 500;

const LOGIN_FAIL_THRESHOLD: u64 = 50;
const SQLI_THRESHOLD: u64 = 5;
const API_ABUSE_THRESHOLD: u64 = 20;
const CRITICAL_HEALTH_THRESHOLD: u64 = 10;
const VELOCITY_WARNING_THRESHOLD: u64 = 200;
const LOGIN_FAIL_WARNING_THRESHOLD: u64 = 30;
const CONNECTION_JITTER: u64 = 25;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictiveInsight {
    pub forecasted_threat_type: String,
    pub probability: u64,
    pub timeframe_hours: u32,
    pub recommended_action: String,
    pub what_if_scenario: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseTimeTrend {
    Stable,
    Degrading,
    Improving,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemHealthInsight {
    pub status: HealthStatus,
    pub predicted_bottleneck: Option<String>,
    pub response_time_trend: ResponseTimeTrend,
    /// Placeholder gauge: sample size plus random jitter. Not a measured
    /// connection count.
    pub active_connections: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsightReport {
    pub insights: Vec<PredictiveInsight>,
    pub health: SystemHealthInsight,
}

/// Counts the rules are evaluated against
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventCounts {
    pub login_fails: u64,
    pub sqli_attempts: u64,
    pub api_abuse: u64,
    pub critical_logs: u64,
    pub total: u64,
}

impl EventCounts {
    pub fn from_sample(sample: &[SecurityLogEntry]) -> Self {
        sample.iter().fold(Self::default(), |mut counts, entry| {
            match entry.event {
                EventKind::FailedLogin => counts.login_fails += 1,
                EventKind::SqlInjectionAttempt => counts.sqli_attempts += 1,
                EventKind::ApiAbuse => counts.api_abuse += 1,
                _ => {}
            }
            if entry.level == LogLevel::Critical {
                counts.critical_logs += 1;
            }
            counts.total += 1;
            counts
        })
    }
}

/// Rule-based forecasts over the recent security log
pub struct PredictiveEngine {
    store: Arc<dyn EventStore>,
    window: Duration,
    sample_limit: usize,
}

impl PredictiveEngine {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self::with_window(store, DEFAULT_WINDOW_HOURS, DEFAULT_SAMPLE_LIMIT)
    }

    pub fn with_window(store: Arc<dyn EventStore>, window_hours: i64, sample_limit: usize) -> Self {
        Self {
            store,
            window: Duration::hours(window_hours),
            sample_limit,
        }
    }

    /// Always returns a report. A failed read yields the baseline forecast
    /// and a healthy default.
    pub async fn generate(&self) -> InsightReport {
        let since = Utc::now() - self.window;

        match self.store.recent(since, self.sample_limit).await {
            Ok(sample) => {
                let counts = EventCounts::from_sample(&sample);
                debug!(?counts, "Generating predictive insights");
                let jitter = rand::thread_rng().gen_range(0..CONNECTION_JITTER);
                analyze(counts, jitter)
            }
            Err(e) => {
                error!(error = %e, "Failed to read security log for insights, serving baseline");
                degraded_report()
            }
        }
    }
}

pub fn analyze(counts: EventCounts, jitter: u64) -> InsightReport {
    InsightReport {
        insights: forecast(&counts),
        health: classify_health(&counts, jitter),
    }
}

pub fn forecast(counts: &EventCounts) -> Vec<PredictiveInsight> {
    let mut insights = Vec::new();

    if counts.login_fails > LOGIN_FAIL_THRESHOLD {
        insights.push(PredictiveInsight {
            forecasted_threat_type: "Distributed Credential Stuffing".to_string(),
            probability: (60 + counts.login_fails / 5).min(95),
            timeframe_hours: 2,
            recommended_action: "Enforce step-up verification on logins from new devices and rate limit the auth endpoint per IP".to_string(),
            what_if_scenario: format!(
                "If {} failed logins continue at this pace, trader accounts with reused passwords are likely to be taken over within hours",
                counts.login_fails
            ),
        });
    }

    if counts.sqli_attempts > SQLI_THRESHOLD {
        insights.push(PredictiveInsight {
            forecasted_threat_type: "Coordinated Data Exfiltration Attempt".to_string(),
            probability: (70 + counts.sqli_attempts * 2).min(95),
            timeframe_hours: 1,
            recommended_action: "Block the originating addresses and audit query parameters on listing search endpoints".to_string(),
            what_if_scenario: "If an injection succeeds, wallet balances and KYC documents become readable by the attacker".to_string(),
        });
    }

    if counts.api_abuse > API_ABUSE_THRESHOLD {
        insights.push(PredictiveInsight {
            forecasted_threat_type: "API Rate Limit Bypass Attempt".to_string(),
            probability: (55 + counts.api_abuse).min(90),
            timeframe_hours: 1,
            recommended_action: "Run the API abuse playbook against the top offenders and tighten per-account limits".to_string(),
            what_if_scenario: "If scraping continues, auction pricing data leaks to competitors before bidding closes".to_string(),
        });
    }

    if insights.is_empty() {
        insights.push(baseline_insight());
    }

    insights
}

pub fn classify_health(counts: &EventCounts, jitter: u64) -> SystemHealthInsight {
    let (status, bottleneck) = if counts.critical_logs > CRITICAL_HEALTH_THRESHOLD {
        (
            HealthStatus::Critical,
            Some("Containment queue saturated by critical alerts"),
        )
    } else if counts.total > VELOCITY_WARNING_THRESHOLD
        || counts.login_fails > LOGIN_FAIL_WARNING_THRESHOLD
    {
        (
            HealthStatus::Warning,
            Some("Authentication service under elevated event velocity"),
        )
    } else {
        (HealthStatus::Healthy, None)
    };

    let response_time_trend = match status {
        HealthStatus::Healthy => ResponseTimeTrend::Stable,
        HealthStatus::Warning | HealthStatus::Critical => ResponseTimeTrend::Degrading,
    };

    SystemHealthInsight {
        status,
        predicted_bottleneck: bottleneck.map(str::to_string),
        response_time_trend,
        active_connections: counts.total + jitter,
    }
}

fn baseline_insight() -> PredictiveInsight {
    PredictiveInsight {
        forecasted_threat_type: "Background Automated Scanning".to_string(),
        probability: 30,
        timeframe_hours: 24,
        recommended_action: "Keep monitoring; no containment needed".to_string(),
        what_if_scenario: "Routine internet scanning; escalate only if failed logins or injection attempts start clustering".to_string(),
    }
}

fn degraded_report() -> InsightReport {
    InsightReport {
        insights: vec![baseline_insight()],
        health: SystemHealthInsight {
            status: HealthStatus::Healthy,
            predicted_bottleneck: None,
            response_time_trend: ResponseTimeTrend::Stable,
            active_connections: 0,
        },
    }
}
