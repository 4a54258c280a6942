use crate::insights::predictive_engine::{
    analyze, classify_health, forecast, EventCounts, HealthStatus, PredictiveEngine,
    ResponseTimeTrend,
};
use crate::security_log::{
    tests::BrokenEventStore, Correlation, EventKind, EventStore, LogLevel, MemoryEventStore,
    SecurityLogEntry,
};
use chrono::{Duration, Utc};
use std::sync::Arc;

async fn seed(store: &MemoryEventStore, level: LogLevel, event: EventKind, count: usize) {
    for _ in 0..count {
        store
            .append(&SecurityLogEntry::new(
                level,
                event.clone(),
                None,
                Correlation::new().with_ip("203.0.113.1"),
            ))
            .await
            .unwrap();
    }
}

fn threat<'a>(
    report: &'a crate::insights::InsightReport,
    name: &str,
) -> Option<&'a crate::insights::PredictiveInsight> {
    report
        .insights
        .iter()
        .find(|insight| insight.forecasted_threat_type == name)
}

#[tokio::test]
async fn test_quiet_log_yields_only_baseline() {
    let store = Arc::new(MemoryEventStore::new());
    seed(&store, LogLevel::Warn, EventKind::FailedLogin, 10).await;
    seed(&store, LogLevel::Info, EventKind::Login, 40).await;

    let report = PredictiveEngine::new(store).generate().await;

    assert_eq!(report.insights.len(), 1);
    assert_eq!(
        report.insights[0].forecasted_threat_type,
        "Background Automated Scanning"
    );
    assert_eq!(report.insights[0].probability, 30);
    assert_eq!(report.insights[0].timeframe_hours, 24);
    assert_eq!(report.health.status, HealthStatus::Healthy);
    assert_eq!(report.health.predicted_bottleneck, None);
    assert_eq!(report.health.response_time_trend, ResponseTimeTrend::Stable);
}

#[tokio::test]
async fn test_credential_stuffing_forecast() {
    let store = Arc::new(MemoryEventStore::new());
    seed(&store, LogLevel::Warn, EventKind::FailedLogin, 60).await;

    let report = PredictiveEngine::new(store).generate().await;

    let insight = threat(&report, "Distributed Credential Stuffing").unwrap();
    assert_eq!(insight.probability, 72);
    assert_eq!(insight.timeframe_hours, 2);
    // 60 failed logins also crosses the warning threshold
    assert_eq!(report.health.status, HealthStatus::Warning);
}

#[tokio::test]
async fn test_exfiltration_and_bypass_forecasts() {
    let store = Arc::new(MemoryEventStore::new());
    seed(&store, LogLevel::Warn, EventKind::SqlInjectionAttempt, 8).await;
    seed(&store, LogLevel::Warn, EventKind::ApiAbuse, 25).await;

    let report = PredictiveEngine::new(store).generate().await;

    assert_eq!(report.insights.len(), 2);
    assert_eq!(
        threat(&report, "Coordinated Data Exfiltration Attempt")
            .unwrap()
            .probability,
        86
    );
    assert_eq!(
        threat(&report, "API Rate Limit Bypass Attempt").unwrap().probability,
        80
    );
    assert!(threat(&report, "Background Automated Scanning").is_none());
}

#[test]
fn test_probabilities_are_capped() {
    let counts = EventCounts {
        login_fails: 400,
        sqli_attempts: 40,
        api_abuse: 100,
        critical_logs: 0,
        total: 540,
    };

    let probabilities: Vec<u64> = forecast(&counts).iter().map(|i| i.probability).collect();
    assert_eq!(probabilities, vec![95, 95, 90]);
}

#[test]
fn test_credential_stuffing_uses_whole_divisions() {
    let counts = EventCounts {
        login_fails: 54,
        total: 54,
        ..Default::default()
    };

    assert_eq!(forecast(&counts)[0].probability, 70);
}

#[tokio::test]
async fn test_critical_entries_drive_critical_health() {
    let store = Arc::new(MemoryEventStore::new());
    seed(&store, LogLevel::Critical, EventKind::ContainmentAction, 11).await;

    let report = PredictiveEngine::new(store).generate().await;

    assert_eq!(report.health.status, HealthStatus::Critical);
    assert!(report.health.predicted_bottleneck.is_some());
    assert_eq!(report.health.response_time_trend, ResponseTimeTrend::Degrading);
}

#[tokio::test]
async fn test_event_velocity_drives_warning_health() {
    let store = Arc::new(MemoryEventStore::new());
    seed(&store, LogLevel::Info, EventKind::Login, 250).await;

    let report = PredictiveEngine::new(store).generate().await;

    assert_eq!(report.health.status, HealthStatus::Warning);
    assert!(report.health.active_connections >= 250);
    assert!(report.health.active_connections < 275);
}

#[tokio::test]
async fn test_sample_is_bounded_and_windowed() {
    let store = Arc::new(MemoryEventStore::new());
    let base = Utc::now() - Duration::minutes(30);
    for i in 0..30 {
        let (level, event) = if i < 20 {
            (LogLevel::Critical, EventKind::ContainmentAction)
        } else {
            (LogLevel::Info, EventKind::Login)
        };
        let entry = SecurityLogEntry::new(level, event, None, Correlation::new())
            .with_created_at(base + Duration::seconds(i));
        store.append(&entry).await.unwrap();
    }

    // The fifteen newest entries hold only five critical ones
    let report = PredictiveEngine::with_window(store.clone(), 24, 15)
        .generate()
        .await;
    assert_eq!(report.health.status, HealthStatus::Healthy);

    let report = PredictiveEngine::new(store).generate().await;
    assert_eq!(report.health.status, HealthStatus::Critical);

    let aged = Arc::new(MemoryEventStore::new());
    for _ in 0..12 {
        let old = SecurityLogEntry::new(
            LogLevel::Critical,
            EventKind::SqlInjectionAttempt,
            None,
            Correlation::new(),
        )
        .with_created_at(Utc::now() - Duration::hours(30));
        aged.append(&old).await.unwrap();
    }
    let report = PredictiveEngine::new(aged).generate().await;
    assert_eq!(report.health.status, HealthStatus::Healthy);
    assert_eq!(report.insights.len(), 1);
}

#[tokio::test]
async fn test_read_failure_degrades_to_baseline() {
    let report = PredictiveEngine::new(Arc::new(BrokenEventStore)).generate().await;

    assert_eq!(report.insights.len(), 1);
    assert_eq!(report.insights[0].probability, 30);
    assert_eq!(report.health.status, HealthStatus::Healthy);
}

#[test]
fn test_jitter_only_touches_connection_gauge() {
    let counts = EventCounts {
        total: 12,
        ..Default::default()
    };

    let a = analyze(counts, 0);
    let b = analyze(counts, 24);
    assert_eq!(a.insights, b.insights);
    assert_eq!(a.health.status, b.health.status);
    assert_eq!(b.health.active_connections, 36);
    assert_eq!(classify_health(&counts, 3).active_connections, 15);
}
