use super::*;
use crate::security_log::{
    event_store::{EventStore, MemoryEventStore},
    log_entry::{Correlation, EventDetails, EventKind, LogLevel, SecurityLogEntry},
    security_logger::SecurityLogger,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Store whose writes always fail
pub(crate) struct BrokenEventStore;

#[async_trait]
impl EventStore for BrokenEventStore {
    async fn append(&self, _entry: &SecurityLogEntry) -> anyhow::Result<()> {
        Err(anyhow::anyhow!("disk full"))
    }

    async fn recent(
        &self,
        _since: DateTime<Utc>,
        _limit: usize,
    ) -> anyhow::Result<Vec<SecurityLogEntry>> {
        Err(anyhow::anyhow!("store offline"))
    }

    async fn range(
        &self,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
        _user_id: Option<&str>,
    ) -> anyhow::Result<Vec<SecurityLogEntry>> {
        Err(anyhow::anyhow!("store offline"))
    }

    async fn health_check(&self) -> anyhow::Result<()> {
        Err(anyhow::anyhow!("store offline"))
    }
}

#[tokio::test]
async fn test_logger_writes_one_row_per_call() {
    let store = Arc::new(MemoryEventStore::new());
    let logger = SecurityLogger::new(store.clone());

    let correlation = Correlation::new()
        .with_user_id("trader-42")
        .with_ip("203.0.113.9")
        .with_user_agent("curl/8.0");

    logger
        .warn(EventKind::FailedLogin, None, correlation.clone())
        .await;
    logger.warn(EventKind::FailedLogin, None, correlation).await;

    let entries = store.snapshot().await;
    assert_eq!(entries.len(), 2);
    assert_ne!(entries[0].id, entries[1].id);
    assert_eq!(entries[0].level, LogLevel::Warn);
    assert_eq!(entries[0].user_agent.as_deref(), Some("curl/8.0"));
}

#[tokio::test]
async fn test_level_variants() {
    let store = Arc::new(MemoryEventStore::new());
    let logger = SecurityLogger::new(store.clone());

    logger.info(EventKind::Login, None, Correlation::new()).await;
    logger
        .critical(EventKind::AuthCompromise, None, Correlation::new())
        .await;
    logger
        .audit(
            EventKind::AdminAction,
            Some(EventDetails::metadata().with("note", serde_json::json!("review"))),
            Correlation::new(),
        )
        .await;

    let levels: Vec<LogLevel> = store.snapshot().await.iter().map(|e| e.level).collect();
    assert_eq!(levels, vec![LogLevel::Info, LogLevel::Critical, LogLevel::Audit]);
}

#[tokio::test]
async fn test_logger_swallows_store_failures() {
    let logger = SecurityLogger::new(Arc::new(BrokenEventStore));

    // Must complete without panicking or returning an error
    logger
        .critical(
            "SQL_INJECTION_ATTEMPT",
            None,
            Correlation::new().with_ip("198.51.100.7"),
        )
        .await;
}

#[tokio::test]
async fn test_ad_hoc_event_kinds_are_stored_verbatim() {
    let store = Arc::new(MemoryEventStore::new());
    let logger = SecurityLogger::new(store.clone());

    logger
        .warn("CREDENTIAL_SPRAY_SIMULATION", None, Correlation::new())
        .await;

    let entries = store.snapshot().await;
    assert_eq!(entries[0].event.as_str(), "CREDENTIAL_SPRAY_SIMULATION");
}
