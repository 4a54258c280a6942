use crate::metrics::{SECURITY_LOG_FAILURES, SECURITY_LOG_WRITES};
use crate::security_log::{
    event_store::EventStore,
    log_entry::{Correlation, EventDetails, EventKind, LogLevel, SecurityLogEntry},
};
use std::sync::Arc;
use tracing::{debug, error};

/// Typed sink for security events.
///
/// Writing never fails from the caller's point of view: a store error is
/// reported on the diagnostic channel and dropped, so instrumentation cannot
/// abort the operation it instruments.
#[derive(Clone)]
pub struct SecurityLogger {
    store: Arc<dyn EventStore>,
}

impl SecurityLogger {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> Arc<dyn EventStore> {
        self.store.clone()
    }

    pub async fn log(
        &self,
        level: LogLevel,
        event: impl Into<EventKind>,
        details: Option<EventDetails>,
        correlation: Correlation,
    ) {
        let entry = SecurityLogEntry::new(level, event.into(), details.as_ref(), correlation);

        match self.store.append(&entry).await {
            Ok(()) => {
                SECURITY_LOG_WRITES.inc();
                debug!(
                    entry_id = %entry.id,
                    level = %entry.level,
                    event = %entry.event,
                    "Security event logged"
                );
            }
            Err(e) => {
                SECURITY_LOG_FAILURES.inc();
                error!(
                    entry_id = %entry.id,
                    level = %entry.level,
                    event = %entry.event,
                    error = %e,
                    "Failed to write security log entry"
                );
            }
        }
    }

    pub async fn info(
        &self,
        event: impl Into<EventKind>,
        details: Option<EventDetails>,
        correlation: Correlation,
    ) {
        self.log(LogLevel::Info, event, details, correlation).await
    }

    pub async fn warn(
        &self,
        event: impl Into<EventKind>,
        details: Option<EventDetails>,
        correlation: Correlation,
    ) {
        self.log(LogLevel::Warn, event, details, correlation).await
    }

    pub async fn critical(
        &self,
        event: impl Into<EventKind>,
        details: Option<EventDetails>,
        correlation: Correlation,
    ) {
        self.log(LogLevel::Critical, event, details, correlation).await
    }

    pub async fn audit(
        &self,
        event: impl Into<EventKind>,
        details: Option<EventDetails>,
        correlation: Correlation,
    ) {
        self.log(LogLevel::Audit, event, details, correlation).await
    }
}
