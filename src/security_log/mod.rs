pub mod api;
pub mod event_store;
pub mod log_entry;
pub mod security_logger;

#[cfg(test)]
pub(crate) mod tests;

pub use event_store::{EventStore, FileEventStore, MemoryEventStore, RedisEventStore};
pub use log_entry::{
    ContainmentDetails, Correlation, EventDetails, EventKind, ExportDetails, IngestDetails,
    LogLevel, SecurityLogEntry,
};
pub use security_logger::SecurityLogger;

use anyhow::Result;
use std::sync::Arc;

/// Build the event store selected by configuration
pub fn initialize_event_store(
    backend: &str,
    file_path: Option<String>,
    redis_url: Option<&str>,
) -> Result<Arc<dyn EventStore>> {
    let store: Arc<dyn EventStore> = match backend {
        "memory" => Arc::new(MemoryEventStore::new()),
        "file" => {
            let path = file_path.unwrap_or_else(|| "/var/log/scrapsoc/events.jsonl".to_string());
            Arc::new(FileEventStore::new(path)?)
        }
        "redis" => {
            let url = redis_url.ok_or_else(|| {
                anyhow::anyhow!("Redis URL required for Redis event store")
            })?;
            Arc::new(RedisEventStore::new(url)?)
        }
        _ => return Err(anyhow::anyhow!("Unsupported event store backend: {}", backend)),
    };

    Ok(store)
}
