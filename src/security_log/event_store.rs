use crate::security_log::log_entry::SecurityLogEntry;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tokio::fs;
use tokio::sync::RwLock;

/// Append-only contract over the security log.
///
/// Implementations never update or delete rows.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn append(&self, entry: &SecurityLogEntry) -> Result<()>;

    /// Up to `limit` entries created at or after `since`, newest first
    async fn recent(&self, since: DateTime<Utc>, limit: usize) -> Result<Vec<SecurityLogEntry>>;

    /// All entries with `created_at` in `[start, end]`, oldest first
    async fn range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        user_id: Option<&str>,
    ) -> Result<Vec<SecurityLogEntry>>;

    async fn health_check(&self) -> Result<()>;
}

fn sort_ascending(entries: &mut [SecurityLogEntry]) {
    entries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
}

fn take_newest(mut entries: Vec<SecurityLogEntry>, limit: usize) -> Vec<SecurityLogEntry> {
    entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    entries.truncate(limit);
    entries
}

/// In-process store, used for tests and single-node deployments
#[derive(Default)]
pub struct MemoryEventStore {
    entries: RwLock<Vec<SecurityLogEntry>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn snapshot(&self) -> Vec<SecurityLogEntry> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn append(&self, entry: &SecurityLogEntry) -> Result<()> {
        self.entries.write().await.push(entry.clone());
        Ok(())
    }

    async fn recent(&self, since: DateTime<Utc>, limit: usize) -> Result<Vec<SecurityLogEntry>> {
        let entries = self.entries.read().await;
        let matching = entries
            .iter()
            .filter(|e| e.created_at >= since)
            .cloned()
            .collect();
        Ok(take_newest(matching, limit))
    }

    async fn range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        user_id: Option<&str>,
    ) -> Result<Vec<SecurityLogEntry>> {
        let entries = self.entries.read().await;
        let mut matching: Vec<SecurityLogEntry> = entries
            .iter()
            .filter(|e| e.created_at >= start && e.created_at <= end)
            .filter(|e| user_id.map_or(true, |uid| e.user_id.as_deref() == Some(uid)))
            .cloned()
            .collect();
        sort_ascending(&mut matching);
        Ok(matching)
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// JSON-lines file, one entry per line
pub struct FileEventStore {
    file_path: String,
}

impl FileEventStore {
    pub fn new(file_path: String) -> Result<Self> {
        if let Some(parent) = Path::new(&file_path).parent() {
            std::fs::create_dir_all(parent)?;
        }

        Ok(Self { file_path })
    }

    async fn read_all(&self) -> Result<Vec<SecurityLogEntry>> {
        if !Path::new(&self.file_path).exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.file_path).await?;
        let mut entries = Vec::new();

        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            // A corrupt line must fail the read: silently skipping it would
            // hand the exporter a shortened chain.
            entries.push(serde_json::from_str::<SecurityLogEntry>(line)?);
        }

        Ok(entries)
    }
}

#[async_trait]
impl EventStore for FileEventStore {
    async fn append(&self, entry: &SecurityLogEntry) -> Result<()> {
        let line = format!("{}\n", serde_json::to_string(entry)?);

        let file_path = self.file_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&file_path)?;
            file.write_all(line.as_bytes())?;
            file.sync_all()?;
            Ok::<(), anyhow::Error>(())
        })
        .await??;

        Ok(())
    }

    async fn recent(&self, since: DateTime<Utc>, limit: usize) -> Result<Vec<SecurityLogEntry>> {
        let matching = self
            .read_all()
            .await?
            .into_iter()
            .filter(|e| e.created_at >= since)
            .collect();
        Ok(take_newest(matching, limit))
    }

    async fn range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        user_id: Option<&str>,
    ) -> Result<Vec<SecurityLogEntry>> {
        let mut matching: Vec<SecurityLogEntry> = self
            .read_all()
            .await?
            .into_iter()
            .filter(|e| e.created_at >= start && e.created_at <= end)
            .filter(|e| user_id.map_or(true, |uid| e.user_id.as_deref() == Some(uid)))
            .collect();
        sort_ascending(&mut matching);
        Ok(matching)
    }

    async fn health_check(&self) -> Result<()> {
        if let Some(parent) = Path::new(&self.file_path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                return Err(anyhow::anyhow!(
                    "Event log directory {} does not exist",
                    parent.display()
                ));
            }
        }
        Ok(())
    }
}

/// Redis-backed store: entry JSON under `soc:event:<id>`, indexed by
/// creation time in sorted sets.
pub struct RedisEventStore {
    client: redis::Client,
}

impl RedisEventStore {
    pub fn new(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    fn event_key(id: &str) -> String {
        format!("soc:event:{}", id)
    }

    fn global_index_key() -> &'static str {
        "soc:events"
    }

    fn user_index_key(user_id: &str) -> String {
        format!("soc:user:{}:events", user_id)
    }

    async fn load(
        &self,
        conn: &mut redis::aio::Connection,
        ids: Vec<String>,
    ) -> Result<Vec<SecurityLogEntry>> {
        let mut entries = Vec::with_capacity(ids.len());
        for id in ids {
            let json: Option<String> = conn.get(Self::event_key(&id)).await?;
            match json {
                Some(json) => entries.push(serde_json::from_str(&json)?),
                None => {
                    return Err(anyhow::anyhow!("Indexed event {} has no stored body", id));
                }
            }
        }
        Ok(entries)
    }
}

#[async_trait]
impl EventStore for RedisEventStore {
    async fn append(&self, entry: &SecurityLogEntry) -> Result<()> {
        let mut conn = self.client.get_async_connection().await?;

        let json = serde_json::to_string(entry)?;
        let id = entry.id.to_string();
        let score = entry.created_at.timestamp_millis();

        let mut pipe = redis::pipe();
        pipe.atomic()
            .set(Self::event_key(&id), &json)
            .zadd(Self::global_index_key(), &id, score);
        if let Some(user_id) = &entry.user_id {
            pipe.zadd(Self::user_index_key(user_id), &id, score);
        }
        pipe.query_async::<_, ()>(&mut conn).await?;

        Ok(())
    }

    async fn recent(&self, since: DateTime<Utc>, limit: usize) -> Result<Vec<SecurityLogEntry>> {
        let mut conn = self.client.get_async_connection().await?;

        let ids: Vec<String> = conn
            .zrevrangebyscore_limit(
                Self::global_index_key(),
                "+inf",
                since.timestamp_millis(),
                0,
                limit as isize,
            )
            .await?;

        let entries = self.load(&mut conn, ids).await?;
        Ok(take_newest(entries, limit))
    }

    async fn range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        user_id: Option<&str>,
    ) -> Result<Vec<SecurityLogEntry>> {
        let mut conn = self.client.get_async_connection().await?;

        let index = match user_id {
            Some(uid) => Self::user_index_key(uid),
            None => Self::global_index_key().to_string(),
        };

        let ids: Vec<String> = conn
            .zrangebyscore(&index, start.timestamp_millis(), end.timestamp_millis())
            .await?;

        let mut entries = self.load(&mut conn, ids).await?;
        sort_ascending(&mut entries);
        Ok(entries)
    }

    async fn health_check(&self) -> Result<()> {
        let mut conn = self.client.get_async_connection().await?;
        let response: String = redis::cmd("PING").query_async(&mut conn).await?;

        if response == "PONG" {
            Ok(())
        } else {
            Err(anyhow::anyhow!("Unexpected Redis response: {}", response))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security_log::log_entry::{Correlation, EventKind, LogLevel};
    use chrono::Duration;

    fn entry_at(event: EventKind, user: Option<&str>, at: DateTime<Utc>) -> SecurityLogEntry {
        let mut correlation = Correlation::new();
        if let Some(user) = user {
            correlation = correlation.with_user_id(user);
        }
        SecurityLogEntry::new(LogLevel::Info, event, None, correlation).with_created_at(at)
    }

    #[tokio::test]
    async fn test_memory_recent_is_newest_first_and_bounded() {
        let store = MemoryEventStore::new();
        let now = Utc::now();

        for minutes in [30, 10, 20, 5] {
            store
                .append(&entry_at(EventKind::Login, None, now - Duration::minutes(minutes)))
                .await
                .unwrap();
        }
        store
            .append(&entry_at(EventKind::Login, None, now - Duration::hours(30)))
            .await
            .unwrap();

        let recent = store.recent(now - Duration::hours(24), 3).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].created_at, now - Duration::minutes(5));
        assert_eq!(recent[2].created_at, now - Duration::minutes(20));
    }

    #[tokio::test]
    async fn test_memory_range_filters_user_and_sorts_ascending() {
        let store = MemoryEventStore::new();
        let now = Utc::now();

        store
            .append(&entry_at(EventKind::Logout, Some("u-1"), now - Duration::minutes(1)))
            .await
            .unwrap();
        store
            .append(&entry_at(EventKind::Login, Some("u-1"), now - Duration::minutes(9)))
            .await
            .unwrap();
        store
            .append(&entry_at(EventKind::Login, Some("u-2"), now - Duration::minutes(5)))
            .await
            .unwrap();

        let range = store
            .range(now - Duration::hours(1), now, Some("u-1"))
            .await
            .unwrap();
        assert_eq!(range.len(), 2);
        assert_eq!(range[0].event, EventKind::Login);
        assert_eq!(range[1].event, EventKind::Logout);
    }

    #[tokio::test]
    async fn test_file_store_appends_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("soc").join("events.jsonl");
        let store = FileEventStore::new(path.to_string_lossy().to_string()).unwrap();
        let now = Utc::now();

        assert!(store.recent(now - Duration::hours(1), 10).await.unwrap().is_empty());

        store
            .append(&entry_at(EventKind::FailedLogin, Some("u-3"), now - Duration::seconds(5)))
            .await
            .unwrap();
        store
            .append(&entry_at(EventKind::Login, Some("u-3"), now - Duration::seconds(1)))
            .await
            .unwrap();

        let range = store.range(now - Duration::minutes(1), now, None).await.unwrap();
        assert_eq!(range.len(), 2);
        assert_eq!(range[0].event, EventKind::FailedLogin);
        assert!(store.health_check().await.is_ok());
    }

    #[tokio::test]
    async fn test_file_store_rejects_corrupt_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        std::fs::write(&path, "{not json}\n").unwrap();

        let store = FileEventStore::new(path.to_string_lossy().to_string()).unwrap();
        let now = Utc::now();
        assert!(store.range(now - Duration::hours(1), now, None).await.is_err());
    }
}
