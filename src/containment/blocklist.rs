use crate::metrics::BLOCKED_IPS;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockedAddress {
    pub ip: String,
    pub incident_id: Option<Uuid>,
    pub reason: Option<String>,
    pub blocked_at: DateTime<Utc>,
}

/// Process-wide set of blocked client addresses.
///
/// Lives in memory only and starts empty on every boot, unlike account lock
/// state which the account registry persists.
#[derive(Default)]
pub struct IpBlocklist {
    blocked: RwLock<HashMap<String, BlockedAddress>>,
}

impl IpBlocklist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when the address was not already blocked
    pub async fn block(
        &self,
        ip: &str,
        incident_id: Option<Uuid>,
        reason: Option<String>,
    ) -> bool {
        let mut blocked = self.blocked.write().await;
        let newly_blocked = !blocked.contains_key(ip);
        blocked.insert(
            ip.to_string(),
            BlockedAddress {
                ip: ip.to_string(),
                incident_id,
                reason,
                blocked_at: Utc::now(),
            },
        );
        BLOCKED_IPS.set(blocked.len() as i64);
        newly_blocked
    }

    pub async fn unblock(&self, ip: &str) -> bool {
        let mut blocked = self.blocked.write().await;
        let removed = blocked.remove(ip).is_some();
        BLOCKED_IPS.set(blocked.len() as i64);
        removed
    }

    pub async fn is_blocked(&self, ip: &str) -> bool {
        self.blocked.read().await.contains_key(ip)
    }

    pub async fn list(&self) -> Vec<BlockedAddress> {
        let mut list: Vec<BlockedAddress> = self.blocked.read().await.values().cloned().collect();
        list.sort_by(|a, b| b.blocked_at.cmp(&a.blocked_at));
        list
    }

    pub async fn clear(&self) {
        self.blocked.write().await.clear();
        BLOCKED_IPS.set(0);
    }
}
