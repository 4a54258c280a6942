use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentStatus {
    Open,
    Contained,
    Closed,
}

/// Incident record that containment actions are filed under
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    pub id: Uuid,
    pub title: String,
    pub severity: IncidentSeverity,
    pub status: IncidentStatus,
    pub created_at: DateTime<Utc>,
}

impl Incident {
    pub fn open(title: impl Into<String>, severity: IncidentSeverity) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            severity,
            status: IncidentStatus::Open,
            created_at: Utc::now(),
        }
    }
}

/// Incident registry owned by the wider case-management system
#[async_trait]
pub trait IncidentStore: Send + Sync {
    async fn find_by_title(&self, title: &str) -> Result<Option<Incident>>;
    async fn create(&self, incident: Incident) -> Result<Incident>;
    async fn get(&self, id: Uuid) -> Result<Option<Incident>>;
}

#[derive(Default)]
pub struct MemoryIncidentStore {
    incidents: RwLock<HashMap<Uuid, Incident>>,
}

impl MemoryIncidentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.incidents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.incidents.read().await.is_empty()
    }
}

#[async_trait]
impl IncidentStore for MemoryIncidentStore {
    async fn find_by_title(&self, title: &str) -> Result<Option<Incident>> {
        let incidents = self.incidents.read().await;
        // Oldest match wins so repeated lookups are stable
        Ok(incidents
            .values()
            .filter(|incident| incident.title == title)
            .min_by_key(|incident| incident.created_at)
            .cloned())
    }

    async fn create(&self, incident: Incident) -> Result<Incident> {
        self.incidents
            .write()
            .await
            .insert(incident.id, incident.clone());
        Ok(incident)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Incident>> {
        Ok(self.incidents.read().await.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_find_by_title() {
        let store = MemoryIncidentStore::new();
        let created = store
            .create(Incident::open("Credential leak", IncidentSeverity::High))
            .await
            .unwrap();

        let found = store.find_by_title("Credential leak").await.unwrap();
        assert_eq!(found.map(|i| i.id), Some(created.id));
        assert!(store.find_by_title("Other").await.unwrap().is_none());
        assert_eq!(store.get(created.id).await.unwrap().unwrap().status, IncidentStatus::Open);
    }
}
