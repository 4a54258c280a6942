use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Lock state persisted on an account.
///
/// `lock_reason` is `Some` exactly when `locked` is true; the constructors are
/// the only way this type is built inside the crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ContainmentState {
    pub locked: bool,
    pub lock_reason: Option<String>,
}

impl ContainmentState {
    pub fn unlocked() -> Self {
        Self {
            locked: false,
            lock_reason: None,
        }
    }

    pub fn locked(reason: impl Into<String>) -> Self {
        Self {
            locked: true,
            lock_reason: Some(reason.into()),
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.locked == self.lock_reason.is_some()
    }
}

/// Marketplace roles, most to least privileged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Moderator,
    Trader,
    Restricted,
}

impl Role {
    pub fn least_privileged() -> Self {
        Self::Restricted
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "ADMIN" => Some(Self::Admin),
            "MODERATOR" => Some(Self::Moderator),
            "TRADER" => Some(Self::Trader),
            "RESTRICTED" => Some(Self::Restricted),
            _ => None,
        }
    }
}

/// Account lookup owned by the marketplace.
///
/// `Ok(None)` means the account does not exist; `Err` is a storage failure.
#[async_trait]
pub trait AccountRegistry: Send + Sync {
    async fn containment_state(&self, user_id: &str) -> Result<Option<ContainmentState>>;
    async fn set_containment(&self, user_id: &str, state: ContainmentState) -> Result<()>;
    async fn role(&self, user_id: &str) -> Result<Option<Role>>;
    async fn set_role(&self, user_id: &str, role: Role) -> Result<()>;
}

#[derive(Debug, Clone)]
struct AccountRecord {
    state: ContainmentState,
    role: Role,
}

#[derive(Default)]
pub struct MemoryAccountRegistry {
    accounts: RwLock<HashMap<String, AccountRecord>>,
}

impl MemoryAccountRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `userId:ROLE` entries; malformed ones are skipped with a warning
    pub async fn seed(&self, entries: &[String]) -> usize {
        let mut loaded = 0;
        for entry in entries {
            match entry.split_once(':').and_then(|(id, role)| Some((id.trim(), Role::parse(role)?))) {
                Some((user_id, role)) if !user_id.is_empty() => {
                    self.insert_account(user_id, role).await;
                    loaded += 1;
                }
                _ => tracing::warn!(entry = %entry, "Skipping malformed account seed entry"),
            }
        }
        loaded
    }

    pub async fn insert_account(&self, user_id: impl Into<String>, role: Role) {
        self.accounts.write().await.insert(
            user_id.into(),
            AccountRecord {
                state: ContainmentState::unlocked(),
                role,
            },
        );
    }
}

#[async_trait]
impl AccountRegistry for MemoryAccountRegistry {
    async fn containment_state(&self, user_id: &str) -> Result<Option<ContainmentState>> {
        Ok(self
            .accounts
            .read()
            .await
            .get(user_id)
            .map(|record| record.state.clone()))
    }

    async fn set_containment(&self, user_id: &str, state: ContainmentState) -> Result<()> {
        let mut accounts = self.accounts.write().await;
        let record = accounts
            .get_mut(user_id)
            .ok_or_else(|| anyhow::anyhow!("Account {} disappeared during update", user_id))?;
        record.state = state;
        Ok(())
    }

    async fn role(&self, user_id: &str) -> Result<Option<Role>> {
        Ok(self
            .accounts
            .read()
            .await
            .get(user_id)
            .map(|record| record.role))
    }

    async fn set_role(&self, user_id: &str, role: Role) -> Result<()> {
        let mut accounts = self.accounts.write().await;
        let record = accounts
            .get_mut(user_id)
            .ok_or_else(|| anyhow::anyhow!("Account {} disappeared during update", user_id))?;
        record.role = role;
        Ok(())
    }
}
