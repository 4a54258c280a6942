use crate::containment::{
    accounts::{AccountRegistry, ContainmentState, MemoryAccountRegistry, Role},
    blocklist::IpBlocklist,
    containment_engine::ContainmentEngine,
};
use crate::error::SocError;
use crate::security_log::{EventKind, LogLevel, MemoryEventStore, SecurityLogger};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Registry wrapper that can be told to fail specific writes
pub(crate) struct FlakyAccountRegistry {
    inner: MemoryAccountRegistry,
    pub fail_set_containment: AtomicBool,
    pub fail_set_role: AtomicBool,
    pub fail_reads: AtomicBool,
    /// A failed role write also breaks later containment writes
    pub poison_on_role_failure: AtomicBool,
}

impl FlakyAccountRegistry {
    pub fn new() -> Self {
        Self {
            inner: MemoryAccountRegistry::new(),
            fail_set_containment: AtomicBool::new(false),
            fail_set_role: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
            poison_on_role_failure: AtomicBool::new(false),
        }
    }

    pub async fn insert_account(&self, user_id: &str, role: Role) {
        self.inner.insert_account(user_id, role).await;
    }
}

#[async_trait]
impl AccountRegistry for FlakyAccountRegistry {
    async fn containment_state(&self, user_id: &str) -> anyhow::Result<Option<ContainmentState>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("accounts replica unreachable"));
        }
        self.inner.containment_state(user_id).await
    }

    async fn set_containment(&self, user_id: &str, state: ContainmentState) -> anyhow::Result<()> {
        if self.fail_set_containment.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("accounts table locked"));
        }
        self.inner.set_containment(user_id, state).await
    }

    async fn role(&self, user_id: &str) -> anyhow::Result<Option<Role>> {
        self.inner.role(user_id).await
    }

    async fn set_role(&self, user_id: &str, role: Role) -> anyhow::Result<()> {
        if self.fail_set_role.load(Ordering::SeqCst) {
            if self.poison_on_role_failure.load(Ordering::SeqCst) {
                self.fail_set_containment.store(true, Ordering::SeqCst);
            }
            return Err(anyhow::anyhow!("roles table locked"));
        }
        self.inner.set_role(user_id, role).await
    }
}

struct Harness {
    engine: ContainmentEngine,
    accounts: Arc<FlakyAccountRegistry>,
    store: Arc<MemoryEventStore>,
}

async fn harness() -> Harness {
    let store = Arc::new(MemoryEventStore::new());
    let accounts = Arc::new(FlakyAccountRegistry::new());
    accounts.insert_account("trader-1", Role::Trader).await;

    let engine = ContainmentEngine::new(
        accounts.clone(),
        Arc::new(IpBlocklist::new()),
        SecurityLogger::new(store.clone()),
    );

    Harness {
        engine,
        accounts,
        store,
    }
}

#[tokio::test]
async fn test_lock_user_twice_appends_two_critical_entries() {
    let h = harness().await;

    let first = h
        .engine
        .lock_user("trader-1", "chargeback fraud", "admin-1")
        .await
        .unwrap();
    let second = h
        .engine
        .lock_user("trader-1", "chargeback fraud", "admin-1")
        .await
        .unwrap();

    assert!(first.locked);
    assert!(second.locked);
    assert_eq!(second.lock_reason.as_deref(), Some("chargeback fraud"));

    let entries = h.store.snapshot().await;
    let critical: Vec<_> = entries
        .iter()
        .filter(|e| e.level == LogLevel::Critical && e.event == EventKind::ContainmentAction)
        .collect();
    assert_eq!(critical.len(), 2);
    assert_eq!(critical[0].details.as_ref().unwrap()["action"], "LOCK_USER");
    assert_eq!(critical[0].details.as_ref().unwrap()["actor"], "admin-1");
}

#[tokio::test]
async fn test_relock_keeps_original_reason() {
    let h = harness().await;

    h.engine.lock_user("trader-1", "first", "admin-1").await.unwrap();
    let state = h.engine.lock_user("trader-1", "second", "admin-2").await.unwrap();

    assert_eq!(state.lock_reason.as_deref(), Some("first"));
    assert!(state.is_consistent());
}

#[tokio::test]
async fn test_unlock_clears_reason_and_logs_warn() {
    let h = harness().await;

    h.engine.lock_user("trader-1", "review", "admin-1").await.unwrap();
    let state = h.engine.unlock_user("trader-1", "admin-1").await.unwrap();

    assert_eq!(state, ContainmentState::unlocked());

    let entries = h.store.snapshot().await;
    let last = entries.last().unwrap();
    assert_eq!(last.level, LogLevel::Warn);
    assert_eq!(last.event, EventKind::AdminAction);
    assert_eq!(last.details.as_ref().unwrap()["action"], "UNLOCK_USER");
}

#[tokio::test]
async fn test_persistence_failure_is_logged_and_raised() {
    let h = harness().await;
    h.accounts.fail_set_containment.store(true, Ordering::SeqCst);

    let err = h
        .engine
        .lock_user("trader-1", "suspicious payout", "admin-1")
        .await
        .unwrap_err();
    assert!(matches!(err, SocError::Persistence { .. }));

    let entries = h.store.snapshot().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].event, EventKind::SystemError);
    assert_eq!(entries[0].details.as_ref().unwrap()["operation"], "LOCK_USER");
}

#[tokio::test]
async fn test_unknown_account_is_not_found() {
    let h = harness().await;

    let err = h
        .engine
        .unlock_user("nobody", "admin-1")
        .await
        .unwrap_err();
    assert!(matches!(err, SocError::NotFound { .. }));
}

#[tokio::test]
async fn test_missing_reason_is_rejected_without_side_effects() {
    let h = harness().await;

    let err = h.engine.lock_user("trader-1", "  ", "admin-1").await.unwrap_err();
    assert!(err.is_validation());
    assert!(h.store.is_empty().await);
    assert!(!h.engine.containment_state("trader-1").await.unwrap().locked);
}

#[tokio::test]
async fn test_block_ip_updates_gateway_set() {
    let h = harness().await;
    let incident = uuid::Uuid::new_v4();

    let newly = h
        .engine
        .block_ip("203.0.113.77", Some(incident), Some("scraping listings"))
        .await
        .unwrap();
    assert!(newly);
    assert!(h.engine.is_blocked("203.0.113.77").await);
    assert!(h.engine.is_blocked("::ffff:203.0.113.77").await);

    let entries = h.store.snapshot().await;
    assert_eq!(entries[0].level, LogLevel::Critical);
    assert_eq!(entries[0].ip.as_deref(), Some("203.0.113.77"));
    assert_eq!(
        entries[0].details.as_ref().unwrap()["incidentId"],
        incident.to_string()
    );

    assert!(h.engine.unblock_ip("203.0.113.77", "admin-1").await.unwrap());
    assert!(!h.engine.is_blocked("203.0.113.77").await);
}

#[tokio::test]
async fn test_block_ip_rejects_malformed_address() {
    let h = harness().await;

    let err = h.engine.block_ip("999.1.1.1", None, None).await.unwrap_err();
    assert!(err.is_validation());
    assert!(h.store.is_empty().await);
}

#[tokio::test]
async fn test_isolate_account_records_incident() {
    let h = harness().await;
    let incident = uuid::Uuid::new_v4();

    let state = h
        .engine
        .isolate_account("trader-1", incident, "playbook isolation")
        .await
        .unwrap();
    assert!(state.locked);

    let entries = h.store.snapshot().await;
    let details = entries[0].details.as_ref().unwrap();
    assert_eq!(details["action"], "ISOLATE_ACCOUNT");
    assert_eq!(details["incidentId"], incident.to_string());
}

#[tokio::test]
async fn test_demote_returns_previous_role() {
    let h = harness().await;

    let previous = h
        .engine
        .demote_user("trader-1", Role::Restricted, "admin-1")
        .await
        .unwrap();
    assert_eq!(previous, Role::Trader);
    assert_eq!(
        h.accounts.role("trader-1").await.unwrap(),
        Some(Role::Restricted)
    );
}
