use crate::containment::{
    accounts::{AccountRegistry, ContainmentState, Role},
    blocklist::IpBlocklist,
};
use crate::error::{SocError, SocResult};
use crate::metrics::CONTAINMENT_ACTIONS;
use crate::security_log::{
    ContainmentDetails, Correlation, EventDetails, EventKind, SecurityLogger,
};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

const LOCK_USER: &str = "LOCK_USER";
const UNLOCK_USER: &str = "UNLOCK_USER";
const BLOCK_IP: &str = "BLOCK_IP";
const UNBLOCK_IP: &str = "UNBLOCK_IP";
const ISOLATE_ACCOUNT: &str = "ISOLATE_ACCOUNT";
const DEMOTE_ROLE: &str = "DEMOTE_ROLE";
const RESTORE_CONTAINMENT: &str = "RESTORE_CONTAINMENT";
const RESTORE_ROLE: &str = "RESTORE_ROLE";

/// Applies account locks and address blocks and records every change in the
/// security log.
pub struct ContainmentEngine {
    accounts: Arc<dyn AccountRegistry>,
    blocklist: Arc<IpBlocklist>,
    logger: SecurityLogger,
}

impl ContainmentEngine {
    pub fn new(
        accounts: Arc<dyn AccountRegistry>,
        blocklist: Arc<IpBlocklist>,
        logger: SecurityLogger,
    ) -> Self {
        Self {
            accounts,
            blocklist,
            logger,
        }
    }

    pub fn blocklist(&self) -> Arc<IpBlocklist> {
        self.blocklist.clone()
    }

    pub async fn lock_user(
        &self,
        user_id: &str,
        reason: &str,
        actor_id: &str,
    ) -> SocResult<ContainmentState> {
        self.apply_lock(user_id, reason, LOCK_USER, Some(actor_id), None)
            .await
    }

    /// Lock tied to an incident so playbook runs can be traced back
    pub async fn isolate_account(
        &self,
        user_id: &str,
        incident_id: Uuid,
        reason: &str,
    ) -> SocResult<ContainmentState> {
        self.apply_lock(user_id, reason, ISOLATE_ACCOUNT, None, Some(incident_id))
            .await
    }

    pub async fn unlock_user(&self, user_id: &str, actor_id: &str) -> SocResult<ContainmentState> {
        require("userId", user_id)?;

        let state = match self.write_unlocked(user_id).await {
            Ok(state) => state,
            Err(e) => return Err(self.report_failure(UNLOCK_USER, user_id, e).await),
        };

        self.logger
            .warn(
                EventKind::AdminAction,
                Some(containment_details(UNLOCK_USER, user_id, None, Some(actor_id), None)),
                Correlation::new().with_user_id(user_id),
            )
            .await;

        CONTAINMENT_ACTIONS.with_label_values(&[UNLOCK_USER]).inc();
        info!(user_id = %user_id, actor = %actor_id, "Account unlocked");
        Ok(state)
    }

    /// Add an address to the process-wide block set.
    ///
    /// Returns `true` when the address was not blocked before.
    pub async fn block_ip(
        &self,
        ip: &str,
        incident_id: Option<Uuid>,
        reason: Option<&str>,
    ) -> SocResult<bool> {
        let ip = normalize_ip(ip)?;

        let newly_blocked = self
            .blocklist
            .block(&ip, incident_id, reason.map(str::to_string))
            .await;

        self.logger
            .critical(
                EventKind::ContainmentAction,
                Some(containment_details(BLOCK_IP, &ip, reason, None, incident_id)),
                Correlation::new().with_ip(ip.as_str()),
            )
            .await;

        CONTAINMENT_ACTIONS.with_label_values(&[BLOCK_IP]).inc();
        info!(ip = %ip, incident_id = ?incident_id, newly_blocked, "IP address blocked");
        Ok(newly_blocked)
    }

    pub async fn unblock_ip(&self, ip: &str, actor_id: &str) -> SocResult<bool> {
        let ip = normalize_ip(ip)?;
        let removed = self.blocklist.unblock(&ip).await;

        self.logger
            .warn(
                EventKind::AdminAction,
                Some(containment_details(UNBLOCK_IP, &ip, None, Some(actor_id), None)),
                Correlation::new().with_ip(ip.as_str()),
            )
            .await;

        CONTAINMENT_ACTIONS.with_label_values(&[UNBLOCK_IP]).inc();
        Ok(removed)
    }

    pub async fn is_blocked(&self, ip: &str) -> bool {
        match normalize_ip(ip) {
            Ok(ip) => self.blocklist.is_blocked(&ip).await,
            Err(_) => false,
        }
    }

    /// Move an account to `role`, returning the role it had before
    pub async fn demote_user(&self, user_id: &str, role: Role, actor_id: &str) -> SocResult<Role> {
        require("userId", user_id)?;

        let previous = self.set_role(user_id, role).await?;

        self.logger
            .audit(
                EventKind::AdminAction,
                Some(containment_details(
                    DEMOTE_ROLE,
                    user_id,
                    Some(&format!("{:?} -> {:?}", previous, role)),
                    Some(actor_id),
                    None,
                )),
                Correlation::new().with_user_id(user_id),
            )
            .await;

        CONTAINMENT_ACTIONS.with_label_values(&[DEMOTE_ROLE]).inc();
        Ok(previous)
    }

    pub async fn containment_state(&self, user_id: &str) -> SocResult<ContainmentState> {
        self.current_state(user_id).await
    }

    /// Read the state a multi-step playbook may need to restore. A failed
    /// read is recorded like a failure of `action` itself.
    pub(crate) async fn capture_state(
        &self,
        user_id: &str,
        action: &str,
    ) -> SocResult<ContainmentState> {
        match self.current_state(user_id).await {
            Ok(state) => Ok(state),
            Err(e) => Err(self.report_failure(action, user_id, e).await),
        }
    }

    /// Put back a state captured before a playbook started
    pub(crate) async fn restore_containment(
        &self,
        user_id: &str,
        state: ContainmentState,
    ) -> SocResult<()> {
        self.accounts
            .set_containment(user_id, state)
            .await
            .map_err(|e| SocError::persistence("restore_containment", e))?;

        self.logger
            .warn(
                EventKind::AdminAction,
                Some(containment_details(RESTORE_CONTAINMENT, user_id, None, None, None)),
                Correlation::new().with_user_id(user_id),
            )
            .await;
        Ok(())
    }

    pub(crate) async fn restore_role(&self, user_id: &str, role: Role) -> SocResult<()> {
        self.set_role(user_id, role).await?;

        self.logger
            .warn(
                EventKind::AdminAction,
                Some(containment_details(RESTORE_ROLE, user_id, None, None, None)),
                Correlation::new().with_user_id(user_id),
            )
            .await;
        Ok(())
    }

    async fn set_role(&self, user_id: &str, role: Role) -> SocResult<Role> {
        let previous = self
            .accounts
            .role(user_id)
            .await
            .map_err(|e| SocError::persistence("role", e))?
            .ok_or_else(|| SocError::not_found("account", user_id))?;

        self.accounts
            .set_role(user_id, role)
            .await
            .map_err(|e| SocError::persistence("set_role", e))?;

        Ok(previous)
    }

    async fn current_state(&self, user_id: &str) -> SocResult<ContainmentState> {
        self.accounts
            .containment_state(user_id)
            .await
            .map_err(|e| SocError::persistence("containment_state", e))?
            .ok_or_else(|| SocError::not_found("account", user_id))
    }

    async fn write_locked(&self, user_id: &str, reason: &str) -> SocResult<ContainmentState> {
        let current = self.current_state(user_id).await?;
        if current.locked {
            // Already contained: keep the original reason
            return Ok(current);
        }

        let state = ContainmentState::locked(reason);
        self.accounts
            .set_containment(user_id, state.clone())
            .await
            .map_err(|e| SocError::persistence("set_containment", e))?;
        Ok(state)
    }

    async fn write_unlocked(&self, user_id: &str) -> SocResult<ContainmentState> {
        self.current_state(user_id).await?;
        let state = ContainmentState::unlocked();
        self.accounts
            .set_containment(user_id, state.clone())
            .await
            .map_err(|e| SocError::persistence("set_containment", e))?;
        Ok(state)
    }

    async fn apply_lock(
        &self,
        user_id: &str,
        reason: &str,
        action: &'static str,
        actor_id: Option<&str>,
        incident_id: Option<Uuid>,
    ) -> SocResult<ContainmentState> {
        require("userId", user_id)?;
        require("reason", reason)?;

        let state = match self.write_locked(user_id, reason).await {
            Ok(state) => state,
            Err(e) => return Err(self.report_failure(action, user_id, e).await),
        };

        // Every call is recorded, including repeats on a locked account
        self.logger
            .critical(
                EventKind::ContainmentAction,
                Some(containment_details(action, user_id, Some(reason), actor_id, incident_id)),
                Correlation::new().with_user_id(user_id),
            )
            .await;

        CONTAINMENT_ACTIONS.with_label_values(&[action]).inc();
        info!(
            user_id = %user_id,
            action = action,
            incident_id = ?incident_id,
            "Account locked"
        );
        Ok(state)
    }

    async fn report_failure(&self, action: &str, user_id: &str, error: SocError) -> SocError {
        warn!(user_id = %user_id, action = action, error = %error, "Containment action failed");

        self.logger
            .critical(
                EventKind::SystemError,
                Some(EventDetails::error(action, error.to_string())),
                Correlation::new().with_user_id(user_id),
            )
            .await;

        error
    }
}

fn containment_details(
    action: &str,
    target: &str,
    reason: Option<&str>,
    actor: Option<&str>,
    incident_id: Option<Uuid>,
) -> EventDetails {
    EventDetails::Containment(ContainmentDetails {
        action: action.to_string(),
        target: target.to_string(),
        reason: reason.map(str::to_string),
        actor: actor.map(str::to_string),
        incident_id,
    })
}

fn require(field: &str, value: &str) -> SocResult<()> {
    if value.trim().is_empty() {
        return Err(SocError::validation(field, format!("{} is required", field)));
    }
    Ok(())
}

/// Canonical text form of an address, so `::ffff:...` variants and padding do
/// not slip past the block set
pub fn normalize_ip(ip: &str) -> SocResult<String> {
    let trimmed = ip.trim();
    if trimmed.is_empty() {
        return Err(SocError::validation("ip", "ip is required"));
    }
    trimmed
        .parse::<IpAddr>()
        .map(|addr| match addr {
            IpAddr::V6(v6) => v6
                .to_ipv4_mapped()
                .map(|v4| v4.to_string())
                .unwrap_or_else(|| v6.to_string()),
            IpAddr::V4(v4) => v4.to_string(),
        })
        .map_err(|_| SocError::validation("ip", format!("'{}' is not a valid IP address", trimmed)))
}
