use crate::containment::{normalize_ip, ContainmentEngine, ContainmentState, Role};
use crate::error::{SocError, SocResult};
use crate::metrics::PLAYBOOK_RUNS;
use crate::playbooks::{
    incidents::{Incident, IncidentSeverity, IncidentStore},
    terminal::TerminalCommand,
};
use crate::rate_limiter::{user_identifier, RateLimiter};
use crate::security_log::{Correlation, EventDetails, EventKind, SecurityLogger};
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

pub const MANUAL_OVERRIDE_TITLE: &str = "Manual Terminal Override";
pub const INSIDER_REASON_PREFIX: &str = "[INSIDER THREAT] ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Playbook {
    IdentityCompromise,
    ApiAbuse,
    InsiderThreat,
    ManualOverride,
}

impl Playbook {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IdentityCompromise => "identity_compromise",
            Self::ApiAbuse => "api_abuse",
            Self::InsiderThreat => "insider_threat",
            Self::ManualOverride => "manual_override",
        }
    }
}

impl fmt::Display for Playbook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target fields shared by the playbook endpoints
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybookRequest {
    pub user_id: Option<String>,
    pub ip: Option<String>,
    pub reason: Option<String>,
    pub admin_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainmentAction {
    BlockIp,
    IsolateUser,
}

impl ContainmentAction {
    pub fn parse(action: &str) -> SocResult<Self> {
        match action.trim() {
            "BLOCK_IP" => Ok(Self::BlockIp),
            "ISOLATE_USER" => Ok(Self::IsolateUser),
            other => Err(SocError::validation(
                "action",
                format!("Unknown action '{}'", other),
            )),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContainmentActionRequest {
    pub action: String,
    pub target_id: String,
    pub incident_id: Option<Uuid>,
    pub reason: Option<String>,
}

/// Result of a successful playbook run
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybookOutcome {
    pub playbook: Playbook,
    pub target: String,
    pub incident_id: Option<Uuid>,
    pub steps: Vec<String>,
    pub message: String,
}

/// Runs named response sequences against the containment engine.
///
/// Multi-step playbooks are compensated: if a later step fails the earlier
/// ones are undone, and a failed undo is reported as partial containment.
pub struct PlaybookDispatcher {
    engine: Arc<ContainmentEngine>,
    logger: SecurityLogger,
    incidents: Arc<dyn IncidentStore>,
    rate_limiter: Arc<RateLimiter>,
    manual_incident: Mutex<Option<Uuid>>,
}

impl PlaybookDispatcher {
    pub fn new(
        engine: Arc<ContainmentEngine>,
        logger: SecurityLogger,
        incidents: Arc<dyn IncidentStore>,
        rate_limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            engine,
            logger,
            incidents,
            rate_limiter,
            manual_incident: Mutex::new(None),
        }
    }

    pub fn engine(&self) -> Arc<ContainmentEngine> {
        self.engine.clone()
    }

    /// Lock the account, then record the compromise
    pub async fn identity_compromise(&self, request: &PlaybookRequest) -> SocResult<PlaybookOutcome> {
        let result = self.run_identity_compromise(request).await;
        record_run(Playbook::IdentityCompromise, &result);
        result
    }

    async fn run_identity_compromise(&self, request: &PlaybookRequest) -> SocResult<PlaybookOutcome> {
        let user_id = required("userId", &request.user_id)?;
        let reason = required("reason", &request.reason)?;
        let admin_id = required("adminId", &request.admin_id)?;

        self.engine.lock_user(user_id, reason, admin_id).await?;

        self.logger
            .critical(
                EventKind::AuthCompromise,
                Some(
                    EventDetails::metadata()
                        .with("playbook", json!(Playbook::IdentityCompromise.as_str()))
                        .with("reason", json!(reason))
                        .with("adminId", json!(admin_id)),
                ),
                Correlation::new().with_user_id(user_id),
            )
            .await;

        Ok(PlaybookOutcome {
            playbook: Playbook::IdentityCompromise,
            target: user_id.to_string(),
            incident_id: None,
            steps: vec!["LOCK_USER".to_string()],
            message: format!("Account {} locked and compromise recorded", user_id),
        })
    }

    /// Block the address and/or exhaust the user's request window, then
    /// record the abuse
    pub async fn api_abuse(&self, request: &PlaybookRequest) -> SocResult<PlaybookOutcome> {
        let result = self.run_api_abuse(request).await;
        record_run(Playbook::ApiAbuse, &result);
        result
    }

    async fn run_api_abuse(&self, request: &PlaybookRequest) -> SocResult<PlaybookOutcome> {
        let ip = optional(&request.ip);
        let user_id = optional(&request.user_id);
        if ip.is_none() && user_id.is_none() {
            return Err(SocError::validation("target", "userId or ip is required"));
        }
        let reason = required("reason", &request.reason)?;
        let admin_id = required("adminId", &request.admin_id)?;
        let ip = ip.map(normalize_ip).transpose()?;

        let mut steps = Vec::new();
        if let Some(ip) = &ip {
            self.engine.block_ip(ip, None, Some(reason)).await?;
            steps.push("BLOCK_IP".to_string());
        }
        if let Some(user_id) = user_id {
            self.rate_limiter
                .exhaust(&user_identifier(user_id), self.rate_limiter.default_window_ms())
                .await;
            steps.push("THROTTLE_USER".to_string());
        }

        let mut correlation = Correlation::new();
        if let Some(ip) = &ip {
            correlation = correlation.with_ip(ip.as_str());
        }
        if let Some(user_id) = user_id {
            correlation = correlation.with_user_id(user_id);
        }

        self.logger
            .warn(
                EventKind::ApiAbuse,
                Some(
                    EventDetails::metadata()
                        .with("playbook", json!(Playbook::ApiAbuse.as_str()))
                        .with("reason", json!(reason))
                        .with("adminId", json!(admin_id))
                        .with("actions", json!(steps)),
                ),
                correlation,
            )
            .await;

        let target = ip
            .clone()
            .or_else(|| user_id.map(str::to_string))
            .unwrap_or_default();

        Ok(PlaybookOutcome {
            playbook: Playbook::ApiAbuse,
            message: format!("API abuse contained for {} ({})", target, steps.join(", ")),
            target,
            incident_id: None,
            steps,
        })
    }

    /// Lock with a prefixed reason, demote to the least privileged role,
    /// then record the threat
    pub async fn insider_threat(&self, request: &PlaybookRequest) -> SocResult<PlaybookOutcome> {
        let result = self.run_insider_threat(request).await;
        record_run(Playbook::InsiderThreat, &result);
        result
    }

    async fn run_insider_threat(&self, request: &PlaybookRequest) -> SocResult<PlaybookOutcome> {
        let user_id = required("userId", &request.user_id)?;
        let reason = required("reason", &request.reason)?;
        let admin_id = required("adminId", &request.admin_id)?;

        // Captured so a failed demotion can put the account back
        let prior_state = self.engine.capture_state(user_id, "LOCK_USER").await?;
        let prefixed = format!("{}{}", INSIDER_REASON_PREFIX, reason);

        self.engine.lock_user(user_id, &prefixed, admin_id).await?;

        let previous_role = match self
            .engine
            .demote_user(user_id, Role::least_privileged(), admin_id)
            .await
        {
            Ok(role) => role,
            Err(e) => {
                return Err(self
                    .compensate_lock(Playbook::InsiderThreat, user_id, prior_state, "DEMOTE_ROLE", e)
                    .await)
            }
        };

        self.logger
            .critical(
                EventKind::InsiderThreat,
                Some(
                    EventDetails::metadata()
                        .with("playbook", json!(Playbook::InsiderThreat.as_str()))
                        .with("reason", json!(prefixed))
                        .with("adminId", json!(admin_id))
                        .with("previousRole", json!(previous_role))
                        .with("newRole", json!(Role::least_privileged())),
                ),
                Correlation::new().with_user_id(user_id),
            )
            .await;

        Ok(PlaybookOutcome {
            playbook: Playbook::InsiderThreat,
            target: user_id.to_string(),
            incident_id: None,
            steps: vec!["LOCK_USER".to_string(), "DEMOTE_ROLE".to_string()],
            message: format!("Account {} locked and demoted", user_id),
        })
    }

    /// Entry point for the containment action endpoint.
    ///
    /// Without an incident id the action is filed under the shared manual
    /// override incident.
    pub async fn containment_action(
        &self,
        request: &ContainmentActionRequest,
    ) -> SocResult<PlaybookOutcome> {
        let result = self.run_containment_action(request).await;
        record_run(Playbook::ManualOverride, &result);
        result
    }

    /// Execute an operator terminal command
    pub async fn terminal(&self, command: &str) -> SocResult<PlaybookOutcome> {
        let result = match TerminalCommand::parse(command) {
            Ok(TerminalCommand::BlockIp(ip)) => {
                self.run_containment(ContainmentAction::BlockIp, &ip, None, None)
                    .await
            }
            Ok(TerminalCommand::IsolateUser(user_id)) => {
                self.run_containment(ContainmentAction::IsolateUser, &user_id, None, None)
                    .await
            }
            Err(e) => Err(e),
        };
        record_run(Playbook::ManualOverride, &result);
        result
    }

    async fn run_containment_action(
        &self,
        request: &ContainmentActionRequest,
    ) -> SocResult<PlaybookOutcome> {
        let action = ContainmentAction::parse(&request.action)?;
        self.run_containment(
            action,
            &request.target_id,
            request.incident_id,
            optional(&request.reason),
        )
        .await
    }

    async fn run_containment(
        &self,
        action: ContainmentAction,
        target: &str,
        incident_id: Option<Uuid>,
        reason: Option<&str>,
    ) -> SocResult<PlaybookOutcome> {
        let target = target.trim();
        if target.is_empty() {
            return Err(SocError::validation("targetId", "targetId is required"));
        }

        // Check the target before an incident can be created for it
        let target = match action {
            ContainmentAction::BlockIp => normalize_ip(target)?,
            ContainmentAction::IsolateUser => {
                self.engine.containment_state(target).await?;
                target.to_string()
            }
        };

        let incident_id = match incident_id {
            Some(id) => self.existing_incident(id).await?,
            None => self.manual_incident().await?,
        };
        let reason = reason
            .map(str::to_string)
            .unwrap_or_else(|| format!("Containment under incident {}", incident_id));

        let (step, message) = match action {
            ContainmentAction::BlockIp => {
                self.engine
                    .block_ip(&target, Some(incident_id), Some(&reason))
                    .await?;
                ("BLOCK_IP", format!("IP {} blocked", target))
            }
            ContainmentAction::IsolateUser => {
                self.engine
                    .isolate_account(&target, incident_id, &reason)
                    .await?;
                ("ISOLATE_ACCOUNT", format!("User {} isolated", target))
            }
        };

        info!(target = %target, step = step, incident_id = %incident_id, "Containment action executed");

        Ok(PlaybookOutcome {
            playbook: Playbook::ManualOverride,
            target,
            incident_id: Some(incident_id),
            steps: vec![step.to_string()],
            message: format!("{} (incident {})", message, incident_id),
        })
    }

    async fn existing_incident(&self, id: Uuid) -> SocResult<Uuid> {
        self.incidents
            .get(id)
            .await
            .map_err(|e| SocError::persistence("get_incident", e))?
            .map(|incident| incident.id)
            .ok_or_else(|| SocError::not_found("incident", id.to_string()))
    }

    /// Id of the shared manual override incident, created on first use.
    ///
    /// The lock is held across lookup and create so concurrent callers end up
    /// with the same incident.
    pub async fn manual_incident(&self) -> SocResult<Uuid> {
        let mut cached = self.manual_incident.lock().await;
        if let Some(id) = *cached {
            return Ok(id);
        }

        let existing = self
            .incidents
            .find_by_title(MANUAL_OVERRIDE_TITLE)
            .await
            .map_err(|e| SocError::persistence("find_incident", e))?;

        let incident = match existing {
            Some(incident) => incident,
            None => {
                let incident = self
                    .incidents
                    .create(Incident::open(MANUAL_OVERRIDE_TITLE, IncidentSeverity::High))
                    .await
                    .map_err(|e| SocError::persistence("create_incident", e))?;
                info!(incident_id = %incident.id, "Created manual override incident");
                incident
            }
        };

        *cached = Some(incident.id);
        Ok(incident.id)
    }

    /// Undo a lock after a later step failed.
    ///
    /// Returns the error to hand back: the original one when the undo worked,
    /// `PartialContainment` when it did not.
    async fn compensate_lock(
        &self,
        playbook: Playbook,
        user_id: &str,
        prior_state: ContainmentState,
        failed_step: &str,
        cause: SocError,
    ) -> SocError {
        warn!(
            playbook = %playbook,
            user_id = %user_id,
            failed_step = failed_step,
            error = %cause,
            "Playbook step failed, rolling back"
        );

        match self.engine.restore_containment(user_id, prior_state).await {
            Ok(()) => cause,
            Err(rollback_error) => {
                error!(
                    playbook = %playbook,
                    user_id = %user_id,
                    error = %rollback_error,
                    "Rollback failed, account left partially contained"
                );

                self.logger
                    .critical(
                        EventKind::SystemError,
                        Some(
                            EventDetails::metadata()
                                .with("playbook", json!(playbook.as_str()))
                                .with("status", json!("PARTIALLY_CONTAINED"))
                                .with("completed", json!(["LOCK_USER"]))
                                .with("failedStep", json!(failed_step))
                                .with("error", json!(cause.to_string()))
                                .with("rollbackError", json!(rollback_error.to_string())),
                        ),
                        Correlation::new().with_user_id(user_id),
                    )
                    .await;

                SocError::PartialContainment {
                    target: user_id.to_string(),
                    completed: vec!["LOCK_USER".to_string()],
                    failed_step: failed_step.to_string(),
                }
            }
        }
    }
}

fn record_run<T>(playbook: Playbook, result: &SocResult<T>) {
    let outcome = match result {
        Ok(_) => "success",
        Err(e) if e.is_validation() => "rejected",
        Err(_) => "failed",
    };
    PLAYBOOK_RUNS
        .with_label_values(&[playbook.as_str(), outcome])
        .inc();
}

fn optional(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn required<'a>(field: &str, value: &'a Option<String>) -> SocResult<&'a str> {
    optional(value).ok_or_else(|| SocError::validation(field, format!("{} is required", field)))
}
