use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// A single row of the security log. Never mutated after it is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityLogEntry {
    pub id: Uuid,
    pub level: LogLevel,
    pub event: EventKind,
    pub user_id: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub details: Option<Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
    Info,
    Warn,
    Critical,
    Audit,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Critical => "CRITICAL",
            Self::Audit => "AUDIT",
        }
    }

    /// Map an external severity label onto a log level
    pub fn from_severity(severity: &str) -> Option<Self> {
        match severity.trim().to_ascii_lowercase().as_str() {
            "info" | "low" => Some(Self::Info),
            "warn" | "warning" | "medium" => Some(Self::Warn),
            "critical" | "high" => Some(Self::Critical),
            "audit" => Some(Self::Audit),
            _ => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Symbolic event kind. Unknown kinds round-trip through `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    Login,
    FailedLogin,
    Logout,
    ApiAbuse,
    AdminAction,
    SensitiveAccess,
    SystemError,
    ContainmentAction,
    AuthCompromise,
    InsiderThreat,
    SqlInjectionAttempt,
    ForensicExport,
    Other(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Login => "LOGIN",
            Self::FailedLogin => "FAILED_LOGIN",
            Self::Logout => "LOGOUT",
            Self::ApiAbuse => "API_ABUSE",
            Self::AdminAction => "ADMIN_ACTION",
            Self::SensitiveAccess => "SENSITIVE_ACCESS",
            Self::SystemError => "SYSTEM_ERROR",
            Self::ContainmentAction => "CONTAINMENT_ACTION",
            Self::AuthCompromise => "AUTH_COMPROMISE",
            Self::InsiderThreat => "INSIDER_THREAT",
            Self::SqlInjectionAttempt => "SQL_INJECTION_ATTEMPT",
            Self::ForensicExport => "FORENSIC_EXPORT",
            Self::Other(name) => name.as_str(),
        }
    }
}

impl From<String> for EventKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "LOGIN" => Self::Login,
            "FAILED_LOGIN" => Self::FailedLogin,
            "LOGOUT" => Self::Logout,
            "API_ABUSE" => Self::ApiAbuse,
            "ADMIN_ACTION" => Self::AdminAction,
            "SENSITIVE_ACCESS" => Self::SensitiveAccess,
            "SYSTEM_ERROR" => Self::SystemError,
            "CONTAINMENT_ACTION" => Self::ContainmentAction,
            "AUTH_COMPROMISE" => Self::AuthCompromise,
            "INSIDER_THREAT" => Self::InsiderThreat,
            "SQL_INJECTION_ATTEMPT" => Self::SqlInjectionAttempt,
            "FORENSIC_EXPORT" => Self::ForensicExport,
            _ => Self::Other(value),
        }
    }
}

impl From<&str> for EventKind {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Correlation fields attached to an entry
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Correlation {
    pub user_id: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl Correlation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

/// Structured payload for an entry.
///
/// Known payload shapes are typed; anything else goes through `Metadata` so new
/// event kinds do not need a schema change.
#[derive(Debug, Clone, PartialEq)]
pub enum EventDetails {
    Containment(ContainmentDetails),
    Ingest(IngestDetails),
    Export(ExportDetails),
    Error { operation: String, message: String },
    Metadata(Map<String, Value>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainmentDetails {
    pub action: String,
    pub target: String,
    pub reason: Option<String>,
    pub actor: Option<String>,
    pub incident_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestDetails {
    pub endpoint: String,
    pub payload: Option<Value>,
    pub risk_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDetails {
    pub requested_by: String,
    pub target_user: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub record_count: usize,
}

impl EventDetails {
    pub fn metadata() -> Self {
        Self::Metadata(Map::new())
    }

    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        if let Self::Metadata(map) = &mut self {
            map.insert(key.into(), value);
        }
        self
    }

    pub fn error(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Storage form of the payload
    pub fn to_value(&self) -> Value {
        let value = match self {
            Self::Containment(details) => serde_json::to_value(details),
            Self::Ingest(details) => serde_json::to_value(details),
            Self::Export(details) => serde_json::to_value(details),
            Self::Error { operation, message } => Ok(serde_json::json!({
                "operation": operation,
                "error": message,
            })),
            Self::Metadata(map) => Ok(Value::Object(map.clone())),
        };
        value.unwrap_or(Value::Null)
    }
}

impl SecurityLogEntry {
    pub fn new(
        level: LogLevel,
        event: EventKind,
        details: Option<&EventDetails>,
        correlation: Correlation,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            level,
            event,
            user_id: correlation.user_id,
            ip: correlation.ip,
            user_agent: correlation.user_agent,
            details: details.map(EventDetails::to_value),
            created_at: Utc::now(),
        }
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_round_trips_unknown_names() {
        let json = serde_json::to_string(&EventKind::from("PORT_SCAN")).unwrap();
        assert_eq!(json, "\"PORT_SCAN\"");

        let parsed: EventKind = serde_json::from_str("\"FAILED_LOGIN\"").unwrap();
        assert_eq!(parsed, EventKind::FailedLogin);
    }

    #[test]
    fn test_severity_mapping() {
        assert_eq!(LogLevel::from_severity("HIGH"), Some(LogLevel::Critical));
        assert_eq!(LogLevel::from_severity("medium"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::from_severity("audit"), Some(LogLevel::Audit));
        assert_eq!(LogLevel::from_severity("catastrophic"), None);
    }

    #[test]
    fn test_entry_serializes_camel_case() {
        let details = EventDetails::metadata().with("attempts", serde_json::json!(3));
        let entry = SecurityLogEntry::new(
            LogLevel::Warn,
            EventKind::FailedLogin,
            Some(&details),
            Correlation::new().with_user_id("u-1").with_ip("10.1.1.1"),
        );

        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["level"], "WARN");
        assert_eq!(value["event"], "FAILED_LOGIN");
        assert_eq!(value["userId"], "u-1");
        assert_eq!(value["details"]["attempts"], 3);
        assert!(value["createdAt"].is_string());
    }

    #[test]
    fn test_containment_details_storage_form() {
        let details = EventDetails::Containment(ContainmentDetails {
            action: "LOCK_USER".to_string(),
            target: "u-7".to_string(),
            reason: Some("stolen session".to_string()),
            actor: Some("admin-1".to_string()),
            incident_id: None,
        });

        let value = details.to_value();
        assert_eq!(value["action"], "LOCK_USER");
        assert_eq!(value["incidentId"], Value::Null);
    }
}
