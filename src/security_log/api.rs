use crate::error::{SocError, SocResult};
use crate::security_log::{
    log_entry::{Correlation, EventDetails, EventKind, IngestDetails, LogLevel},
    SecurityLogger,
};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub event_type: String,
    pub severity: String,
    pub source_ip: String,
    pub endpoint: String,
    pub payload: Option<serde_json::Value>,
    pub risk_score: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub status: &'static str,
    pub level: LogLevel,
    pub event: String,
}

pub fn create_ingest_router(logger: SecurityLogger) -> Router {
    Router::new()
        .route("/v1/soc/events", post(ingest_event))
        .with_state(logger)
}

impl IngestRequest {
    fn validate(&self) -> SocResult<LogLevel> {
        if self.event_type.trim().is_empty() {
            return Err(SocError::validation("event_type", "event_type is required"));
        }
        if self.source_ip.trim().is_empty() {
            return Err(SocError::validation("source_ip", "source_ip is required"));
        }
        if let Some(score) = self.risk_score {
            if !(0.0..=100.0).contains(&score) {
                return Err(SocError::validation(
                    "risk_score",
                    "risk_score must be between 0 and 100",
                ));
            }
        }
        LogLevel::from_severity(&self.severity).ok_or_else(|| {
            SocError::validation(
                "severity",
                format!("Unknown severity '{}'", self.severity),
            )
        })
    }
}

async fn ingest_event(
    State(logger): State<SecurityLogger>,
    headers: HeaderMap,
    Json(request): Json<IngestRequest>,
) -> SocResult<(StatusCode, Json<IngestResponse>)> {
    let level = request.validate()?;
    let event = EventKind::from(request.event_type.trim().to_ascii_uppercase());

    let mut correlation = Correlation::new().with_ip(request.source_ip.trim());
    if let Some(agent) = headers.get("user-agent").and_then(|v| v.to_str().ok()) {
        correlation = correlation.with_user_agent(agent);
    }

    let details = EventDetails::Ingest(IngestDetails {
        endpoint: request.endpoint,
        payload: request.payload,
        risk_score: request.risk_score,
    });

    logger
        .log(level, event.clone(), Some(details), correlation)
        .await;

    Ok((
        StatusCode::ACCEPTED,
        Json(IngestResponse {
            status: "accepted",
            level,
            event: event.to_string(),
        }),
    ))
}
