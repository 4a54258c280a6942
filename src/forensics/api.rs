use crate::auth::Principal;
use crate::error::{SocError, SocResult};
use crate::forensics::exporter::{ChainVerification, ForensicExportReport, ForensicsExporter};
use crate::security_log::{Correlation, EventDetails, EventKind, ExportDetails, SecurityLogger};
use axum::{
    extract::{Query, State},
    response::Json,
    routing::{get, post},
    Extension, Router,
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use std::sync::Arc;

/// Longest look-back a single export may cover
pub const MAX_EXPORT_HOURS: i64 = 24 * 90;

#[derive(Clone)]
pub struct ForensicsState {
    pub exporter: Arc<ForensicsExporter>,
    pub logger: SecurityLogger,
    pub default_hours: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportQuery {
    pub user_id: Option<String>,
    pub hours: Option<i64>,
}

pub fn create_forensics_router(state: ForensicsState) -> Router {
    Router::new()
        .route("/v1/soc/forensics/export", get(export_logs))
        .route("/v1/soc/forensics/verify", post(verify_report))
        .with_state(state)
}

async fn export_logs(
    State(state): State<ForensicsState>,
    principal: Option<Extension<Principal>>,
    Query(query): Query<ExportQuery>,
) -> SocResult<Json<ForensicExportReport>> {
    let hours = query.hours.unwrap_or(state.default_hours);
    if hours <= 0 || hours > MAX_EXPORT_HOURS {
        return Err(SocError::validation(
            "hours",
            format!("hours must be between 1 and {}", MAX_EXPORT_HOURS),
        ));
    }

    let user_id = query
        .user_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty());
    let end = Utc::now();
    let start = end - Duration::hours(hours);

    let report = state.exporter.export(start, end, user_id).await?;

    let requested_by = principal
        .map(|Extension(p)| p.admin_id)
        .unwrap_or_else(|| "anonymous".to_string());

    state
        .logger
        .audit(
            EventKind::ForensicExport,
            Some(EventDetails::Export(ExportDetails {
                requested_by: requested_by.clone(),
                target_user: user_id.map(str::to_string),
                start,
                end,
                record_count: report.metadata.record_count,
            })),
            Correlation::new().with_user_id(requested_by),
        )
        .await;

    Ok(Json(report))
}

async fn verify_report(
    State(state): State<ForensicsState>,
    Json(report): Json<ForensicExportReport>,
) -> SocResult<Json<ChainVerification>> {
    Ok(Json(state.exporter.verify(&report)?))
}
