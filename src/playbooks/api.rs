use crate::auth::Principal;
use crate::error::SocError;
use crate::playbooks::dispatcher::{
    ContainmentActionRequest, PlaybookDispatcher, PlaybookOutcome, PlaybookRequest,
};
use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::post,
    Extension, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybookResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incident_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainmentResponse {
    pub status: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incident_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct TerminalRequest {
    #[serde(default)]
    pub command: String,
}

pub fn create_playbook_router(dispatcher: Arc<PlaybookDispatcher>) -> Router {
    Router::new()
        .route("/v1/soc/containment", post(containment_action))
        .route(
            "/v1/soc/playbooks/identity-compromise",
            post(identity_compromise),
        )
        .route("/v1/soc/playbooks/api-abuse", post(api_abuse))
        .route("/v1/soc/playbooks/insider-threat", post(insider_threat))
        .route("/v1/soc/terminal", post(terminal))
        .with_state(dispatcher)
}

/// Body `adminId` wins; otherwise the authenticated principal acts
fn with_actor(mut request: PlaybookRequest, principal: Option<Extension<Principal>>) -> PlaybookRequest {
    let missing = request
        .admin_id
        .as_deref()
        .map_or(true, |id| id.trim().is_empty());
    if missing {
        request.admin_id = principal.map(|Extension(p)| p.admin_id);
    }
    request
}

fn playbook_reply(
    result: Result<PlaybookOutcome, SocError>,
) -> (StatusCode, Json<PlaybookResponse>) {
    match result {
        Ok(outcome) => (
            StatusCode::OK,
            Json(PlaybookResponse {
                success: true,
                message: outcome.message,
                incident_id: outcome.incident_id,
            }),
        ),
        Err(e) => {
            report(&e);
            (
                e.status_code(),
                Json(PlaybookResponse {
                    success: false,
                    message: e.public_message(),
                    incident_id: None,
                }),
            )
        }
    }
}

fn report(error: &SocError) {
    if error.is_validation() {
        tracing::debug!(error = %error, "Playbook request rejected");
    } else {
        tracing::error!(error = %error, kind = error.kind(), "Playbook execution failed");
    }
}

async fn identity_compromise(
    State(dispatcher): State<Arc<PlaybookDispatcher>>,
    principal: Option<Extension<Principal>>,
    Json(request): Json<PlaybookRequest>,
) -> (StatusCode, Json<PlaybookResponse>) {
    let request = with_actor(request, principal);
    playbook_reply(dispatcher.identity_compromise(&request).await)
}

async fn api_abuse(
    State(dispatcher): State<Arc<PlaybookDispatcher>>,
    principal: Option<Extension<Principal>>,
    Json(request): Json<PlaybookRequest>,
) -> (StatusCode, Json<PlaybookResponse>) {
    let request = with_actor(request, principal);
    playbook_reply(dispatcher.api_abuse(&request).await)
}

async fn insider_threat(
    State(dispatcher): State<Arc<PlaybookDispatcher>>,
    principal: Option<Extension<Principal>>,
    Json(request): Json<PlaybookRequest>,
) -> (StatusCode, Json<PlaybookResponse>) {
    let request = with_actor(request, principal);
    playbook_reply(dispatcher.insider_threat(&request).await)
}

async fn terminal(
    State(dispatcher): State<Arc<PlaybookDispatcher>>,
    principal: Option<Extension<Principal>>,
    Json(request): Json<TerminalRequest>,
) -> (StatusCode, Json<PlaybookResponse>) {
    let actor = principal.map(|Extension(p)| p.admin_id);
    tracing::info!(actor = ?actor, command = %request.command, "Terminal command received");
    playbook_reply(dispatcher.terminal(&request.command).await)
}

async fn containment_action(
    State(dispatcher): State<Arc<PlaybookDispatcher>>,
    Json(request): Json<ContainmentActionRequest>,
) -> (StatusCode, Json<ContainmentResponse>) {
    match dispatcher.containment_action(&request).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(ContainmentResponse {
                status: "success",
                message: outcome.message,
                incident_id: outcome.incident_id,
            }),
        ),
        Err(e) => {
            report(&e);
            (
                e.status_code(),
                Json(ContainmentResponse {
                    status: "error",
                    message: e.public_message(),
                    incident_id: None,
                }),
            )
        }
    }
}
