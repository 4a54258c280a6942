//! Error taxonomy for the SOC pipeline.
//!
//! Every containment, playbook and export operation returns a [`SocError`] so
//! callers can branch on the kind of failure instead of parsing messages.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SocError {
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    #[error("Persistence operation failed: {operation} - {source}")]
    Persistence {
        operation: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Resource not found: {resource} - {id}")]
    NotFound { resource: String, id: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Target {target} is partially contained: completed {completed:?}, failed at {failed_step}")]
    PartialContainment {
        target: String,
        completed: Vec<String>,
        failed_step: String,
    },
}

pub type SocResult<T> = Result<T, SocError>;

impl SocError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn persistence(operation: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Persistence {
            operation: operation.into(),
            source,
        }
    }

    pub fn not_found(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// HTTP status used when the error crosses the API boundary
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Persistence { .. }
            | Self::Configuration { .. }
            | Self::PartialContainment { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message that is safe to hand back to a client.
    ///
    /// Field-level validation messages are preserved; everything else is
    /// replaced with a generic message and the detail stays in the logs.
    pub fn public_message(&self) -> String {
        match self {
            Self::Validation { message, .. } => message.clone(),
            Self::NotFound { resource, .. } => format!("{} not found", resource),
            Self::PartialContainment { .. } => {
                "Containment partially applied; manual reconciliation required".to_string()
            }
            Self::Persistence { .. } | Self::Configuration { .. } => {
                "Internal error while processing the request".to_string()
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::Persistence { .. } => "persistence_error",
            Self::NotFound { .. } => "not_found",
            Self::Configuration { .. } => "configuration_error",
            Self::PartialContainment { .. } => "partial_containment",
        }
    }
}

impl IntoResponse for SocError {
    fn into_response(self) -> Response {
        if !self.is_validation() {
            tracing::error!(error = %self, kind = self.kind(), "Request failed");
        }

        let body = json!({
            "error": self.kind(),
            "message": self.public_message(),
        });

        (self.status_code(), Json(body)).into_response()
    }
}
