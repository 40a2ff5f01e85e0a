//! API error surface.
//!
//! Registry errors map onto stable HTTP statuses and machine-readable codes
//! so presentation clients can branch without parsing messages.

use crate::registry::RegistryError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Registry(e) => match e {
                RegistryError::InvalidDuration { .. } | RegistryError::InvalidPayload(_) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR")
                }
                RegistryError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                RegistryError::NotRunning { .. } => (StatusCode::CONFLICT, "NOT_RUNNING"),
                RegistryError::ExecutorUnavailable(_) => {
                    (StatusCode::SERVICE_UNAVAILABLE, "EXECUTOR_UNAVAILABLE")
                }
                RegistryError::DispatchRejected(_) => {
                    (StatusCode::BAD_GATEWAY, "DISPATCH_REJECTED")
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = self.to_string();
        (status, Json(json!({ "error": message, "code": code }))).into_response()
    }
}
