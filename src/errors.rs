use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::services::grouping::ConflictReport;

fn current_request_id() -> Option<String> {
    crate::tracing::current_request_id().map(|rid| rid.as_str().to_string())
}

/// Standard error body returned by every endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Conflict")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Additional error details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Flat list of validation messages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
    /// Unmergeable duplicate groups found while grouping items
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflicts: Option<ConflictReport>,
    /// Unique request identifier for support and debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// ISO 8601 timestamp when error occurred
    pub timestamp: String,
}

impl ErrorResponse {
    fn new(status: StatusCode, message: String) -> Self {
        Self {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message,
            details: None,
            errors: None,
            conflicts: None,
            request_id: current_request_id(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation failed with {} error(s)", .0.len())]
    ValidationFailed(Vec<String>),

    #[error("Item conflict: {} duplicate group(s) cannot be merged", .0.groups.len())]
    ItemConflict(ConflictReport),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Draft storage error: {0}")]
    DraftStorage(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for ServiceError {
    fn from(err: std::io::Error) -> Self {
        ServiceError::DraftStorage(err.to_string())
    }
}

impl ServiceError {
    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidOperation(_) | Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::ValidationFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::ItemConflict(_) => StatusCode::CONFLICT,
            Self::DraftStorage(_) | Self::SerializationError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DraftStorage(_) => "Draft storage error".to_string(),
            Self::SerializationError(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }

    fn to_error_response(&self) -> ErrorResponse {
        let mut body = ErrorResponse::new(self.status_code(), self.response_message());
        match self {
            Self::ValidationFailed(errors) => body.errors = Some(errors.clone()),
            Self::ItemConflict(report) => {
                body.details = Some(report.messages().join("\n"));
                body.conflicts = Some(report.clone());
            }
            _ => {}
        }
        body
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(self.to_error_response())).into_response()
    }
}

/// API Error type for HTTP responses
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Service error: {0}")]
    ServiceError(#[from] ServiceError),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Delegate to ServiceError's unified status/message methods when applicable
        let (status, body) = match self {
            ApiError::ServiceError(service_error) => {
                (service_error.status_code(), service_error.to_error_response())
            }
            ApiError::ValidationError(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::new(StatusCode::BAD_REQUEST, msg),
            ),
            ApiError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                ErrorResponse::new(StatusCode::NOT_FOUND, msg),
            ),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::grouping::{ConflictGroup, ConflictRow};
    use crate::models::Unit;
    use axum::body::to_bytes;
    use rust_decimal_macros::dec;

    fn sample_report() -> ConflictReport {
        ConflictReport {
            groups: vec![ConflictGroup {
                code: "A".into(),
                name: "Bolt".into(),
                job_no: "J1".into(),
                specifications: "x".into(),
                item_description: String::new(),
                rows: vec![
                    ConflictRow {
                        row: 1,
                        index: 0,
                        quantity: dec!(10),
                        unit: Unit::Adet,
                    },
                    ConflictRow {
                        row: 2,
                        index: 1,
                        quantity: dec!(5),
                        unit: Unit::Adet,
                    },
                ],
            }],
        }
    }

    #[tokio::test]
    async fn service_error_response_includes_request_id() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("req-123"), async {
                ServiceError::NotFound("missing".into()).into_response()
            })
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload.request_id.as_deref(), Some("req-123"));
    }

    #[tokio::test]
    async fn conflict_response_carries_full_report() {
        let response = ApiError::ServiceError(ServiceError::ItemConflict(sample_report()))
            .into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: ErrorResponse = serde_json::from_slice(&body).unwrap();
        let conflicts = payload.conflicts.expect("conflict report expected");
        assert_eq!(conflicts.groups.len(), 1);
        assert_eq!(conflicts.groups[0].rows.len(), 2);
        assert!(payload.details.unwrap().contains("J1"));
    }

    #[tokio::test]
    async fn validation_failure_lists_every_message() {
        let response = ServiceError::ValidationFailed(vec![
            "Talep başlığı gereklidir".into(),
            "En az bir malzeme eklemelisiniz".into(),
        ])
        .into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload.errors.map(|e| e.len()), Some(2));
    }

    #[test]
    fn service_error_status_code_mapping() {
        assert_eq!(
            ServiceError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::InvalidInput("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::InvalidOperation("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::ValidationFailed(vec![]).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ServiceError::DraftStorage("disk".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ServiceError::SerializationError("eof".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn internal_errors_hide_details() {
        let err = ServiceError::DraftStorage("/var/lib/drafts: permission denied".into());
        assert_eq!(err.response_message(), "Draft storage error");
        let err = ServiceError::SerializationError("expected value at line 1".into());
        assert_eq!(err.response_message(), "Internal server error");
    }

    #[test]
    fn io_and_json_failures_convert() {
        let err: ServiceError = std::io::Error::new(std::io::ErrorKind::Other, "full").into();
        assert_matches::assert_matches!(err, ServiceError::DraftStorage(_));
        let err: ServiceError = serde_json::from_str::<u8>("x").unwrap_err().into();
        assert_matches::assert_matches!(err, ServiceError::SerializationError(_));
    }
}
