use axum::Json;
use axum::extract::FromRequest;
use axum::extract::FromRequestParts;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

use connect_types::api::ErrorBody;
use connect_types::models::RequestStatus;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Why an OTP was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OtpRejection {
    #[error("no code has been issued for this email")]
    NotFound,
    #[error("code has expired")]
    Expired,
    #[error("code does not match")]
    Mismatch,
}

/// Every failure a service operation can report. Store and transport
/// failures collapse into `External` and are never shown to clients verbatim.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Otp(#[from] OtpRejection),

    #[error("message text is empty")]
    EmptyMessage,

    #[error("{0}")]
    InvalidOperation(String),

    #[error("authentication required")]
    AuthRequired,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("request is already {from}, cannot move it to {to}")]
    InvalidTransition { from: RequestStatus, to: RequestStatus },

    #[error("{0}")]
    Conflict(String),

    #[error("external service error: {0}")]
    External(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// A required body or query field was absent.
    pub fn missing(field: &str) -> Self {
        Self::Validation(format!("missing required field '{}'", field))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::Otp(_) | Self::EmptyMessage | Self::InvalidOperation(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::AuthRequired => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidTransition { .. } | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::External(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::External(e) => {
                error!("External service error: {:#}", e);
                "internal server error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

impl From<JsonRejection> for ServiceError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ServiceError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for ServiceError {
    fn from(rejection: PathRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

// Extractors that report malformed input as a JSON `ServiceError` body.

#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ServiceError))]
pub struct ApiJson<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ServiceError))]
pub struct ApiQuery<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ServiceError))]
pub struct ApiPath<T>(pub T);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_error_kind() {
        assert_eq!(ServiceError::EmptyMessage.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ServiceError::Otp(OtpRejection::Expired).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ServiceError::AuthRequired.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ServiceError::forbidden("no").status(), StatusCode::FORBIDDEN);
        assert_eq!(ServiceError::NotFound("chat").status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ServiceError::InvalidTransition {
                from: RequestStatus::Accepted,
                to: RequestStatus::Rejected,
            }
            .status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::External(anyhow::anyhow!("disk on fire")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn messages_are_client_readable() {
        let err = ServiceError::InvalidTransition {
            from: RequestStatus::Accepted,
            to: RequestStatus::Rejected,
        };
        assert_eq!(err.to_string(), "request is already accepted, cannot move it to rejected");
        assert_eq!(ServiceError::NotFound("startup").to_string(), "startup not found");
        assert_eq!(
            ServiceError::Otp(OtpRejection::Mismatch).to_string(),
            "code does not match"
        );
    }
}
