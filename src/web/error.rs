//! Mapping of domain errors onto HTTP responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use crate::error::LiftClubError;

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<Vec<String>>,
    retryable: bool,
}

pub fn status_for(err: &LiftClubError) -> StatusCode {
    match err {
        LiftClubError::ValidationFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        LiftClubError::NotFound { .. } => StatusCode::NOT_FOUND,
        LiftClubError::AlreadyDecided { .. }
        | LiftClubError::InvalidTransition { .. }
        | LiftClubError::ClubFull { .. }
        | LiftClubError::ClubInactive { .. } => StatusCode::CONFLICT,
        LiftClubError::MissingReason
        | LiftClubError::InvalidDecision { .. }
        | LiftClubError::InvalidCapacity { .. } => StatusCode::BAD_REQUEST,
        LiftClubError::PermissionDenied { .. } => StatusCode::FORBIDDEN,
        LiftClubError::InvariantViolation { .. }
        | LiftClubError::ConfigLoad { .. }
        | LiftClubError::ConfigParse { .. }
        | LiftClubError::ConfigValidation { .. }
        | LiftClubError::StateSave { .. }
        | LiftClubError::StateLoad { .. }
        | LiftClubError::StateParse { .. }
        | LiftClubError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for LiftClubError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        if status.is_server_error() {
            error!(kind = self.kind(), "Request failed: {}", self);
        }

        let body = ErrorBody {
            error: self.kind(),
            message: self.to_string(),
            retryable: self.is_retryable(),
            errors: match self {
                LiftClubError::ValidationFailed { errors } => Some(errors),
                _ => None,
            },
        };

        (status, Json(body)).into_response()
    }
}
