use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use civic_card::CardError;
use civic_db::StoreError;
use civic_types::FlowError;
use civic_types::api::ErrorResponse;
use civic_types::validation::ValidationError;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A body or query string that does not deserialize into the request type.
    #[error("{0}")]
    Malformed(String),

    /// Deliberately says nothing about whether the email had a pending token.
    #[error("Invalid or expired verification link.")]
    InvalidToken,

    #[error("Missing or invalid session.")]
    Unauthorized,

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Flow(#[from] FlowError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Card(#[from] CardError),

    #[error("Internal error")]
    Internal,
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Validation(_) | Self::Malformed(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR")
            }
            Self::InvalidToken => (StatusCode::BAD_REQUEST, "INVALID_TOKEN"),
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Flow(_) | Self::Store(StoreError::Flow(_)) => (StatusCode::CONFLICT, "WRONG_STAGE"),
            Self::Store(e) => match e {
                StoreError::AlreadyVerified => (StatusCode::CONFLICT, "ALREADY_VERIFIED"),
                StoreError::CitizenExists => (StatusCode::CONFLICT, "CITIZEN_EXISTS"),
                StoreError::NotRegistered => (StatusCode::FORBIDDEN, "NOT_REGISTERED"),
                StoreError::NotVerified => (StatusCode::FORBIDDEN, "NOT_VERIFIED"),
                StoreError::SessionNotFound => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
                StoreError::IdSpaceExhausted => (StatusCode::SERVICE_UNAVAILABLE, "ID_SPACE_EXHAUSTED"),
                e if e.is_busy() => (StatusCode::SERVICE_UNAVAILABLE, "BUSY"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
            },
            Self::Card(_) | Self::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Malformed(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Malformed(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.parts();

        // Server-side failures keep their detail in the log only.
        let message = if status.is_server_error() {
            error!("{} ({}): {}", status, code, self);
            match code {
                "BUSY" => "Service busy, please retry.".to_string(),
                "ID_SPACE_EXHAUSTED" => "No ID numbers left to issue.".to_string(),
                _ => "Something went wrong. Please try again later.".to_string(),
            }
        } else {
            self.to_string()
        };

        (
            status,
            Json(ErrorResponse {
                error: message,
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}
