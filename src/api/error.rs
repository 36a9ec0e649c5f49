use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::api::dto::ErrorResponse;
use crate::services::llm_gateway::GatewayError;
use crate::services::mailer::MailError;
use crate::storage::repository::RepositoryError;

/// Every failure a handler can produce, mapped to one HTTP status.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conversation not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Mail delivery error: {0}")]
    Mail(#[from] MailError),

    #[error("Model provider error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) | ApiError::Repository(RepositoryError::NotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            ApiError::Repository(_) | ApiError::Mail(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Gateway(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let message = match &self {
            ApiError::Unauthorized(_) | ApiError::BadRequest(_) | ApiError::NotFound(_) => {
                self.to_string()
            }
            ApiError::Repository(RepositoryError::NotFound(id)) => {
                format!("Conversation not found: {}", id)
            }
            ApiError::Repository(e) => {
                tracing::error!("Storage error: {}", e);
                "Internal server error".to_string()
            }
            ApiError::Mail(e) => {
                tracing::error!("Mail delivery error: {}", e);
                "Failed to send verification email".to_string()
            }
            ApiError::Gateway(e) => {
                tracing::warn!("Model provider error: {}", e);
                "Model provider unavailable".to_string()
            }
            ApiError::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                "Internal server error".to_string()
            }
        };

        let body = Json(ErrorResponse {
            error: message,
            code: u32::from(status.as_u16()),
        });

        (status, body).into_response()
    }
}

/// Undecodable bodies get the same `{error, code}` shape as every other failure.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
