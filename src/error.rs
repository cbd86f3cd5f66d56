//! Error types for the ISBN resolver

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use once_cell::sync::OnceCell;
use serde::Serialize;
use serde_with::skip_serializing_none;
use thiserror::Error;

use crate::{isbn::IsbnError, models::LookupMiss};

/// Set once at startup; internal error detail is only exposed outside production
static EXPOSE_INTERNAL_DETAILS: OnceCell<bool> = OnceCell::new();

/// Enable or disable internal detail in error bodies. Only the first call has an effect.
pub fn expose_internal_details(enabled: bool) {
    let _ = EXPOSE_INTERNAL_DETAILS.set(enabled);
}

fn internal_details_exposed() -> bool {
    EXPOSE_INTERNAL_DETAILS.get().copied().unwrap_or(false)
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    InvalidIsbn(#[from] IsbnError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Authorization failed: {0}")]
    Authorization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{}", .0.message())]
    Unresolved(LookupMiss),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::InvalidIsbn(_) => "InvalidIsbn",
            AppError::Validation(_) => "ValidationError",
            AppError::Authentication(_) => "AuthenticationError",
            AppError::Authorization(_) => "AuthorizationError",
            AppError::NotFound(_) => "NotFound",
            AppError::Unresolved(miss) if miss.is_unavailable() => "ServiceUnavailable",
            AppError::Unresolved(_) => "NotFound",
            AppError::Conflict(_) => "ConflictError",
            AppError::ServiceUnavailable(_) => "ServiceUnavailable",
            AppError::Database(_) | AppError::Internal(_) => "InternalError",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidIsbn(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Authentication(_) => StatusCode::UNAUTHORIZED,
            AppError::Authorization(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unresolved(miss) if miss.is_unavailable() => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Unresolved(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to return to API clients
    pub fn public_message(&self) -> String {
        match self {
            AppError::InvalidIsbn(e) => e.to_string(),
            AppError::Validation(msg)
            | AppError::Authentication(msg)
            | AppError::Authorization(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg)
            | AppError::ServiceUnavailable(msg) => msg.clone(),
            AppError::Unresolved(miss) => miss.message(),
            AppError::Database(_) => "Database error".to_string(),
            AppError::Internal(_) => "Internal server error".to_string(),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            AppError::Unresolved(miss) => serde_json::to_value(miss).ok(),
            AppError::Database(e) if internal_details_exposed() => {
                Some(serde_json::Value::String(e.to_string()))
            }
            AppError::Internal(msg) if internal_details_exposed() => {
                Some(serde_json::Value::String(msg.clone()))
            }
            _ => None,
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

/// Error response body
#[skip_serializing_none]
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    /// Always `false`
    pub success: bool,
    /// Error kind, e.g. `InvalidIsbn`
    pub error: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Database(e) => tracing::error!("Database error: {:?}", e),
            AppError::Internal(msg) => tracing::error!("Internal error: {}", msg),
            _ => {}
        }

        let body = Json(ErrorResponse {
            success: false,
            error: self.kind().to_string(),
            message: self.public_message(),
            details: self.details(),
        });

        (self.status(), body).into_response()
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
