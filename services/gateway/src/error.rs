use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use escrow_contracts::ContractError;
use escrow_persistence::DurableError;
use serde_json::json;
use thiserror::Error;

/// Central error type for the gateway
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error(transparent)]
    Contract(#[from] ContractError),

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

impl From<DurableError> for AppError {
    fn from(err: DurableError) -> Self {
        match err {
            DurableError::Rejected(e) => AppError::Contract(e),
            other => AppError::InternalError(other.into()),
        }
    }
}

/// HTTP status for a contract rejection.
fn contract_status(err: &ContractError) -> StatusCode {
    match err.code() {
        "PERMISSION_DENIED" => StatusCode::FORBIDDEN,
        "NOT_FOUND" => StatusCode::NOT_FOUND,
        "ALREADY_EXISTS" | "NOT_PENDING" | "REENTRANCY" => StatusCode::CONFLICT,
        "NOT_A_TOKEN" | "INVALID_METHOD" => StatusCode::BAD_REQUEST,
        _ => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message, code) = match self {
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg, "UNAUTHORIZED"),
            AppError::RateLimitExceeded(msg) => {
                (StatusCode::TOO_MANY_REQUESTS, msg, "RATE_LIMIT_EXCEEDED")
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, "BAD_REQUEST"),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg, "FORBIDDEN"),
            AppError::Contract(e) => (contract_status(&e), e.to_string(), e.code()),
            AppError::InternalError(e) => {
                tracing::error!(error = %e, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    "INTERNAL_ERROR",
                )
            }
        };

        let body = Json(json!({
            "error": code,
            "message": error_message
        }));

        (status, body).into_response()
    }
}
