use audit_core::LedgerError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug)]
pub enum ApiError {
    Ledger(LedgerError),
    Internal(String),
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        ApiError::Ledger(err)
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Ledger(err) => match err {
                LedgerError::Validation(_) => (StatusCode::BAD_REQUEST, "invalid_transaction"),
                LedgerError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
                LedgerError::AlreadyConfirmed(_) => (StatusCode::CONFLICT, "already_confirmed"),
                LedgerError::AlreadySettled { .. } => (StatusCode::CONFLICT, "already_settled"),
                LedgerError::InvalidFormat(_) => (StatusCode::BAD_REQUEST, "invalid_format"),
                LedgerError::Integrity(_) => (StatusCode::UNPROCESSABLE_ENTITY, "corrupted_chain"),
                LedgerError::Mining(_) => (StatusCode::SERVICE_UNAVAILABLE, "mining_aborted"),
                LedgerError::Serialization(_) | LedgerError::Config(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "internal")
                }
            },
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = self.parts();
        let message = match self {
            ApiError::Ledger(err) => err.to_string(),
            ApiError::Internal(msg) => msg,
        };
        if status.is_server_error() {
            tracing::error!(%status, %message, "request failed");
        }
        (status, Json(ErrorBody { error, message })).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
