use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use guestpass::GuestpassError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

pub type Result<T> = std::result::Result<T, ApiError>;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Authorization required")]
    Unauthorized,

    #[error("Invalid password")]
    InvalidCredentials,

    #[error("QR code not found")]
    CodeNotFound,

    #[error("QR code already redeemed")]
    AlreadyRedeemed,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Not found")]
    NotFound,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<GuestpassError> for ApiError {
    fn from(err: GuestpassError) -> Self {
        match err {
            GuestpassError::CodeNotFound(_) => ApiError::CodeNotFound,
            GuestpassError::AlreadyRedeemed(_) => ApiError::AlreadyRedeemed,
            GuestpassError::InvalidPromoter => ApiError::InvalidRequest(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::CodeNotFound => StatusCode::NOT_FOUND,
            ApiError::AlreadyRedeemed => StatusCode::CONFLICT,
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Storage details stay in the log
        let message = match &self {
            ApiError::Internal(detail) => {
                error!("Request failed: {}", detail);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "status": "error",
            "message": message,
        }));

        (status, body).into_response()
    }
}
