use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::store::StoreError;
use crate::stripe::PaymentError;

/// Request-level error taxonomy. Every handler funnels into this type and the
/// client always sees a `{success, statusCode, message}` body.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Payment service is currently unavailable. Please check your Stripe configuration.")]
    ServiceUnavailable,
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    InvalidState(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Store(StoreError),
    #[error(transparent)]
    Payment(#[from] PaymentError),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => ApiError::Conflict(msg),
            other => ApiError::Store(other),
        }
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidState(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Store(_) | ApiError::Payment(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("request failed: {}", self);
        }
        let body = Json(json!({
            "success": false,
            "statusCode": status.as_u16(),
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}
