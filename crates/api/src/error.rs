//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout::{CheckoutAborted, CheckoutError};
use storage::StorageError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Resource not found.
    #[error("{0}")]
    NotFound(String),
    /// Bad request from the client.
    #[error("{0}")]
    BadRequest(String),
    /// Missing or malformed caller identity.
    #[error("{0}")]
    Unauthorized(String),
    /// Caller acted on another customer's resources.
    #[error("{0}")]
    Forbidden(String),
    /// Cart or checkout failure.
    #[error(transparent)]
    Checkout(CheckoutError),
    /// Storage failure outside a checkout.
    #[error(transparent)]
    Storage(StorageError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Checkout(err) => checkout_error_status(err),
            ApiError::Storage(err) => storage_error_status(err),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "internal server error");
        }

        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

fn checkout_error_status(err: &CheckoutError) -> StatusCode {
    match err {
        CheckoutError::PaymentValidation(_)
        | CheckoutError::InvalidQuantity(_)
        | CheckoutError::EmptyCart => StatusCode::BAD_REQUEST,
        CheckoutError::NotFound(_) => StatusCode::NOT_FOUND,
        CheckoutError::InsufficientStock { .. } => StatusCode::CONFLICT,
        CheckoutError::LockTimeout => StatusCode::SERVICE_UNAVAILABLE,
        CheckoutError::Persistence(err) => storage_error_status(err),
    }
}

fn storage_error_status(err: &StorageError) -> StatusCode {
    match err {
        StorageError::BookNotFound(_) | StorageError::ReplenishmentNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        StorageError::InvalidQuantity { .. }
        | StorageError::InvalidPrice { .. }
        | StorageError::StockOverflow { .. } => StatusCode::BAD_REQUEST,
        StorageError::InvalidReplenishmentTransition { .. } => StatusCode::CONFLICT,
        StorageError::LockTimeout => StatusCode::SERVICE_UNAVAILABLE,
        StorageError::StockUnderflow(_)
        | StorageError::Decode(_)
        | StorageError::Database(_)
        | StorageError::Migration(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        ApiError::Checkout(err)
    }
}

impl From<CheckoutAborted> for ApiError {
    fn from(aborted: CheckoutAborted) -> Self {
        ApiError::Checkout(aborted.reason)
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ApiError::Storage(err)
    }
}
