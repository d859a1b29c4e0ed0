//! Checkout endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use checkout::PaymentRequest;
use serde::Serialize;
use storage::Storage;

use crate::AppState;
use crate::error::ApiError;
use crate::routes::identity::authorize;

#[derive(Serialize)]
pub struct CheckoutResponse {
    pub order_id: String,
    pub total_cents: i64,
    pub total: String,
}

/// POST /customers/{id}/checkout: convert the cart into an order.
#[tracing::instrument(skip(state, headers, payment))]
pub async fn checkout<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payment): Json<PaymentRequest>,
) -> Result<(StatusCode, Json<CheckoutResponse>), ApiError> {
    let customer_id = authorize(&headers, &id)?;
    let receipt = state.coordinator.checkout(customer_id, &payment).await?;

    Ok((
        StatusCode::CREATED,
        Json(CheckoutResponse {
            order_id: receipt.order_id.to_string(),
            total_cents: receipt.total.cents(),
            total: receipt.total.to_decimal_string(),
        }),
    ))
}
