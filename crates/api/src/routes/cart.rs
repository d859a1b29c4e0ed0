//! Cart endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use checkout::CartView;
use common::BookId;
use serde::{Deserialize, Serialize};
use storage::{CartLine, CartLineView, Storage};

use crate::AppState;
use crate::error::ApiError;
use crate::routes::identity::authorize;

// -- Request types --

#[derive(Deserialize)]
pub struct AddLineRequest {
    pub book_id: String,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
}

fn default_quantity() -> i64 {
    1
}

#[derive(Deserialize)]
pub struct SetLineRequest {
    pub quantity: i64,
}

// -- Response types --

#[derive(Serialize)]
pub struct CartResponse {
    pub cart_id: String,
    pub customer_id: String,
    pub lines: Vec<CartLineResponse>,
    pub total_cents: i64,
    pub total: String,
}

#[derive(Serialize)]
pub struct CartLineResponse {
    pub book_id: String,
    pub title: String,
    pub unit_price_cents: i64,
    pub quantity: u32,
    pub line_total_cents: i64,
}

#[derive(Serialize)]
pub struct LineResponse {
    pub book_id: String,
    pub quantity: u32,
}

impl From<CartView> for CartResponse {
    fn from(view: CartView) -> Self {
        Self {
            cart_id: view.cart.id.to_string(),
            customer_id: view.cart.customer_id.to_string(),
            lines: view.lines.into_iter().map(CartLineResponse::from).collect(),
            total_cents: view.total.cents(),
            total: view.total.to_decimal_string(),
        }
    }
}

impl From<CartLineView> for CartLineResponse {
    fn from(line: CartLineView) -> Self {
        Self {
            book_id: line.book_id.to_string(),
            title: line.title,
            unit_price_cents: line.unit_price.cents(),
            quantity: line.quantity,
            line_total_cents: line.line_total.cents(),
        }
    }
}

impl From<CartLine> for LineResponse {
    fn from(line: CartLine) -> Self {
        Self {
            book_id: line.book_id.to_string(),
            quantity: line.quantity,
        }
    }
}

// -- Handlers --

/// GET /customers/{id}/cart: list lines with current prices.
#[tracing::instrument(skip(state, headers))]
pub async fn view<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<CartResponse>, ApiError> {
    let customer_id = authorize(&headers, &id)?;
    let view = state.carts.view(customer_id).await?;
    Ok(Json(view.into()))
}

/// POST /customers/{id}/cart: add units of a book, merging into an existing line.
#[tracing::instrument(skip(state, headers, req))]
pub async fn add<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<AddLineRequest>,
) -> Result<Json<LineResponse>, ApiError> {
    let customer_id = authorize(&headers, &id)?;
    let book_id = parse_book_id(&req.book_id)?;
    let line = state
        .carts
        .add_line(customer_id, &book_id, req.quantity)
        .await?;
    Ok(Json(line.into()))
}

/// PUT /customers/{id}/cart/{book_id}: replace a line's quantity.
#[tracing::instrument(skip(state, headers, req))]
pub async fn set<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path((id, book_id)): Path<(String, String)>,
    Json(req): Json<SetLineRequest>,
) -> Result<Json<LineResponse>, ApiError> {
    let customer_id = authorize(&headers, &id)?;
    let book_id = parse_book_id(&book_id)?;
    let line = state
        .carts
        .set_line(customer_id, &book_id, req.quantity)
        .await?;
    Ok(Json(line.into()))
}

/// DELETE /customers/{id}/cart/{book_id}: remove a line.
#[tracing::instrument(skip(state, headers))]
pub async fn remove<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path((id, book_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let customer_id = authorize(&headers, &id)?;
    let book_id = parse_book_id(&book_id)?;
    state.carts.remove_line(customer_id, &book_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /customers/{id}/cart: remove every line.
#[tracing::instrument(skip(state, headers))]
pub async fn clear<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let customer_id = authorize(&headers, &id)?;
    state.carts.clear(customer_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /customers/{id}/logout: ends the session, discarding the cart.
#[tracing::instrument(skip(state, headers))]
pub async fn logout<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let customer_id = authorize(&headers, &id)?;
    state.carts.clear(customer_id).await?;
    tracing::info!(%customer_id, "customer logged out");
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) fn parse_book_id(raw: &str) -> Result<BookId, ApiError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ApiError::BadRequest("book_id must not be empty".to_string()));
    }
    Ok(BookId::new(trimmed))
}
