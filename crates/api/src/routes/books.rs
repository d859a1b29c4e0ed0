//! Catalog inventory endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::Money;
use serde::{Deserialize, Serialize};
use storage::{Book, Storage};

use crate::AppState;
use crate::error::ApiError;
use crate::routes::cart::parse_book_id;

#[derive(Deserialize)]
pub struct RegisterBookRequest {
    pub title: String,
    pub price_cents: i64,
    pub stock: u32,
    #[serde(default)]
    pub threshold: u32,
    pub supplier_id: String,
}

#[derive(Deserialize)]
pub struct RestockRequest {
    pub quantity: u32,
}

#[derive(Serialize)]
pub struct BookResponse {
    pub book_id: String,
    pub title: String,
    pub price_cents: i64,
    pub stock: u32,
    pub threshold: u32,
    pub supplier_id: String,
}

#[derive(Serialize)]
pub struct RestockResponse {
    pub book_id: String,
    pub stock: u32,
}

impl From<Book> for BookResponse {
    fn from(book: Book) -> Self {
        Self {
            book_id: book.id.to_string(),
            title: book.title,
            price_cents: book.price.cents(),
            stock: book.stock,
            threshold: book.threshold,
            supplier_id: book.supplier_id,
        }
    }
}

/// PUT /books/{isbn}: create a catalog record or edit an existing one.
///
/// `stock` only applies to a new book; existing stock is kept.
#[tracing::instrument(skip(state, req))]
pub async fn register<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    Path(isbn): Path<String>,
    Json(req): Json<RegisterBookRequest>,
) -> Result<Json<BookResponse>, ApiError> {
    let book_id = parse_book_id(&isbn)?;
    let book = Book::new(
        book_id,
        req.title,
        Money::from_cents(req.price_cents),
        req.stock,
        req.threshold,
        req.supplier_id,
    );
    state.store.register_book(book.clone()).await?;
    let stored = state
        .store
        .get_book(&book.id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Book {isbn} not found")))?;
    tracing::info!(book_id = %stored.id, stock = stored.stock, "book registered");
    Ok(Json(stored.into()))
}

/// GET /books/{isbn}
#[tracing::instrument(skip(state))]
pub async fn get<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    Path(isbn): Path<String>,
) -> Result<Json<BookResponse>, ApiError> {
    let book_id = parse_book_id(&isbn)?;
    let book = state
        .store
        .get_book(&book_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Book {isbn} not found")))?;
    Ok(Json(book.into()))
}

/// DELETE /books/{isbn}: remove a book from the catalog.
#[tracing::instrument(skip(state))]
pub async fn remove<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    Path(isbn): Path<String>,
) -> Result<StatusCode, ApiError> {
    let book_id = parse_book_id(&isbn)?;
    if state.store.remove_book(&book_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Book {isbn} not found")))
    }
}

/// POST /books/{isbn}/restock: add units to stock.
#[tracing::instrument(skip(state, req))]
pub async fn restock<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    Path(isbn): Path<String>,
    Json(req): Json<RestockRequest>,
) -> Result<Json<RestockResponse>, ApiError> {
    if req.quantity == 0 {
        return Err(ApiError::BadRequest(
            "Restock quantity must be positive".to_string(),
        ));
    }
    let book_id = parse_book_id(&isbn)?;
    let stock = state.store.restock(&book_id, req.quantity).await?;
    tracing::info!(%book_id, added = req.quantity, stock, "book restocked");
    Ok(Json(RestockResponse {
        book_id: book_id.to_string(),
        stock,
    }))
}
