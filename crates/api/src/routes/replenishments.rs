//! Replenishment request endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use chrono::{DateTime, Utc};
use common::ReplenishmentId;
use serde::{Deserialize, Serialize};
use storage::{ReplenishmentRequest, ReplenishmentStatus, Storage};

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
}

#[derive(Deserialize)]
pub struct ResolveRequest {
    pub status: String,
}

#[derive(Serialize)]
pub struct ReplenishmentResponse {
    pub id: String,
    pub book_id: String,
    pub supplier_id: String,
    pub quantity: u32,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl From<ReplenishmentRequest> for ReplenishmentResponse {
    fn from(request: ReplenishmentRequest) -> Self {
        Self {
            id: request.id.to_string(),
            book_id: request.book_id.to_string(),
            supplier_id: request.supplier_id,
            quantity: request.quantity,
            status: request.status.to_string(),
            created_at: request.created_at,
            resolved_at: request.resolved_at,
        }
    }
}

/// GET /replenishments?status=: requests, oldest first.
#[tracing::instrument(skip(state))]
pub async fn list<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<ReplenishmentResponse>>, ApiError> {
    let status = query.status.as_deref().map(parse_status).transpose()?;
    let requests = state.store.list_replenishments(status).await?;
    Ok(Json(
        requests
            .into_iter()
            .map(ReplenishmentResponse::from)
            .collect(),
    ))
}

/// POST /replenishments/{id}/resolve: mark a Pending request Fulfilled or Cancelled.
#[tracing::instrument(skip(state, req))]
pub async fn resolve<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<ResolveRequest>,
) -> Result<Json<ReplenishmentResponse>, ApiError> {
    let uuid = uuid::Uuid::parse_str(&id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid replenishment ID: {e}")))?;
    let status = parse_status(&req.status)?;
    let resolved = state
        .store
        .resolve_replenishment(ReplenishmentId::from_uuid(uuid), status)
        .await?;
    tracing::info!(
        replenishment_id = %resolved.id,
        book_id = %resolved.book_id,
        status = %resolved.status,
        "replenishment resolved"
    );
    Ok(Json(resolved.into()))
}

fn parse_status(raw: &str) -> Result<ReplenishmentStatus, ApiError> {
    match raw.to_ascii_lowercase().as_str() {
        "pending" => Ok(ReplenishmentStatus::Pending),
        "fulfilled" => Ok(ReplenishmentStatus::Fulfilled),
        "cancelled" => Ok(ReplenishmentStatus::Cancelled),
        _ => Err(ApiError::BadRequest(format!(
            "Unknown replenishment status: {raw}"
        ))),
    }
}
