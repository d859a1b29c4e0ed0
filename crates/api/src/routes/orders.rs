//! Order history and admin listing endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use common::OrderId;
use serde::{Deserialize, Serialize};
use storage::{Order, OrderLine, OrderPage, OrderSummary, PageRequest, SaleRecord, Storage};

use crate::AppState;
use crate::error::ApiError;
use crate::routes::identity::authorize;

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub customer_id: String,
    pub total_cents: i64,
    pub total: String,
    pub payment_method: String,
    pub card_last4: Option<String>,
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderLineResponse>,
}

#[derive(Serialize)]
pub struct OrderLineResponse {
    pub book_id: String,
    pub title: String,
    pub unit_price_cents: i64,
    pub quantity: u32,
    pub line_total_cents: i64,
}

#[derive(Serialize)]
pub struct OrderDetailResponse {
    #[serde(flatten)]
    pub order: OrderResponse,
    pub sales: Vec<SaleResponse>,
}

#[derive(Serialize)]
pub struct SaleResponse {
    pub book_id: String,
    pub quantity: u32,
    pub amount_cents: i64,
    pub sold_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct OrderSummaryResponse {
    pub id: String,
    pub customer_id: String,
    pub total_cents: i64,
    pub payment_method: String,
    pub card_last4: Option<String>,
    pub created_at: DateTime<Utc>,
    pub item_count: u32,
}

#[derive(Serialize)]
pub struct PageMeta {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub pages: u32,
}

#[derive(Serialize)]
pub struct OrderListResponse {
    pub data: Vec<OrderSummaryResponse>,
    pub meta: PageMeta,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id.to_string(),
            customer_id: order.customer_id.to_string(),
            total_cents: order.total.cents(),
            total: order.total.to_decimal_string(),
            payment_method: order.payment.method().to_string(),
            card_last4: order.payment.card_last4().map(String::from),
            created_at: order.created_at,
            items: order.lines.iter().map(OrderLineResponse::from).collect(),
        }
    }
}

impl From<&OrderLine> for OrderLineResponse {
    fn from(line: &OrderLine) -> Self {
        Self {
            book_id: line.book_id.to_string(),
            title: line.title.clone(),
            unit_price_cents: line.unit_price.cents(),
            quantity: line.quantity,
            line_total_cents: line.line_total().cents(),
        }
    }
}

impl From<SaleRecord> for SaleResponse {
    fn from(sale: SaleRecord) -> Self {
        Self {
            book_id: sale.book_id.to_string(),
            quantity: sale.quantity,
            amount_cents: sale.amount.cents(),
            sold_at: sale.sold_at,
        }
    }
}

impl From<OrderSummary> for OrderSummaryResponse {
    fn from(summary: OrderSummary) -> Self {
        Self {
            id: summary.id.to_string(),
            customer_id: summary.customer_id.to_string(),
            total_cents: summary.total.cents(),
            payment_method: summary.payment_method,
            card_last4: summary.card_last4,
            created_at: summary.created_at,
            item_count: summary.line_count,
        }
    }
}

// -- Handlers --

/// GET /customers/{id}/orders: the customer's orders, newest first.
#[tracing::instrument(skip(state, headers))]
pub async fn history<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let customer_id = authorize(&headers, &id)?;
    let orders = state.store.orders_for_customer(customer_id).await?;
    Ok(Json(orders.into_iter().map(OrderResponse::from).collect()))
}

/// GET /orders: paged listing of all orders, newest first.
#[tracing::instrument(skip(state))]
pub async fn list<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<OrderListResponse>, ApiError> {
    let request = PageRequest::new(
        query.page.unwrap_or(1),
        query.limit.unwrap_or(PageRequest::DEFAULT_LIMIT),
    );
    let OrderPage {
        orders,
        total,
        page,
        pages,
    } = state.store.list_orders(request).await?;

    Ok(Json(OrderListResponse {
        data: orders.into_iter().map(OrderSummaryResponse::from).collect(),
        meta: PageMeta {
            page,
            limit: request.limit(),
            total,
            pages,
        },
    }))
}

/// GET /orders/{id}: an order with its lines and sales entries.
#[tracing::instrument(skip(state))]
pub async fn get<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderDetailResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state
        .store
        .get_order(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order {id} not found")))?;
    let sales = state.store.sales_for_order(order_id).await?;

    Ok(Json(OrderDetailResponse {
        order: order.into(),
        sales: sales.into_iter().map(SaleResponse::from).collect(),
    }))
}

fn parse_order_id(s: &str) -> Result<OrderId, ApiError> {
    let uuid = uuid::Uuid::parse_str(s)
        .map_err(|e| ApiError::BadRequest(format!("Invalid order ID: {e}")))?;
    Ok(OrderId::from_uuid(uuid))
}
