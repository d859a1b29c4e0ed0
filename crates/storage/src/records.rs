//! Records persisted by the storage layer.

use chrono::{DateTime, Utc};
use common::{BookId, CartId, CustomerId, Money, OrderId, ReplenishmentId};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StorageError};

/// Catalog and inventory record for a book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub id: BookId,
    pub title: String,
    pub price: Money,
    pub stock: u32,
    /// Stock level at or below which a replenishment request is raised.
    pub threshold: u32,
    pub supplier_id: String,
}

impl Book {
    /// Creates a book record.
    pub fn new(
        id: impl Into<BookId>,
        title: impl Into<String>,
        price: Money,
        stock: u32,
        threshold: u32,
        supplier_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            price,
            stock,
            threshold,
            supplier_id: supplier_id.into(),
        }
    }
}

/// A customer's cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartHandle {
    pub id: CartId,
    pub customer_id: CustomerId,
}

/// A (book, quantity) line in a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub book_id: BookId,
    pub quantity: u32,
}

/// A cart line joined with the current catalog entry, for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLineView {
    pub book_id: BookId,
    pub title: String,
    pub unit_price: Money,
    pub quantity: u32,
    pub line_total: Money,
}

/// Inventory state of a locked book row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventorySnapshot {
    pub book_id: BookId,
    pub title: String,
    pub unit_price: Money,
    pub stock: u32,
    pub threshold: u32,
    pub supplier_id: String,
}

impl From<&Book> for InventorySnapshot {
    fn from(book: &Book) -> Self {
        Self {
            book_id: book.id.clone(),
            title: book.title.clone(),
            unit_price: book.price,
            stock: book.stock,
            threshold: book.threshold,
            supplier_id: book.supplier_id.clone(),
        }
    }
}

/// How an order was paid.
///
/// Card payments keep only the last four digits and the expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum PaymentDescriptor {
    #[serde(rename = "cod")]
    CashOnDelivery,
    Card { last4: String, expiry: String },
}

impl PaymentDescriptor {
    /// Returns the method tag stored with the order.
    pub fn method(&self) -> &'static str {
        match self {
            PaymentDescriptor::CashOnDelivery => "cod",
            PaymentDescriptor::Card { .. } => "card",
        }
    }

    pub fn card_last4(&self) -> Option<&str> {
        match self {
            PaymentDescriptor::Card { last4, .. } => Some(last4),
            PaymentDescriptor::CashOnDelivery => None,
        }
    }

    pub fn card_expiry(&self) -> Option<&str> {
        match self {
            PaymentDescriptor::Card { expiry, .. } => Some(expiry),
            PaymentDescriptor::CashOnDelivery => None,
        }
    }

    /// Rebuilds a descriptor from its stored columns.
    pub fn from_columns(
        method: &str,
        card_last4: Option<String>,
        card_expiry: Option<String>,
    ) -> Result<Self> {
        match (method, card_last4, card_expiry) {
            ("cod", _, _) => Ok(PaymentDescriptor::CashOnDelivery),
            ("card", Some(last4), Some(expiry)) => Ok(PaymentDescriptor::Card { last4, expiry }),
            (other, _, _) => Err(StorageError::Decode(format!(
                "payment method '{other}' with missing or unknown card details"
            ))),
        }
    }
}

/// A line of a completed order, with title and price captured at sale time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub book_id: BookId,
    pub title: String,
    pub unit_price: Money,
    pub quantity: u32,
}

impl OrderLine {
    /// Returns unit price × quantity.
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

/// An immutable order record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: CustomerId,
    pub total: Money,
    pub payment: PaymentDescriptor,
    pub created_at: DateTime<Utc>,
    pub lines: Vec<OrderLine>,
}

impl Order {
    /// Sale journal entries for this order, one per line.
    pub fn sale_records(&self) -> Vec<SaleRecord> {
        self.lines
            .iter()
            .map(|line| SaleRecord {
                order_id: self.id,
                book_id: line.book_id.clone(),
                quantity: line.quantity,
                amount: line.line_total(),
                sold_at: self.created_at,
            })
            .collect()
    }
}

/// Per-line entry of the sales journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleRecord {
    pub order_id: OrderId,
    pub book_id: BookId,
    pub quantity: u32,
    pub amount: Money,
    pub sold_at: DateTime<Utc>,
}

/// Order header used by the paged admin listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSummary {
    pub id: OrderId,
    pub customer_id: CustomerId,
    pub total: Money,
    pub payment_method: String,
    pub card_last4: Option<String>,
    pub created_at: DateTime<Utc>,
    pub line_count: u32,
}

impl From<&Order> for OrderSummary {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id,
            customer_id: order.customer_id,
            total: order.total,
            payment_method: order.payment.method().to_string(),
            card_last4: order.payment.card_last4().map(String::from),
            created_at: order.created_at,
            line_count: order.lines.len() as u32,
        }
    }
}

/// Requested page of the order listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    limit: u32,
}

impl PageRequest {
    pub const DEFAULT_LIMIT: u32 = 10;
    pub const MAX_LIMIT: u32 = 100;

    /// Creates a page request, clamping page to at least 1 and limit to 1..=100.
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page: page.max(1),
            limit: limit.clamp(1, Self::MAX_LIMIT),
        }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Number of rows to skip.
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }

    /// Number of pages needed for `total` rows.
    pub fn page_count(&self, total: u64) -> u32 {
        total.div_ceil(u64::from(self.limit)) as u32
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, Self::DEFAULT_LIMIT)
    }
}

/// A page of order summaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPage {
    pub orders: Vec<OrderSummary>,
    pub total: u64,
    pub page: u32,
    pub pages: u32,
}

/// Lifecycle state of a replenishment request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReplenishmentStatus {
    Pending,
    Fulfilled,
    Cancelled,
}

impl ReplenishmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplenishmentStatus::Pending => "Pending",
            ReplenishmentStatus::Fulfilled => "Fulfilled",
            ReplenishmentStatus::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for ReplenishmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ReplenishmentStatus {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Pending" => Ok(ReplenishmentStatus::Pending),
            "Fulfilled" => Ok(ReplenishmentStatus::Fulfilled),
            "Cancelled" => Ok(ReplenishmentStatus::Cancelled),
            other => Err(StorageError::Decode(format!(
                "unknown replenishment status '{other}'"
            ))),
        }
    }
}

/// A request for a supplier to restock a book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplenishmentRequest {
    pub id: ReplenishmentId,
    pub book_id: BookId,
    pub supplier_id: String,
    pub quantity: u32,
    pub status: ReplenishmentStatus,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Input for a conditional Pending insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReplenishment {
    pub book_id: BookId,
    pub supplier_id: String,
    pub quantity: u32,
}

impl NewReplenishment {
    /// Materializes the Pending request that would be stored.
    pub fn into_pending(self, created_at: DateTime<Utc>) -> ReplenishmentRequest {
        ReplenishmentRequest {
            id: ReplenishmentId::new(),
            book_id: self.book_id,
            supplier_id: self.supplier_id,
            quantity: self.quantity,
            status: ReplenishmentStatus::Pending,
            created_at,
            resolved_at: None,
        }
    }
}
