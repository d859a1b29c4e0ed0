use async_trait::async_trait;
use common::{BookId, CustomerId, MAX_LINE_QUANTITY, OrderId, ReplenishmentId};

use crate::records::{
    Book, CartHandle, CartLine, CartLineView, InventorySnapshot, NewReplenishment, Order,
    OrderPage, PageRequest, ReplenishmentRequest, ReplenishmentStatus, SaleRecord,
};
use crate::{Result, StorageError};

/// Durable mapping from customer to cart lines.
///
/// Every mutation locks the cart for its duration, so it serializes
/// against a checkout of the same cart.
#[async_trait]
pub trait CartStore: Send + Sync {
    /// Returns the customer's cart, creating an empty one on first access.
    ///
    /// Concurrent callers for the same customer all receive the same cart.
    async fn get_or_create_cart(&self, customer_id: CustomerId) -> Result<CartHandle>;

    /// Lists the lines joined with current catalog title and price.
    ///
    /// Lines whose book has left the catalog are not listed.
    async fn list_lines(&self, cart: &CartHandle) -> Result<Vec<CartLineView>>;

    /// Adds `delta` to the line for `book_id`, inserting it if absent.
    ///
    /// Fails with `InvalidQuantity` if the resulting quantity is outside
    /// 1..=100 and with `BookNotFound` for an unknown book.
    async fn upsert_line(&self, cart: &CartHandle, book_id: &BookId, delta: i64)
    -> Result<CartLine>;

    /// Replaces the quantity of the line for `book_id`.
    async fn set_line(&self, cart: &CartHandle, book_id: &BookId, quantity: i64)
    -> Result<CartLine>;

    /// Deletes the line. Removing an absent line is not an error.
    async fn remove_line(&self, cart: &CartHandle, book_id: &BookId) -> Result<()>;

    /// Deletes every line. Clearing an empty cart is not an error.
    async fn clear(&self, cart: &CartHandle) -> Result<()>;
}

/// Catalog-side operations on inventory records.
///
/// Outside a checkout transaction, `restock` is the only way stock changes.
#[async_trait]
pub trait InventoryLedger: Send + Sync {
    /// Inserts a book, or updates the catalog fields of an existing one.
    ///
    /// `book.stock` is the opening stock of a new book. Re-registering an
    /// existing book keeps its current stock, so committed sales survive
    /// title or price edits.
    async fn register_book(&self, book: Book) -> Result<()>;

    async fn get_book(&self, book_id: &BookId) -> Result<Option<Book>>;

    /// Removes a book from the catalog. Returns false if it was absent.
    async fn remove_book(&self, book_id: &BookId) -> Result<bool>;

    /// Adds `quantity` units of stock and returns the new stock level.
    ///
    /// Fails with `StockOverflow` if the result would exceed `MAX_STOCK`.
    async fn restock(&self, book_id: &BookId, quantity: u32) -> Result<u32>;
}

/// Read side of the append-only order ledger.
#[async_trait]
pub trait OrderLedger: Send + Sync {
    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Orders of one customer, newest first.
    async fn orders_for_customer(&self, customer_id: CustomerId) -> Result<Vec<Order>>;

    /// Paged listing of all orders, newest first.
    async fn list_orders(&self, page: PageRequest) -> Result<OrderPage>;

    /// Sales journal entries written for an order.
    async fn sales_for_order(&self, order_id: OrderId) -> Result<Vec<SaleRecord>>;
}

/// Replenishment requests as seen by the restocking workflow.
#[async_trait]
pub trait ReplenishmentLedger: Send + Sync {
    /// Lists requests, optionally filtered by status, oldest first.
    async fn list_replenishments(
        &self,
        status: Option<ReplenishmentStatus>,
    ) -> Result<Vec<ReplenishmentRequest>>;

    /// Moves a Pending request to Fulfilled or Cancelled.
    ///
    /// Fulfilling adds the requested quantity to the book's stock in the
    /// same transaction.
    async fn resolve_replenishment(
        &self,
        id: ReplenishmentId,
        status: ReplenishmentStatus,
    ) -> Result<ReplenishmentRequest>;
}

/// Opens the unit of work a checkout runs in.
#[async_trait]
pub trait CheckoutStore: Send + Sync {
    type Tx: CheckoutTransaction;

    /// Begins a transaction with a bounded lock wait.
    async fn begin(&self) -> Result<Self::Tx>;
}

/// Operations available inside a checkout transaction.
///
/// Dropping the transaction without calling `commit` discards every write.
#[async_trait]
pub trait CheckoutTransaction: Send {
    /// Locks the customer's cart for the rest of the transaction.
    ///
    /// Returns None if the customer has never had a cart.
    async fn lock_cart(&mut self, customer_id: CustomerId) -> Result<Option<CartHandle>>;

    /// Reads the cart's lines in insertion order.
    async fn cart_lines(&mut self, cart: &CartHandle) -> Result<Vec<CartLine>>;

    /// Locks every requested book row in ascending id order with a single
    /// statement and returns the snapshots in that order.
    ///
    /// Fails with `BookNotFound` naming the first missing id.
    async fn lock_and_fetch(&mut self, book_ids: &[BookId]) -> Result<Vec<InventorySnapshot>>;

    /// Writes the order, its lines and one sales journal entry per line.
    async fn insert_order(&mut self, order: &Order) -> Result<()>;

    /// Reduces stock and returns the post-decrement value read back from
    /// the store. Must only be called while the row is locked.
    async fn decrement_stock(&mut self, book_id: &BookId, quantity: u32) -> Result<u32>;

    /// Inserts a Pending request unless one already exists for the book.
    ///
    /// Returns the inserted request, or None if a Pending one was present.
    async fn insert_pending_replenishment(
        &mut self,
        request: NewReplenishment,
    ) -> Result<Option<ReplenishmentRequest>>;

    /// Deletes all lines of the cart.
    async fn clear_cart(&mut self, cart: &CartHandle) -> Result<()>;

    async fn commit(self) -> Result<()>;

    async fn rollback(self) -> Result<()>;
}

/// Everything the checkout core needs from a storage backend.
pub trait Storage:
    CartStore
    + InventoryLedger
    + OrderLedger
    + ReplenishmentLedger
    + CheckoutStore
    + Clone
    + 'static
{
}

impl<T> Storage for T where
    T: CartStore
        + InventoryLedger
        + OrderLedger
        + ReplenishmentLedger
        + CheckoutStore
        + Clone
        + 'static
{
}

/// Highest stock level or threshold a book may hold (the INTEGER column).
pub const MAX_STOCK: u32 = i32::MAX as u32;

/// Checks the price cap and stock bounds of a catalog record.
pub fn validate_book(book: &Book) -> Result<()> {
    if !book.price.is_valid_price() {
        return Err(StorageError::InvalidPrice {
            cents: book.price.cents(),
        });
    }
    let requested = book.stock.max(book.threshold);
    if requested > MAX_STOCK {
        return Err(StorageError::StockOverflow {
            book_id: book.id.clone(),
            requested: u64::from(requested),
        });
    }
    Ok(())
}

/// Adds `quantity` to `stock`, refusing results above `MAX_STOCK`.
pub fn add_stock(book_id: &BookId, stock: u32, quantity: u32) -> Result<u32> {
    match stock.checked_add(quantity) {
        Some(total) if total <= MAX_STOCK => Ok(total),
        _ => {
            let requested = u64::from(stock) + u64::from(quantity);
            tracing::warn!(book_id = %book_id, stock, quantity, "restock would overflow stock");
            Err(StorageError::StockOverflow {
                book_id: book_id.clone(),
                requested,
            })
        }
    }
}

/// Validates a resulting cart line quantity.
pub fn validate_line_quantity(quantity: i64) -> Result<u32> {
    if quantity <= 0 || quantity > i64::from(MAX_LINE_QUANTITY) {
        return Err(StorageError::InvalidQuantity { quantity });
    }
    Ok(quantity as u32)
}

/// Sorts and deduplicates book ids into lock order.
pub fn lock_order(book_ids: &[BookId]) -> Vec<BookId> {
    let mut ids = book_ids.to_vec();
    ids.sort();
    ids.dedup();
    ids
}
