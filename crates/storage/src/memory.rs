use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use common::{BookId, CartId, CustomerId, OrderId, ReplenishmentId};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::records::{
    Book, CartHandle, CartLine, CartLineView, InventorySnapshot, NewReplenishment, Order,
    OrderPage, OrderSummary, PageRequest, ReplenishmentRequest, ReplenishmentStatus, SaleRecord,
};
use crate::store::{
    CartStore, CheckoutStore, CheckoutTransaction, InventoryLedger, OrderLedger,
    ReplenishmentLedger, add_stock, lock_order, validate_book, validate_line_quantity,
};
use crate::{Result, StorageError};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Default)]
struct Tables {
    books: BTreeMap<BookId, Book>,
    carts: HashMap<CustomerId, CartHandle>,
    cart_lines: HashMap<CartId, Vec<CartLine>>,
    orders: Vec<Order>,
    sales: Vec<SaleRecord>,
    replenishments: Vec<ReplenishmentRequest>,
}

impl Tables {
    fn book_mut(&mut self, book_id: &BookId) -> Result<&mut Book> {
        self.books
            .get_mut(book_id)
            .ok_or_else(|| StorageError::BookNotFound(book_id.clone()))
    }

    fn write_line(
        &mut self,
        cart: &CartHandle,
        book_id: &BookId,
        quantity: impl FnOnce(i64) -> i64,
    ) -> Result<CartLine> {
        if !self.books.contains_key(book_id) {
            return Err(StorageError::BookNotFound(book_id.clone()));
        }
        let lines = self.cart_lines.entry(cart.id).or_default();
        let current = lines
            .iter()
            .find(|l| &l.book_id == book_id)
            .map_or(0, |l| i64::from(l.quantity));
        let quantity = validate_line_quantity(quantity(current))?;

        match lines.iter_mut().find(|l| &l.book_id == book_id) {
            Some(line) => line.quantity = quantity,
            None => lines.push(CartLine {
                book_id: book_id.clone(),
                quantity,
            }),
        }
        Ok(CartLine {
            book_id: book_id.clone(),
            quantity,
        })
    }

    fn clear_lines(&mut self, cart_id: CartId) {
        self.cart_lines.remove(&cart_id);
    }

    fn order_with_id(&self, order_id: OrderId) -> Option<&Order> {
        self.orders.iter().find(|o| o.id == order_id)
    }
}

/// In-memory storage for tests and local development.
///
/// Transactions are serialized behind a single async mutex and write to a
/// private copy of the tables that replaces the shared state on commit.
/// This gives the same no-oversell and dedup guarantees as row locks, with
/// coarser granularity.
#[derive(Clone)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
    lock_timeout: Duration,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self {
            tables: Arc::default(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

impl InMemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how long an operation waits for the store lock before failing
    /// with `LockTimeout`.
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.tables.lock().await.orders.len()
    }

    async fn acquire(&self) -> Result<OwnedMutexGuard<Tables>> {
        tokio::time::timeout(self.lock_timeout, self.tables.clone().lock_owned())
            .await
            .map_err(|_| {
                tracing::debug!(
                    timeout_ms = self.lock_timeout.as_millis() as u64,
                    "store lock wait timed out"
                );
                StorageError::LockTimeout
            })
    }
}

#[async_trait]
impl CartStore for InMemoryStore {
    async fn get_or_create_cart(&self, customer_id: CustomerId) -> Result<CartHandle> {
        let mut tables = self.acquire().await?;
        let cart = *tables
            .carts
            .entry(customer_id)
            .or_insert_with(|| CartHandle {
                id: CartId::new(),
                customer_id,
            });
        Ok(cart)
    }

    async fn list_lines(&self, cart: &CartHandle) -> Result<Vec<CartLineView>> {
        let tables = self.acquire().await?;
        let lines = tables
            .cart_lines
            .get(&cart.id)
            .map(Vec::as_slice)
            .unwrap_or_default();

        Ok(lines
            .iter()
            .filter_map(|line| {
                let book = tables.books.get(&line.book_id)?;
                Some(CartLineView {
                    book_id: line.book_id.clone(),
                    title: book.title.clone(),
                    unit_price: book.price,
                    quantity: line.quantity,
                    line_total: book.price.multiply(line.quantity),
                })
            })
            .collect())
    }

    async fn upsert_line(
        &self,
        cart: &CartHandle,
        book_id: &BookId,
        delta: i64,
    ) -> Result<CartLine> {
        let mut tables = self.acquire().await?;
        tables.write_line(cart, book_id, |current| current + delta)
    }

    async fn set_line(
        &self,
        cart: &CartHandle,
        book_id: &BookId,
        quantity: i64,
    ) -> Result<CartLine> {
        let mut tables = self.acquire().await?;
        tables.write_line(cart, book_id, |_| quantity)
    }

    async fn remove_line(&self, cart: &CartHandle, book_id: &BookId) -> Result<()> {
        let mut tables = self.acquire().await?;
        if let Some(lines) = tables.cart_lines.get_mut(&cart.id) {
            lines.retain(|l| &l.book_id != book_id);
        }
        Ok(())
    }

    async fn clear(&self, cart: &CartHandle) -> Result<()> {
        let mut tables = self.acquire().await?;
        tables.clear_lines(cart.id);
        Ok(())
    }
}

#[async_trait]
impl InventoryLedger for InMemoryStore {
    async fn register_book(&self, book: Book) -> Result<()> {
        validate_book(&book)?;
        let mut tables = self.acquire().await?;
        match tables.books.get_mut(&book.id) {
            Some(existing) => {
                existing.title = book.title;
                existing.price = book.price;
                existing.threshold = book.threshold;
                existing.supplier_id = book.supplier_id;
            }
            None => {
                tables.books.insert(book.id.clone(), book);
            }
        }
        Ok(())
    }

    async fn get_book(&self, book_id: &BookId) -> Result<Option<Book>> {
        let tables = self.acquire().await?;
        Ok(tables.books.get(book_id).cloned())
    }

    async fn remove_book(&self, book_id: &BookId) -> Result<bool> {
        let mut tables = self.acquire().await?;
        Ok(tables.books.remove(book_id).is_some())
    }

    async fn restock(&self, book_id: &BookId, quantity: u32) -> Result<u32> {
        let mut tables = self.acquire().await?;
        let book = tables.book_mut(book_id)?;
        book.stock = add_stock(book_id, book.stock, quantity)?;
        Ok(book.stock)
    }
}

#[async_trait]
impl OrderLedger for InMemoryStore {
    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let tables = self.acquire().await?;
        Ok(tables.order_with_id(order_id).cloned())
    }

    async fn orders_for_customer(&self, customer_id: CustomerId) -> Result<Vec<Order>> {
        let tables = self.acquire().await?;
        // Orders are appended in creation order
        Ok(tables
            .orders
            .iter()
            .rev()
            .filter(|o| o.customer_id == customer_id)
            .cloned()
            .collect())
    }

    async fn list_orders(&self, page: PageRequest) -> Result<OrderPage> {
        let tables = self.acquire().await?;
        let total = tables.orders.len() as u64;
        let orders = tables
            .orders
            .iter()
            .rev()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .map(OrderSummary::from)
            .collect();

        Ok(OrderPage {
            orders,
            total,
            page: page.page(),
            pages: page.page_count(total),
        })
    }

    async fn sales_for_order(&self, order_id: OrderId) -> Result<Vec<SaleRecord>> {
        let tables = self.acquire().await?;
        Ok(tables
            .sales
            .iter()
            .filter(|s| s.order_id == order_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ReplenishmentLedger for InMemoryStore {
    async fn list_replenishments(
        &self,
        status: Option<ReplenishmentStatus>,
    ) -> Result<Vec<ReplenishmentRequest>> {
        let tables = self.acquire().await?;
        Ok(tables
            .replenishments
            .iter()
            .filter(|r| status.is_none_or(|s| r.status == s))
            .cloned()
            .collect())
    }

    async fn resolve_replenishment(
        &self,
        id: ReplenishmentId,
        status: ReplenishmentStatus,
    ) -> Result<ReplenishmentRequest> {
        let mut tables = self.acquire().await?;
        let Tables {
            books,
            replenishments,
            ..
        } = &mut *tables;
        let request = replenishments
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(StorageError::ReplenishmentNotFound(id))?;

        if request.status != ReplenishmentStatus::Pending || status == ReplenishmentStatus::Pending
        {
            return Err(StorageError::InvalidReplenishmentTransition {
                id,
                from: request.status,
                to: status,
            });
        }

        // Stock is checked before anything changes so a refused restock
        // leaves the request Pending.
        if status == ReplenishmentStatus::Fulfilled
            && let Some(book) = books.get_mut(&request.book_id)
        {
            book.stock = add_stock(&book.id, book.stock, request.quantity)?;
        }

        request.status = status;
        request.resolved_at = Some(Utc::now());
        Ok(request.clone())
    }
}

/// A checkout transaction over the in-memory tables.
///
/// Holds the store lock until committed or dropped.
pub struct InMemoryTransaction {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
}

#[async_trait]
impl CheckoutStore for InMemoryStore {
    type Tx = InMemoryTransaction;

    async fn begin(&self) -> Result<InMemoryTransaction> {
        let guard = self.acquire().await?;
        let working = guard.clone();
        Ok(InMemoryTransaction { guard, working })
    }
}

#[async_trait]
impl CheckoutTransaction for InMemoryTransaction {
    async fn lock_cart(&mut self, customer_id: CustomerId) -> Result<Option<CartHandle>> {
        Ok(self.working.carts.get(&customer_id).copied())
    }

    async fn cart_lines(&mut self, cart: &CartHandle) -> Result<Vec<CartLine>> {
        Ok(self
            .working
            .cart_lines
            .get(&cart.id)
            .cloned()
            .unwrap_or_default())
    }

    async fn lock_and_fetch(&mut self, book_ids: &[BookId]) -> Result<Vec<InventorySnapshot>> {
        lock_order(book_ids)
            .into_iter()
            .map(|id| {
                self.working
                    .books
                    .get(&id)
                    .map(InventorySnapshot::from)
                    .ok_or(StorageError::BookNotFound(id))
            })
            .collect()
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        self.working.sales.extend(order.sale_records());
        self.working.orders.push(order.clone());
        Ok(())
    }

    async fn decrement_stock(&mut self, book_id: &BookId, quantity: u32) -> Result<u32> {
        let book = self.working.book_mut(book_id)?;
        // Mirrors the CHECK (stock_qty >= 0) constraint
        book.stock = book
            .stock
            .checked_sub(quantity)
            .ok_or_else(|| StorageError::StockUnderflow(book_id.clone()))?;
        Ok(book.stock)
    }

    async fn insert_pending_replenishment(
        &mut self,
        request: NewReplenishment,
    ) -> Result<Option<ReplenishmentRequest>> {
        let pending_exists = self.working.replenishments.iter().any(|r| {
            r.book_id == request.book_id && r.status == ReplenishmentStatus::Pending
        });
        if pending_exists {
            return Ok(None);
        }

        let request = request.into_pending(Utc::now());
        self.working.replenishments.push(request.clone());
        Ok(Some(request))
    }

    async fn clear_cart(&mut self, cart: &CartHandle) -> Result<()> {
        self.working.clear_lines(cart.id);
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        let InMemoryTransaction { mut guard, working } = self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}
