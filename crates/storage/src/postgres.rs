use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use common::{BookId, CartId, CustomerId, Money, OrderId, ReplenishmentId};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::records::{
    Book, CartHandle, CartLine, CartLineView, InventorySnapshot, NewReplenishment, Order,
    OrderLine, OrderPage, OrderSummary, PageRequest, PaymentDescriptor, ReplenishmentRequest,
    ReplenishmentStatus, SaleRecord,
};
use crate::store::{
    CartStore, CheckoutStore, CheckoutTransaction, InventoryLedger, OrderLedger,
    ReplenishmentLedger, add_stock, lock_order, validate_book, validate_line_quantity,
};
use crate::{Result, StorageError};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

const REPLENISHMENT_COLUMNS: &str =
    "id, isbn, supplier_id, quantity, status, created_at, resolved_at";

/// PostgreSQL-backed storage.
///
/// Every transaction runs with `SET LOCAL lock_timeout`, so contention
/// surfaces as `StorageError::LockTimeout` instead of blocking indefinitely.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Sets the lock wait applied to every transaction.
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        tracing::info!("running database migrations");
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn begin_tx(&self) -> Result<Transaction<'static, Postgres>> {
        let mut tx = self.pool.begin().await?;
        // SET does not accept bind parameters; the value is an integer we format.
        sqlx::query(&format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.lock_timeout.as_millis()
        ))
        .execute(&mut *tx)
        .await?;
        Ok(tx)
    }

    /// Locks the book row and adds `quantity` to its stock.
    ///
    /// Returns None if the book is not in the catalog.
    async fn add_to_stock(
        tx: &mut Transaction<'static, Postgres>,
        book_id: &BookId,
        quantity: u32,
    ) -> Result<Option<u32>> {
        let current: Option<i32> =
            sqlx::query_scalar("SELECT stock_qty FROM books WHERE isbn = $1 FOR UPDATE")
                .bind(book_id.as_str())
                .fetch_optional(&mut **tx)
                .await?;
        let Some(current) = current else {
            return Ok(None);
        };

        let stock = add_stock(book_id, to_u32(current, "books.stock_qty")?, quantity)?;
        sqlx::query("UPDATE books SET stock_qty = $1 WHERE isbn = $2")
            .bind(to_i32(stock)?)
            .bind(book_id.as_str())
            .execute(&mut **tx)
            .await?;
        Ok(Some(stock))
    }

    async fn lock_cart_row(tx: &mut Transaction<'static, Postgres>, cart: &CartHandle) -> Result<()> {
        sqlx::query("SELECT id FROM carts WHERE id = $1 FOR UPDATE")
            .bind(cart.id.as_uuid())
            .fetch_optional(&mut **tx)
            .await?;
        Ok(())
    }

    async fn ensure_book_exists(
        tx: &mut Transaction<'static, Postgres>,
        book_id: &BookId,
    ) -> Result<()> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM books WHERE isbn = $1)")
            .bind(book_id.as_str())
            .fetch_one(&mut **tx)
            .await?;
        if exists {
            Ok(())
        } else {
            Err(StorageError::BookNotFound(book_id.clone()))
        }
    }

    /// Writes a line inside an open transaction that already holds the cart lock.
    async fn write_line(
        tx: &mut Transaction<'static, Postgres>,
        cart: &CartHandle,
        book_id: &BookId,
        quantity: u32,
        exists: bool,
    ) -> Result<CartLine> {
        let sql = if exists {
            "UPDATE cart_lines SET qty = $3 WHERE cart_id = $1 AND isbn = $2"
        } else {
            "INSERT INTO cart_lines (cart_id, isbn, qty) VALUES ($1, $2, $3)"
        };
        sqlx::query(sql)
            .bind(cart.id.as_uuid())
            .bind(book_id.as_str())
            .bind(to_i32(quantity)?)
            .execute(&mut **tx)
            .await?;

        Ok(CartLine {
            book_id: book_id.clone(),
            quantity,
        })
    }

    async fn current_line_quantity(
        tx: &mut Transaction<'static, Postgres>,
        cart: &CartHandle,
        book_id: &BookId,
    ) -> Result<Option<i64>> {
        let qty: Option<i32> =
            sqlx::query_scalar("SELECT qty FROM cart_lines WHERE cart_id = $1 AND isbn = $2")
                .bind(cart.id.as_uuid())
                .bind(book_id.as_str())
                .fetch_optional(&mut **tx)
                .await?;
        Ok(qty.map(i64::from))
    }

    async fn load_lines(&self, order_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<OrderLine>>> {
        let rows = sqlx::query(
            r#"
            SELECT order_id, isbn, title, unit_price_cents, qty
            FROM order_lines
            WHERE order_id = ANY($1)
            ORDER BY order_id, line_no ASC
            "#,
        )
        .bind(order_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut lines: HashMap<Uuid, Vec<OrderLine>> = HashMap::new();
        for row in rows {
            let order_id: Uuid = row.try_get("order_id")?;
            lines.entry(order_id).or_default().push(OrderLine {
                book_id: BookId::new(row.try_get::<String, _>("isbn")?),
                title: row.try_get("title")?,
                unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
                quantity: to_u32(row.try_get("qty")?, "order_lines.qty")?,
            });
        }
        Ok(lines)
    }

    fn row_to_order(row: &PgRow, lines: Vec<OrderLine>) -> Result<Order> {
        Ok(Order {
            id: OrderId::from_uuid(row.try_get("id")?),
            customer_id: CustomerId::from_uuid(row.try_get("customer_id")?),
            total: Money::from_cents(row.try_get("total_cents")?),
            payment: PaymentDescriptor::from_columns(
                row.try_get::<&str, _>("payment_method")?,
                row.try_get("card_last4")?,
                row.try_get("card_expiry")?,
            )?,
            created_at: row.try_get("created_at")?,
            lines,
        })
    }

    fn row_to_book(row: &PgRow) -> Result<Book> {
        Ok(Book {
            id: BookId::new(row.try_get::<String, _>("isbn")?),
            title: row.try_get("title")?,
            price: Money::from_cents(row.try_get("price_cents")?),
            stock: to_u32(row.try_get("stock_qty")?, "books.stock_qty")?,
            threshold: to_u32(row.try_get("threshold")?, "books.threshold")?,
            supplier_id: row.try_get("supplier_id")?,
        })
    }

    fn row_to_replenishment(row: &PgRow) -> Result<ReplenishmentRequest> {
        Ok(ReplenishmentRequest {
            id: ReplenishmentId::from_uuid(row.try_get("id")?),
            book_id: BookId::new(row.try_get::<String, _>("isbn")?),
            supplier_id: row.try_get("supplier_id")?,
            quantity: to_u32(row.try_get("quantity")?, "replenishment_requests.quantity")?,
            status: row.try_get::<&str, _>("status")?.parse()?,
            created_at: row.try_get("created_at")?,
            resolved_at: row.try_get("resolved_at")?,
        })
    }
}

fn to_u32(value: i32, column: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| StorageError::Decode(format!("{column} = {value}")))
}

fn to_i32(value: u32) -> Result<i32> {
    i32::try_from(value).map_err(|_| StorageError::InvalidQuantity {
        quantity: i64::from(value),
    })
}

#[async_trait]
impl CartStore for PostgresStore {
    async fn get_or_create_cart(&self, customer_id: CustomerId) -> Result<CartHandle> {
        // A concurrent creator loses on the unique constraint and reads the winner's row
        sqlx::query(
            "INSERT INTO carts (id, customer_id) VALUES ($1, $2) ON CONFLICT (customer_id) DO NOTHING",
        )
        .bind(CartId::new().as_uuid())
        .bind(customer_id.as_uuid())
        .execute(&self.pool)
        .await?;

        let id: Uuid = sqlx::query_scalar("SELECT id FROM carts WHERE customer_id = $1")
            .bind(customer_id.as_uuid())
            .fetch_one(&self.pool)
            .await?;

        Ok(CartHandle {
            id: CartId::from_uuid(id),
            customer_id,
        })
    }

    async fn list_lines(&self, cart: &CartHandle) -> Result<Vec<CartLineView>> {
        let rows = sqlx::query(
            r#"
            SELECT cl.isbn, b.title, b.price_cents, cl.qty
            FROM cart_lines cl
            JOIN books b ON b.isbn = cl.isbn
            WHERE cl.cart_id = $1
            ORDER BY cl.line_seq ASC
            "#,
        )
        .bind(cart.id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<CartLineView> {
                let unit_price = Money::from_cents(row.try_get("price_cents")?);
                let quantity = to_u32(row.try_get("qty")?, "cart_lines.qty")?;
                Ok(CartLineView {
                    book_id: BookId::new(row.try_get::<String, _>("isbn")?),
                    title: row.try_get("title")?,
                    unit_price,
                    quantity,
                    line_total: unit_price.multiply(quantity),
                })
            })
            .collect()
    }

    async fn upsert_line(
        &self,
        cart: &CartHandle,
        book_id: &BookId,
        delta: i64,
    ) -> Result<CartLine> {
        let mut tx = self.begin_tx().await?;
        Self::lock_cart_row(&mut tx, cart).await?;
        Self::ensure_book_exists(&mut tx, book_id).await?;

        let current = Self::current_line_quantity(&mut tx, cart, book_id).await?;
        let quantity = validate_line_quantity(current.unwrap_or(0) + delta)?;
        let line = Self::write_line(&mut tx, cart, book_id, quantity, current.is_some()).await?;

        tx.commit().await?;
        Ok(line)
    }

    async fn set_line(
        &self,
        cart: &CartHandle,
        book_id: &BookId,
        quantity: i64,
    ) -> Result<CartLine> {
        let quantity = validate_line_quantity(quantity)?;

        let mut tx = self.begin_tx().await?;
        Self::lock_cart_row(&mut tx, cart).await?;
        Self::ensure_book_exists(&mut tx, book_id).await?;

        let current = Self::current_line_quantity(&mut tx, cart, book_id).await?;
        let line = Self::write_line(&mut tx, cart, book_id, quantity, current.is_some()).await?;

        tx.commit().await?;
        Ok(line)
    }

    async fn remove_line(&self, cart: &CartHandle, book_id: &BookId) -> Result<()> {
        let mut tx = self.begin_tx().await?;
        Self::lock_cart_row(&mut tx, cart).await?;
        sqlx::query("DELETE FROM cart_lines WHERE cart_id = $1 AND isbn = $2")
            .bind(cart.id.as_uuid())
            .bind(book_id.as_str())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn clear(&self, cart: &CartHandle) -> Result<()> {
        let mut tx = self.begin_tx().await?;
        Self::lock_cart_row(&mut tx, cart).await?;
        sqlx::query("DELETE FROM cart_lines WHERE cart_id = $1")
            .bind(cart.id.as_uuid())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl InventoryLedger for PostgresStore {
    async fn register_book(&self, book: Book) -> Result<()> {
        validate_book(&book)?;

        // stock_qty is only written on insert; sales and restocks own it after that
        sqlx::query(
            r#"
            INSERT INTO books (isbn, title, price_cents, stock_qty, threshold, supplier_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (isbn) DO UPDATE SET
                title = EXCLUDED.title,
                price_cents = EXCLUDED.price_cents,
                threshold = EXCLUDED.threshold,
                supplier_id = EXCLUDED.supplier_id
            "#,
        )
        .bind(book.id.as_str())
        .bind(&book.title)
        .bind(book.price.cents())
        .bind(to_i32(book.stock)?)
        .bind(to_i32(book.threshold)?)
        .bind(&book.supplier_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_book(&self, book_id: &BookId) -> Result<Option<Book>> {
        let row = sqlx::query(
            "SELECT isbn, title, price_cents, stock_qty, threshold, supplier_id FROM books WHERE isbn = $1",
        )
        .bind(book_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_book).transpose()
    }

    async fn remove_book(&self, book_id: &BookId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM books WHERE isbn = $1")
            .bind(book_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn restock(&self, book_id: &BookId, quantity: u32) -> Result<u32> {
        let mut tx = self.begin_tx().await?;
        let stock = Self::add_to_stock(&mut tx, book_id, quantity)
            .await?
            .ok_or_else(|| StorageError::BookNotFound(book_id.clone()))?;
        tx.commit().await?;
        Ok(stock)
    }
}

#[async_trait]
impl OrderLedger for PostgresStore {
    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(
            r#"
            SELECT id, customer_id, total_cents, payment_method, card_last4, card_expiry, created_at
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let mut lines = self.load_lines(&[order_id.as_uuid()]).await?;
                let lines = lines.remove(&order_id.as_uuid()).unwrap_or_default();
                Ok(Some(Self::row_to_order(&row, lines)?))
            }
            None => Ok(None),
        }
    }

    async fn orders_for_customer(&self, customer_id: CustomerId) -> Result<Vec<Order>> {
        let rows = sqlx::query(
            r#"
            SELECT id, customer_id, total_cents, payment_method, card_last4, card_expiry, created_at
            FROM orders
            WHERE customer_id = $1
            ORDER BY created_at DESC, id ASC
            "#,
        )
        .bind(customer_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids = rows
            .iter()
            .map(|row| row.try_get::<Uuid, _>("id"))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let mut lines = self.load_lines(&ids).await?;

        rows.iter()
            .zip(ids)
            .map(|(row, id)| Self::row_to_order(row, lines.remove(&id).unwrap_or_default()))
            .collect()
    }

    async fn list_orders(&self, page: PageRequest) -> Result<OrderPage> {
        let rows = sqlx::query(
            r#"
            SELECT o.id, o.customer_id, o.total_cents, o.payment_method, o.card_last4,
                   o.created_at, COUNT(s.id) AS line_count
            FROM orders o
            LEFT JOIN sales s ON s.order_id = o.id
            GROUP BY o.id
            ORDER BY o.created_at DESC, o.id ASC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(i64::from(page.limit()))
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
            .fetch_one(&self.pool)
            .await?;
        let total = total as u64;

        let orders = rows
            .iter()
            .map(|row| -> Result<OrderSummary> {
                Ok(OrderSummary {
                    id: OrderId::from_uuid(row.try_get("id")?),
                    customer_id: CustomerId::from_uuid(row.try_get("customer_id")?),
                    total: Money::from_cents(row.try_get("total_cents")?),
                    payment_method: row.try_get("payment_method")?,
                    card_last4: row.try_get("card_last4")?,
                    created_at: row.try_get("created_at")?,
                    line_count: row.try_get::<i64, _>("line_count")? as u32,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(OrderPage {
            orders,
            total,
            page: page.page(),
            pages: page.page_count(total),
        })
    }

    async fn sales_for_order(&self, order_id: OrderId) -> Result<Vec<SaleRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT order_id, isbn, qty, amount_cents, sold_at
            FROM sales
            WHERE order_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<SaleRecord> {
                Ok(SaleRecord {
                    order_id: OrderId::from_uuid(row.try_get("order_id")?),
                    book_id: BookId::new(row.try_get::<String, _>("isbn")?),
                    quantity: to_u32(row.try_get("qty")?, "sales.qty")?,
                    amount: Money::from_cents(row.try_get("amount_cents")?),
                    sold_at: row.try_get("sold_at")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl ReplenishmentLedger for PostgresStore {
    async fn list_replenishments(
        &self,
        status: Option<ReplenishmentStatus>,
    ) -> Result<Vec<ReplenishmentRequest>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {REPLENISHMENT_COLUMNS}
            FROM replenishment_requests
            WHERE ($1::TEXT IS NULL OR status = $1)
            ORDER BY created_at ASC, id ASC
            "#
        ))
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_replenishment).collect()
    }

    async fn resolve_replenishment(
        &self,
        id: ReplenishmentId,
        status: ReplenishmentStatus,
    ) -> Result<ReplenishmentRequest> {
        let mut tx = self.begin_tx().await?;

        let row = sqlx::query(&format!(
            "SELECT {REPLENISHMENT_COLUMNS} FROM replenishment_requests WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StorageError::ReplenishmentNotFound(id))?;
        let current = Self::row_to_replenishment(&row)?;

        if current.status != ReplenishmentStatus::Pending || status == ReplenishmentStatus::Pending
        {
            return Err(StorageError::InvalidReplenishmentTransition {
                id,
                from: current.status,
                to: status,
            });
        }

        let row = sqlx::query(&format!(
            r#"
            UPDATE replenishment_requests
            SET status = $2, resolved_at = $3
            WHERE id = $1
            RETURNING {REPLENISHMENT_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(status.as_str())
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;
        let resolved = Self::row_to_replenishment(&row)?;

        if status == ReplenishmentStatus::Fulfilled {
            Self::add_to_stock(&mut tx, &resolved.book_id, resolved.quantity).await?;
        }

        tx.commit().await?;
        tracing::info!(
            replenishment_id = %resolved.id,
            book_id = %resolved.book_id,
            status = %resolved.status,
            "replenishment resolved"
        );
        Ok(resolved)
    }
}

/// A checkout transaction on a pooled PostgreSQL connection.
///
/// Dropping it without `commit` rolls back.
pub struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl CheckoutStore for PostgresStore {
    type Tx = PostgresTransaction;

    async fn begin(&self) -> Result<PostgresTransaction> {
        Ok(PostgresTransaction {
            tx: self.begin_tx().await?,
        })
    }
}

#[async_trait]
impl CheckoutTransaction for PostgresTransaction {
    async fn lock_cart(&mut self, customer_id: CustomerId) -> Result<Option<CartHandle>> {
        let id: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM carts WHERE customer_id = $1 FOR UPDATE")
                .bind(customer_id.as_uuid())
                .fetch_optional(&mut *self.tx)
                .await?;

        Ok(id.map(|id| CartHandle {
            id: CartId::from_uuid(id),
            customer_id,
        }))
    }

    async fn cart_lines(&mut self, cart: &CartHandle) -> Result<Vec<CartLine>> {
        let rows = sqlx::query(
            "SELECT isbn, qty FROM cart_lines WHERE cart_id = $1 ORDER BY line_seq ASC",
        )
        .bind(cart.id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.iter()
            .map(|row| -> Result<CartLine> {
                Ok(CartLine {
                    book_id: BookId::new(row.try_get::<String, _>("isbn")?),
                    quantity: to_u32(row.try_get("qty")?, "cart_lines.qty")?,
                })
            })
            .collect()
    }

    async fn lock_and_fetch(&mut self, book_ids: &[BookId]) -> Result<Vec<InventorySnapshot>> {
        let ids = lock_order(book_ids);
        let keys: Vec<String> = ids.iter().map(|id| id.as_str().to_string()).collect();

        // Byte-order collation matches the Rust sort, so every transaction
        // acquires the rows in the same order.
        let rows = sqlx::query(
            r#"
            SELECT isbn, title, price_cents, stock_qty, threshold, supplier_id
            FROM books
            WHERE isbn = ANY($1)
            ORDER BY isbn COLLATE "C" ASC
            FOR UPDATE
            "#,
        )
        .bind(&keys)
        .fetch_all(&mut *self.tx)
        .await?;

        let mut books: HashMap<BookId, Book> = rows
            .iter()
            .map(|row| PostgresStore::row_to_book(row).map(|b| (b.id.clone(), b)))
            .collect::<Result<_>>()?;

        ids.into_iter()
            .map(|id| {
                books
                    .remove(&id)
                    .map(|book| InventorySnapshot::from(&book))
                    .ok_or(StorageError::BookNotFound(id))
            })
            .collect()
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, customer_id, total_cents, payment_method, card_last4, card_expiry, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.customer_id.as_uuid())
        .bind(order.total.cents())
        .bind(order.payment.method())
        .bind(order.payment.card_last4())
        .bind(order.payment.card_expiry())
        .bind(order.created_at)
        .execute(&mut *self.tx)
        .await?;

        for (line_no, line) in order.lines.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_lines (order_id, line_no, isbn, title, unit_price_cents, qty)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(order.id.as_uuid())
            .bind(line_no as i32)
            .bind(line.book_id.as_str())
            .bind(&line.title)
            .bind(line.unit_price.cents())
            .bind(to_i32(line.quantity)?)
            .execute(&mut *self.tx)
            .await?;
        }

        for sale in order.sale_records() {
            sqlx::query(
                r#"
                INSERT INTO sales (order_id, isbn, qty, amount_cents, sold_at)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(sale.order_id.as_uuid())
            .bind(sale.book_id.as_str())
            .bind(to_i32(sale.quantity)?)
            .bind(sale.amount.cents())
            .bind(sale.sold_at)
            .execute(&mut *self.tx)
            .await?;
        }

        Ok(())
    }

    async fn decrement_stock(&mut self, book_id: &BookId, quantity: u32) -> Result<u32> {
        let stock: Option<i32> = sqlx::query_scalar(
            "UPDATE books SET stock_qty = stock_qty - $1 WHERE isbn = $2 RETURNING stock_qty",
        )
        .bind(to_i32(quantity)?)
        .bind(book_id.as_str())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_check_violation()
            {
                return StorageError::StockUnderflow(book_id.clone());
            }
            StorageError::from(e)
        })?;

        let stock = stock.ok_or_else(|| StorageError::BookNotFound(book_id.clone()))?;
        to_u32(stock, "books.stock_qty")
    }

    async fn insert_pending_replenishment(
        &mut self,
        request: NewReplenishment,
    ) -> Result<Option<ReplenishmentRequest>> {
        let pending = request.into_pending(Utc::now());

        // The partial unique index turns check-then-insert into one statement
        let inserted: Option<Uuid> = sqlx::query_scalar(
            r#"
            INSERT INTO replenishment_requests (id, isbn, supplier_id, quantity, status, created_at)
            VALUES ($1, $2, $3, $4, 'Pending', $5)
            ON CONFLICT (isbn) WHERE status = 'Pending' DO NOTHING
            RETURNING id
            "#,
        )
        .bind(pending.id.as_uuid())
        .bind(pending.book_id.as_str())
        .bind(&pending.supplier_id)
        .bind(to_i32(pending.quantity)?)
        .bind(pending.created_at)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(inserted.map(|_| pending))
    }

    async fn clear_cart(&mut self, cart: &CartHandle) -> Result<()> {
        sqlx::query("DELETE FROM cart_lines WHERE cart_id = $1")
            .bind(cart.id.as_uuid())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
