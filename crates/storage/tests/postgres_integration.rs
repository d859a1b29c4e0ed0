//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p storage --test postgres_integration
//! ```

use std::sync::Arc;
use std::time::Duration;

use common::{BookId, CustomerId, MAX_PRICE_CENTS, Money, OrderId};
use serial_test::serial;
use sqlx::PgPool;
use storage::{
    Book, CartStore, CheckoutStore, CheckoutTransaction, InventoryLedger, MAX_STOCK,
    NewReplenishment, Order, OrderLedger, OrderLine, PageRequest, PaymentDescriptor,
    PostgresStore, ReplenishmentLedger, ReplenishmentStatus, StorageError,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_bookstore_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(8)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query(
        "TRUNCATE TABLE sales, order_lines, orders, cart_lines, carts, \
         replenishment_requests, books",
    )
    .execute(&pool)
    .await
    .unwrap();

    PostgresStore::new(pool).with_lock_timeout(Duration::from_millis(200))
}

fn book(id: &str, price_cents: i64, stock: u32, threshold: u32) -> Book {
    Book::new(
        id,
        format!("Book {id}"),
        Money::from_cents(price_cents),
        stock,
        threshold,
        "SUP-1",
    )
}

fn order_for(customer_id: CustomerId, lines: Vec<OrderLine>) -> Order {
    let total = lines.iter().map(OrderLine::line_total).sum();
    Order {
        id: OrderId::new(),
        customer_id,
        total,
        payment: PaymentDescriptor::Card {
            last4: "4242".to_string(),
            expiry: "12/30".to_string(),
        },
        created_at: chrono::Utc::now(),
        lines,
    }
}

#[tokio::test]
#[serial]
async fn test_register_and_get_book() {
    let store = get_test_store().await;
    store.register_book(book("A", 1000, 5, 3)).await.unwrap();

    let loaded = store.get_book(&BookId::new("A")).await.unwrap().unwrap();
    assert_eq!(loaded.price, Money::from_cents(1000));
    assert_eq!(loaded.stock, 5);

    // Re-registering edits the catalog fields but keeps stock
    store.register_book(book("A", 1200, 7, 2)).await.unwrap();
    let loaded = store.get_book(&BookId::new("A")).await.unwrap().unwrap();
    assert_eq!(loaded.price, Money::from_cents(1200));
    assert_eq!(loaded.threshold, 2);
    assert_eq!(loaded.stock, 5);

    let err = store
        .register_book(book("B", MAX_PRICE_CENTS + 1, 1, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::InvalidPrice { .. }));

    assert!(store.remove_book(&BookId::new("A")).await.unwrap());
    assert!(!store.remove_book(&BookId::new("A")).await.unwrap());
    assert!(store.get_book(&BookId::new("A")).await.unwrap().is_none());
}

#[tokio::test]
#[serial]
async fn test_cart_upsert_merge_and_bounds() {
    let store = get_test_store().await;
    store.register_book(book("A", 1000, 5, 3)).await.unwrap();
    store.register_book(book("B", 550, 5, 0)).await.unwrap();

    let customer = CustomerId::new();
    let cart = store.get_or_create_cart(customer).await.unwrap();
    assert_eq!(store.get_or_create_cart(customer).await.unwrap().id, cart.id);

    store.upsert_line(&cart, &BookId::new("B"), 1).await.unwrap();
    store.upsert_line(&cart, &BookId::new("A"), 2).await.unwrap();
    let merged = store.upsert_line(&cart, &BookId::new("A"), 3).await.unwrap();
    assert_eq!(merged.quantity, 5);

    let err = store
        .upsert_line(&cart, &BookId::new("A"), 96)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::InvalidQuantity { quantity: 101 }));

    let err = store
        .upsert_line(&cart, &BookId::new("Z"), 1)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::BookNotFound(_)));

    let lines = store.list_lines(&cart).await.unwrap();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].book_id, BookId::new("B"));
    assert_eq!(lines[1].quantity, 5);
    assert_eq!(lines[1].line_total, Money::from_cents(5000));

    store.set_line(&cart, &BookId::new("A"), 1).await.unwrap();
    store.remove_line(&cart, &BookId::new("B")).await.unwrap();
    store.remove_line(&cart, &BookId::new("B")).await.unwrap();
    let lines = store.list_lines(&cart).await.unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].quantity, 1);

    store.clear(&cart).await.unwrap();
    store.clear(&cart).await.unwrap();
    assert!(store.list_lines(&cart).await.unwrap().is_empty());
}

#[tokio::test]
#[serial]
async fn test_concurrent_get_or_create_returns_one_cart() {
    let store = get_test_store().await;
    let customer = CustomerId::new();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.get_or_create_cart(customer).await.unwrap() })
        })
        .collect();
    let carts = futures_util::future::join_all(handles).await;

    let first = carts[0].as_ref().unwrap().id;
    assert!(carts.iter().all(|c| c.as_ref().unwrap().id == first));
}

#[tokio::test]
#[serial]
async fn test_transaction_writes_order_and_decrements_stock() {
    let store = get_test_store().await;
    store.register_book(book("A", 1000, 5, 3)).await.unwrap();
    store.register_book(book("B", 550, 5, 0)).await.unwrap();
    let customer = CustomerId::new();

    let mut tx = store.begin().await.unwrap();
    let snapshots = tx
        .lock_and_fetch(&[BookId::new("B"), BookId::new("A")])
        .await
        .unwrap();
    assert_eq!(snapshots[0].book_id, BookId::new("A"));
    assert_eq!(snapshots[1].book_id, BookId::new("B"));

    let order = order_for(
        customer,
        vec![
            OrderLine {
                book_id: BookId::new("A"),
                title: "Book A".to_string(),
                unit_price: Money::from_cents(1000),
                quantity: 2,
            },
            OrderLine {
                book_id: BookId::new("B"),
                title: "Book B".to_string(),
                unit_price: Money::from_cents(550),
                quantity: 1,
            },
        ],
    );
    tx.insert_order(&order).await.unwrap();
    assert_eq!(tx.decrement_stock(&BookId::new("A"), 2).await.unwrap(), 3);
    assert_eq!(tx.decrement_stock(&BookId::new("B"), 1).await.unwrap(), 4);
    tx.commit().await.unwrap();

    let loaded = store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(loaded.total, Money::from_cents(2550));
    assert_eq!(loaded.lines, order.lines);
    assert_eq!(loaded.payment, order.payment);

    let sales = store.sales_for_order(order.id).await.unwrap();
    assert_eq!(sales.len(), 2);

    let history = store.orders_for_customer(customer).await.unwrap();
    assert_eq!(history.len(), 1);

    let page = store.list_orders(PageRequest::new(1, 10)).await.unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.orders[0].line_count, 2);
}

#[tokio::test]
#[serial]
async fn test_rollback_discards_writes() {
    let store = get_test_store().await;
    store.register_book(book("A", 1000, 5, 3)).await.unwrap();

    let mut tx = store.begin().await.unwrap();
    tx.lock_and_fetch(&[BookId::new("A")]).await.unwrap();
    tx.decrement_stock(&BookId::new("A"), 4).await.unwrap();
    tx.rollback().await.unwrap();

    let book = store.get_book(&BookId::new("A")).await.unwrap().unwrap();
    assert_eq!(book.stock, 5);
}

#[tokio::test]
#[serial]
async fn test_decrement_below_zero_is_rejected() {
    let store = get_test_store().await;
    store.register_book(book("A", 1000, 1, 0)).await.unwrap();

    let mut tx = store.begin().await.unwrap();
    let err = tx.decrement_stock(&BookId::new("A"), 2).await.unwrap_err();
    assert!(matches!(err, StorageError::StockUnderflow(_)));
}

#[tokio::test]
#[serial]
async fn test_lock_and_fetch_reports_missing_book() {
    let store = get_test_store().await;
    store.register_book(book("A", 1000, 1, 0)).await.unwrap();

    let mut tx = store.begin().await.unwrap();
    let err = tx
        .lock_and_fetch(&[BookId::new("A"), BookId::new("Q")])
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::BookNotFound(ref id) if id.as_str() == "Q"));
}

#[tokio::test]
#[serial]
async fn test_held_row_lock_times_out() {
    let store = get_test_store().await;
    store.register_book(book("A", 1000, 5, 0)).await.unwrap();

    let mut holder = store.begin().await.unwrap();
    holder.lock_and_fetch(&[BookId::new("A")]).await.unwrap();

    let mut waiter = store.begin().await.unwrap();
    let err = waiter
        .lock_and_fetch(&[BookId::new("A")])
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::LockTimeout));

    holder.rollback().await.unwrap();
}

#[tokio::test]
#[serial]
async fn test_pending_replenishment_is_unique_per_book() {
    let store = get_test_store().await;
    store.register_book(book("A", 1000, 5, 3)).await.unwrap();
    let request = NewReplenishment {
        book_id: BookId::new("A"),
        supplier_id: "SUP-1".to_string(),
        quantity: 9,
    };

    let mut tx = store.begin().await.unwrap();
    let first = tx
        .insert_pending_replenishment(request.clone())
        .await
        .unwrap();
    let second = tx
        .insert_pending_replenishment(request.clone())
        .await
        .unwrap();
    tx.commit().await.unwrap();
    let first = first.unwrap();
    assert!(second.is_none());

    // Once fulfilled, a new Pending request may be raised
    let fulfilled = store
        .resolve_replenishment(first.id, ReplenishmentStatus::Fulfilled)
        .await
        .unwrap();
    assert_eq!(fulfilled.status, ReplenishmentStatus::Fulfilled);
    assert!(fulfilled.resolved_at.is_some());
    assert_eq!(
        store.get_book(&BookId::new("A")).await.unwrap().unwrap().stock,
        14
    );

    let err = store
        .resolve_replenishment(first.id, ReplenishmentStatus::Cancelled)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StorageError::InvalidReplenishmentTransition { .. }
    ));

    let mut tx = store.begin().await.unwrap();
    assert!(tx.insert_pending_replenishment(request).await.unwrap().is_some());
    tx.commit().await.unwrap();

    let pending = store
        .list_replenishments(Some(ReplenishmentStatus::Pending))
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(store.list_replenishments(None).await.unwrap().len(), 2);
}

#[tokio::test]
#[serial]
async fn test_restock_adds_units() {
    let store = get_test_store().await;
    store.register_book(book("A", 1000, 2, 0)).await.unwrap();

    assert_eq!(store.restock(&BookId::new("A"), 8).await.unwrap(), 10);
    let err = store.restock(&BookId::new("Z"), 1).await.unwrap_err();
    assert!(matches!(err, StorageError::BookNotFound(_)));
}

#[tokio::test]
#[serial]
async fn test_restock_refuses_overflow() {
    let store = get_test_store().await;
    let a = BookId::new("A");
    store.register_book(book("A", 1000, 5, 0)).await.unwrap();

    let err = store.restock(&a, u32::MAX).await.unwrap_err();
    assert!(matches!(err, StorageError::StockOverflow { .. }));
    let err = store.restock(&a, MAX_STOCK).await.unwrap_err();
    assert!(matches!(err, StorageError::StockOverflow { .. }));
    assert_eq!(store.get_book(&a).await.unwrap().unwrap().stock, 5);

    assert_eq!(store.restock(&a, MAX_STOCK - 5).await.unwrap(), MAX_STOCK);

    // A fulfilment that would overflow leaves the request Pending
    let mut tx = store.begin().await.unwrap();
    let request = tx
        .insert_pending_replenishment(NewReplenishment {
            book_id: a.clone(),
            supplier_id: "SUP-1".to_string(),
            quantity: 9,
        })
        .await
        .unwrap()
        .unwrap();
    tx.commit().await.unwrap();

    let err = store
        .resolve_replenishment(request.id, ReplenishmentStatus::Fulfilled)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::StockOverflow { .. }));
    let pending = store
        .list_replenishments(Some(ReplenishmentStatus::Pending))
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
}

#[tokio::test]
#[serial]
async fn test_catalog_edit_after_sale_keeps_stock() {
    let store = get_test_store().await;
    let a = BookId::new("A");
    store.register_book(book("A", 1000, 5, 0)).await.unwrap();

    let mut tx = store.begin().await.unwrap();
    tx.lock_and_fetch(std::slice::from_ref(&a)).await.unwrap();
    assert_eq!(tx.decrement_stock(&a, 2).await.unwrap(), 3);
    tx.commit().await.unwrap();

    let mut edited = book("A", 1100, 5, 0);
    edited.title = "Alpha 2nd ed".to_string();
    store.register_book(edited).await.unwrap();

    let loaded = store.get_book(&a).await.unwrap().unwrap();
    assert_eq!(loaded.stock, 3);
    assert_eq!(loaded.title, "Alpha 2nd ed");
}
