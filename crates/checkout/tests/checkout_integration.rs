//! Integration tests for the checkout transaction over the in-memory store.

use std::time::Duration;

use checkout::{
    CartService, CheckoutCoordinator, CheckoutError, CheckoutStage, PaymentRequest,
};
use common::{BookId, CustomerId, Money};
use futures_util::future::join_all;
use storage::{
    Book, CheckoutStore, InMemoryStore, InventoryLedger, OrderLedger, PaymentDescriptor,
    ReplenishmentLedger, ReplenishmentStatus,
};

struct TestHarness {
    store: InMemoryStore,
    carts: CartService<InMemoryStore>,
    coordinator: CheckoutCoordinator<InMemoryStore>,
}

impl TestHarness {
    fn new() -> Self {
        Self::with_store(InMemoryStore::new())
    }

    fn with_store(store: InMemoryStore) -> Self {
        Self {
            carts: CartService::new(store.clone()),
            coordinator: CheckoutCoordinator::new(store.clone()),
            store,
        }
    }

    async fn add_book(&self, id: &str, price_cents: i64, stock: u32, threshold: u32) {
        self.store
            .register_book(Book::new(
                id,
                format!("Book {id}"),
                Money::from_cents(price_cents),
                stock,
                threshold,
                "SUP-1",
            ))
            .await
            .unwrap();
    }

    async fn stock(&self, id: &str) -> u32 {
        self.store
            .get_book(&BookId::new(id))
            .await
            .unwrap()
            .expect("book exists")
            .stock
    }

    async fn cart_with(&self, lines: &[(&str, i64)]) -> CustomerId {
        let customer = CustomerId::new();
        for (book, qty) in lines {
            self.carts
                .add_line(customer, &BookId::new(*book), *qty)
                .await
                .unwrap();
        }
        customer
    }
}

fn valid_card() -> PaymentRequest {
    PaymentRequest::card("4111 1111 1111 1111", "123", "12/99")
}

#[tokio::test]
async fn test_successful_checkout_with_replenishment() {
    let h = TestHarness::new();
    h.add_book("A", 1000, 5, 3).await;
    h.add_book("B", 550, 5, 0).await;
    let customer = h.cart_with(&[("A", 2), ("B", 1)]).await;

    let receipt = h.coordinator.checkout(customer, &valid_card()).await.unwrap();

    assert_eq!(receipt.total, Money::from_cents(2550));
    assert_eq!(h.stock("A").await, 3);
    assert_eq!(h.stock("B").await, 4);
    assert!(h.carts.view(customer).await.unwrap().lines.is_empty());

    let pending = h
        .store
        .list_replenishments(Some(ReplenishmentStatus::Pending))
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].book_id, BookId::new("A"));
    assert_eq!(pending[0].quantity, 9);

    let order = h
        .store
        .get_order(receipt.order_id)
        .await
        .unwrap()
        .expect("order stored");
    assert_eq!(order.customer_id, customer);
    assert_eq!(order.lines.len(), 2);
    assert_eq!(order.lines[0].book_id, BookId::new("A"));
    assert_eq!(order.lines[0].unit_price, Money::from_cents(1000));
    assert_eq!(
        order.payment,
        PaymentDescriptor::Card {
            last4: "1111".to_string(),
            expiry: "12/99".to_string(),
        }
    );

    let sales = h.store.sales_for_order(receipt.order_id).await.unwrap();
    assert_eq!(sales.len(), 2);
    let sold: Money = sales.iter().map(|sale| sale.amount).sum();
    assert_eq!(sold, receipt.total);
}

#[tokio::test]
async fn test_insufficient_stock_changes_nothing() {
    let h = TestHarness::new();
    h.add_book("A", 1000, 1, 3).await;
    let customer = h.cart_with(&[("A", 2)]).await;

    let aborted = h
        .coordinator
        .checkout(customer, &valid_card())
        .await
        .unwrap_err();

    assert_eq!(aborted.stage, CheckoutStage::StockChecking);
    assert!(matches!(
        aborted.reason,
        CheckoutError::InsufficientStock {
            requested: 2,
            available: 1,
            ..
        }
    ));
    assert_eq!(h.stock("A").await, 1);
    let view = h.carts.view(customer).await.unwrap();
    assert_eq!(view.lines.len(), 1);
    assert_eq!(view.lines[0].quantity, 2);
    assert_eq!(h.store.order_count().await, 0);
    assert!(h.store.list_replenishments(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_payment_validation_opens_no_transaction() {
    let store = InMemoryStore::new().with_lock_timeout(Duration::from_millis(50));
    let h = TestHarness::with_store(store);
    h.add_book("A", 1000, 5, 0).await;
    let customer = h.cart_with(&[("A", 1)]).await;

    // Hold the store's only transaction; a checkout that tried to open one
    // would fail with LockTimeout instead.
    let held = h.store.begin().await.unwrap();

    let aborted = h
        .coordinator
        .checkout(customer, &PaymentRequest::card("123", "123", "12/99"))
        .await
        .unwrap_err();

    assert_eq!(aborted.stage, CheckoutStage::Validating);
    assert!(matches!(
        aborted.reason,
        CheckoutError::PaymentValidation(_)
    ));
    drop(held);
    assert_eq!(h.stock("A").await, 5);
}

#[tokio::test]
async fn test_checkout_times_out_behind_held_lock() {
    let store = InMemoryStore::new().with_lock_timeout(Duration::from_millis(50));
    let h = TestHarness::with_store(store);
    h.add_book("A", 1000, 5, 0).await;
    let customer = h.cart_with(&[("A", 1)]).await;

    let held = h.store.begin().await.unwrap();
    let aborted = h
        .coordinator
        .checkout(customer, &valid_card())
        .await
        .unwrap_err();
    drop(held);

    assert!(matches!(aborted.reason, CheckoutError::LockTimeout));
    assert!(aborted.reason.is_retryable());
}

#[tokio::test]
async fn test_empty_cart_is_rejected() {
    let h = TestHarness::new();

    // Never had a cart
    let aborted = h
        .coordinator
        .checkout(CustomerId::new(), &PaymentRequest::cash_on_delivery())
        .await
        .unwrap_err();
    assert!(matches!(aborted.reason, CheckoutError::EmptyCart));

    // Cart exists but is empty
    let customer = CustomerId::new();
    h.carts.view(customer).await.unwrap();
    let aborted = h
        .coordinator
        .checkout(customer, &PaymentRequest::cash_on_delivery())
        .await
        .unwrap_err();
    assert_eq!(aborted.stage, CheckoutStage::Locking);
    assert!(matches!(aborted.reason, CheckoutError::EmptyCart));
}

#[tokio::test]
async fn test_removed_book_aborts_without_partial_writes() {
    let h = TestHarness::new();
    h.add_book("A", 1000, 5, 3).await;
    h.add_book("B", 550, 5, 0).await;
    let customer = h.cart_with(&[("A", 3), ("B", 1)]).await;
    assert!(h.store.remove_book(&BookId::new("B")).await.unwrap());

    let aborted = h
        .coordinator
        .checkout(customer, &valid_card())
        .await
        .unwrap_err();

    assert!(matches!(aborted.reason, CheckoutError::NotFound(ref id) if id.as_str() == "B"));
    assert_eq!(h.stock("A").await, 5);
    assert_eq!(h.store.order_count().await, 0);
    assert!(h.store.list_replenishments(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cash_on_delivery_records_no_card() {
    let h = TestHarness::new();
    h.add_book("A", 1000, 5, 0).await;
    let customer = h.cart_with(&[("A", 1)]).await;

    let receipt = h
        .coordinator
        .checkout(customer, &PaymentRequest::cash_on_delivery())
        .await
        .unwrap();

    let order = h.store.get_order(receipt.order_id).await.unwrap().unwrap();
    assert_eq!(order.payment, PaymentDescriptor::CashOnDelivery);
    assert_eq!(order.payment.card_last4(), None);
}

#[tokio::test]
async fn test_existing_pending_request_is_not_duplicated() {
    let h = TestHarness::new();
    h.add_book("A", 1000, 10, 5).await;

    let first = h.cart_with(&[("A", 6)]).await;
    h.coordinator.checkout(first, &valid_card()).await.unwrap();
    let second = h.cart_with(&[("A", 1)]).await;
    h.coordinator.checkout(second, &valid_card()).await.unwrap();

    assert_eq!(h.stock("A").await, 3);
    let pending = h
        .store
        .list_replenishments(Some(ReplenishmentStatus::Pending))
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].quantity, 15);
}

#[tokio::test]
async fn test_new_request_after_previous_fulfilled() {
    let h = TestHarness::new();
    h.add_book("A", 1000, 4, 3).await;

    let customer = h.cart_with(&[("A", 1)]).await;
    h.coordinator.checkout(customer, &valid_card()).await.unwrap();
    let pending = h.store.list_replenishments(None).await.unwrap();
    assert_eq!(pending.len(), 1);

    h.store
        .resolve_replenishment(pending[0].id, ReplenishmentStatus::Fulfilled)
        .await
        .unwrap();
    assert_eq!(h.stock("A").await, 12);

    // 12 - 9 = 3 is at the threshold again
    let customer = h.cart_with(&[("A", 9)]).await;
    h.coordinator.checkout(customer, &valid_card()).await.unwrap();
    let pending = h
        .store
        .list_replenishments(Some(ReplenishmentStatus::Pending))
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(h.store.list_replenishments(None).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_catalog_edit_after_checkout_keeps_stock() {
    let h = TestHarness::new();
    h.add_book("A", 1000, 5, 0).await;
    let customer = h.cart_with(&[("A", 2)]).await;
    h.coordinator
        .checkout(customer, &PaymentRequest::cash_on_delivery())
        .await
        .unwrap();
    assert_eq!(h.stock("A").await, 3);

    h.store
        .register_book(Book::new(
            "A",
            "Alpha 2nd ed",
            Money::from_cents(1000),
            5,
            0,
            "SUP-1",
        ))
        .await
        .unwrap();
    assert_eq!(h.stock("A").await, 3);
}

#[tokio::test]
async fn test_order_history_newest_first() {
    let h = TestHarness::new();
    h.add_book("A", 1000, 10, 0).await;
    let customer = h.cart_with(&[("A", 1)]).await;
    let first = h.coordinator.checkout(customer, &valid_card()).await.unwrap();

    h.carts
        .add_line(customer, &BookId::new("A"), 2)
        .await
        .unwrap();
    let second = h.coordinator.checkout(customer, &valid_card()).await.unwrap();

    let orders = h.store.orders_for_customer(customer).await.unwrap();
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0].id, second.order_id);
    assert_eq!(orders[1].id, first.order_id);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_checkouts_never_oversell() {
    let h = TestHarness::new();
    h.add_book("A", 1000, 5, 0).await;

    let mut customers = Vec::new();
    for _ in 0..10 {
        customers.push(h.cart_with(&[("A", 1)]).await);
    }

    let results = join_all(customers.iter().map(|customer| {
        let coordinator = h.coordinator.clone();
        let customer = *customer;
        tokio::spawn(async move { coordinator.checkout(customer, &valid_card()).await })
    }))
    .await;

    let mut committed = 0;
    let mut insufficient = 0;
    for result in results {
        match result.unwrap() {
            Ok(_) => committed += 1,
            Err(aborted) => {
                assert!(matches!(
                    aborted.reason,
                    CheckoutError::InsufficientStock { .. }
                ));
                insufficient += 1;
            }
        }
    }

    assert_eq!(committed, 5);
    assert_eq!(insufficient, 5);
    assert_eq!(h.stock("A").await, 0);
    assert_eq!(h.store.order_count().await, 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_threshold_crossings_raise_one_request() {
    let h = TestHarness::new();
    h.add_book("A", 1000, 10, 8).await;
    h.add_book("B", 500, 10, 0).await;

    let mut customers = Vec::new();
    for _ in 0..4 {
        customers.push(h.cart_with(&[("B", 1), ("A", 2)]).await);
    }

    let results = join_all(customers.iter().map(|customer| {
        let coordinator = h.coordinator.clone();
        let customer = *customer;
        tokio::spawn(async move { coordinator.checkout(customer, &valid_card()).await })
    }))
    .await;
    for result in results {
        result.unwrap().unwrap();
    }

    assert_eq!(h.stock("A").await, 2);
    assert_eq!(h.stock("B").await, 6);
    let pending = h
        .store
        .list_replenishments(Some(ReplenishmentStatus::Pending))
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].quantity, 24);
}
