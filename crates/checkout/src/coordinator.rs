//! Checkout coordinator: converts a cart into an order in one transaction.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::{BookId, CustomerId, Money, OrderId};
use serde::{Deserialize, Serialize};
use storage::{CheckoutStore, CheckoutTransaction, InventorySnapshot, Order, OrderLine, Storage};

use crate::error::{CheckoutAborted, CheckoutError};
use crate::payment::PaymentRequest;
use crate::replenishment::{ReplenishmentPolicy, maybe_request_replenishment};
use crate::stage::CheckoutStage;

/// Result of a committed checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutReceipt {
    pub order_id: OrderId,
    pub total: Money,
}

/// Runs checkouts against a storage backend.
///
/// Each checkout locks the customer's cart and every book it references
/// in ascending id order, so concurrent checkouts sharing books cannot
/// deadlock or oversell. Any failure after the transaction opened rolls
/// back every write.
#[derive(Clone)]
pub struct CheckoutCoordinator<S: Storage> {
    store: S,
    policy: ReplenishmentPolicy,
}

impl<S: Storage> CheckoutCoordinator<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            policy: ReplenishmentPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: ReplenishmentPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Checks out the customer's cart.
    #[tracing::instrument(skip(self, payment), fields(payment_method = %payment.payment_method))]
    pub async fn checkout(
        &self,
        customer_id: CustomerId,
        payment: &PaymentRequest,
    ) -> Result<CheckoutReceipt, CheckoutAborted> {
        metrics::counter!("checkout_attempts_total").increment(1);
        let started = std::time::Instant::now();

        let result = self.checkout_at(customer_id, payment, Utc::now()).await;

        metrics::histogram!("checkout_duration_seconds").record(started.elapsed().as_secs_f64());
        match &result {
            Ok(receipt) => {
                metrics::counter!("checkout_completed_total").increment(1);
                tracing::info!(
                    order_id = %receipt.order_id,
                    total = %receipt.total,
                    "checkout committed"
                );
            }
            Err(aborted) => {
                metrics::counter!("checkout_aborted_total", "reason" => aborted.reason.kind())
                    .increment(1);
                tracing::warn!(
                    stage = %aborted.stage,
                    reason = aborted.reason.kind(),
                    error = %aborted.reason,
                    "checkout aborted"
                );
            }
        }
        result
    }

    /// Checks out with an explicit clock, used for card expiry and the
    /// order timestamp.
    pub async fn checkout_at(
        &self,
        customer_id: CustomerId,
        payment: &PaymentRequest,
        now: DateTime<Utc>,
    ) -> Result<CheckoutReceipt, CheckoutAborted> {
        let mut stage = CheckoutStage::Validating;
        let descriptor = payment
            .validate(now.date_naive())
            .map_err(|err| CheckoutAborted::new(stage, err))?;

        stage.advance();
        let mut tx = self
            .store
            .begin()
            .await
            .map_err(|err| CheckoutAborted::new(stage, err))?;

        match self
            .run(&mut tx, &mut stage, customer_id, descriptor, now)
            .await
        {
            Ok(order) => {
                tx.commit()
                    .await
                    .map_err(|err| CheckoutAborted::new(stage, err))?;
                stage.advance();
                tracing::debug!(order_id = %order.id, %stage, "checkout transaction closed");
                Ok(CheckoutReceipt {
                    order_id: order.id,
                    total: order.total,
                })
            }
            Err(reason) => {
                if let Err(err) = tx.rollback().await {
                    tracing::warn!(error = %err, "checkout rollback failed");
                }
                Err(CheckoutAborted { stage, reason })
            }
        }
    }

    async fn run(
        &self,
        tx: &mut <S as CheckoutStore>::Tx,
        stage: &mut CheckoutStage,
        customer_id: CustomerId,
        payment: storage::PaymentDescriptor,
        now: DateTime<Utc>,
    ) -> Result<Order, CheckoutError> {
        // Locking
        let cart = tx
            .lock_cart(customer_id)
            .await?
            .ok_or(CheckoutError::EmptyCart)?;
        let lines = tx.cart_lines(&cart).await?;
        if lines.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        let book_ids: Vec<BookId> = lines.iter().map(|line| line.book_id.clone()).collect();
        let snapshots: HashMap<BookId, InventorySnapshot> = tx
            .lock_and_fetch(&book_ids)
            .await?
            .into_iter()
            .map(|snapshot| (snapshot.book_id.clone(), snapshot))
            .collect();

        stage.advance(); // StockChecking
        for line in &lines {
            let snapshot = snapshots
                .get(&line.book_id)
                .ok_or_else(|| CheckoutError::NotFound(line.book_id.clone()))?;
            if line.quantity > snapshot.stock {
                return Err(CheckoutError::InsufficientStock {
                    book_id: line.book_id.clone(),
                    requested: line.quantity,
                    available: snapshot.stock,
                });
            }
        }

        stage.advance(); // Computing
        let order_lines: Vec<OrderLine> = lines
            .iter()
            .filter_map(|line| {
                snapshots.get(&line.book_id).map(|snapshot| OrderLine {
                    book_id: line.book_id.clone(),
                    title: snapshot.title.clone(),
                    unit_price: snapshot.unit_price,
                    quantity: line.quantity,
                })
            })
            .collect();
        let total: Money = order_lines.iter().map(OrderLine::line_total).sum();
        let order = Order {
            id: OrderId::new(),
            customer_id,
            total,
            payment,
            created_at: now,
            lines: order_lines,
        };

        stage.advance(); // Writing
        tx.insert_order(&order).await?;
        for line in &order.lines {
            let post_sale_stock = tx.decrement_stock(&line.book_id, line.quantity).await?;
            if let Some(snapshot) = snapshots.get(&line.book_id) {
                maybe_request_replenishment(&mut *tx, &self.policy, snapshot, post_sale_stock)
                    .await?;
            }
        }
        tx.clear_cart(&cart).await?;

        Ok(order)
    }
}
