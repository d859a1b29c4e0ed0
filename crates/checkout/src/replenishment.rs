//! Low-stock replenishment trigger.

use storage::{
    CheckoutTransaction, InventorySnapshot, MAX_STOCK, NewReplenishment, ReplenishmentRequest,
    StorageError,
};

/// Default reorder size as a multiple of the book's threshold.
pub const DEFAULT_REORDER_MULTIPLIER: u32 = 3;

/// Decides when and how much to reorder after a sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplenishmentPolicy {
    pub reorder_multiplier: u32,
}

impl Default for ReplenishmentPolicy {
    fn default() -> Self {
        Self {
            reorder_multiplier: DEFAULT_REORDER_MULTIPLIER,
        }
    }
}

impl ReplenishmentPolicy {
    pub fn new(reorder_multiplier: u32) -> Self {
        Self { reorder_multiplier }
    }

    /// Returns the quantity to request, or None when no request is due.
    ///
    /// A threshold of zero disables replenishment for the book.
    pub fn reorder_quantity(&self, post_sale_stock: u32, threshold: u32) -> Option<u32> {
        if threshold == 0 || post_sale_stock > threshold {
            return None;
        }
        Some(
            threshold
                .saturating_mul(self.reorder_multiplier.max(1))
                .min(MAX_STOCK),
        )
    }
}

/// Raises a Pending request for the book if its post-sale stock is at or
/// below the threshold and none is already open.
///
/// Runs inside the checkout transaction so the request commits or rolls
/// back with the sale.
pub async fn maybe_request_replenishment<T: CheckoutTransaction>(
    tx: &mut T,
    policy: &ReplenishmentPolicy,
    snapshot: &InventorySnapshot,
    post_sale_stock: u32,
) -> Result<Option<ReplenishmentRequest>, StorageError> {
    let Some(quantity) = policy.reorder_quantity(post_sale_stock, snapshot.threshold) else {
        return Ok(None);
    };

    let inserted = tx
        .insert_pending_replenishment(NewReplenishment {
            book_id: snapshot.book_id.clone(),
            supplier_id: snapshot.supplier_id.clone(),
            quantity,
        })
        .await?;

    match &inserted {
        Some(request) => {
            metrics::counter!("replenishment_requests_created_total").increment(1);
            tracing::info!(
                book_id = %request.book_id,
                supplier_id = %request.supplier_id,
                quantity = request.quantity,
                post_sale_stock,
                "replenishment requested"
            );
        }
        None => {
            tracing::debug!(
                book_id = %snapshot.book_id,
                post_sale_stock,
                "replenishment already pending"
            );
        }
    }

    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{BookId, Money};
    use storage::{Book, CheckoutStore, InMemoryStore, InventoryLedger, ReplenishmentLedger};

    #[test]
    fn reorders_at_or_below_threshold() {
        let policy = ReplenishmentPolicy::default();
        assert_eq!(policy.reorder_quantity(3, 3), Some(9));
        assert_eq!(policy.reorder_quantity(0, 3), Some(9));
        assert_eq!(policy.reorder_quantity(4, 3), None);
    }

    #[test]
    fn zero_threshold_never_reorders() {
        let policy = ReplenishmentPolicy::default();
        assert_eq!(policy.reorder_quantity(0, 0), None);
    }

    #[test]
    fn custom_multiplier() {
        assert_eq!(ReplenishmentPolicy::new(5).reorder_quantity(1, 2), Some(10));
        assert_eq!(ReplenishmentPolicy::new(0).reorder_quantity(1, 2), Some(2));
    }

    #[test]
    fn reorder_quantity_stays_storable() {
        let policy = ReplenishmentPolicy::default();
        assert_eq!(policy.reorder_quantity(0, MAX_STOCK), Some(MAX_STOCK));
    }

    fn snapshot(threshold: u32) -> InventorySnapshot {
        InventorySnapshot::from(&Book::new(
            "A",
            "Title A",
            Money::from_cents(1000),
            5,
            threshold,
            "SUP-1",
        ))
    }

    #[tokio::test]
    async fn second_trigger_is_deduplicated() {
        let store = InMemoryStore::new();
        store
            .register_book(Book::new("A", "Title A", Money::from_cents(1000), 5, 3, "SUP-1"))
            .await
            .unwrap();
        let policy = ReplenishmentPolicy::default();

        let mut tx = store.begin().await.unwrap();
        let first = maybe_request_replenishment(&mut tx, &policy, &snapshot(3), 2)
            .await
            .unwrap();
        let second = maybe_request_replenishment(&mut tx, &policy, &snapshot(3), 1)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let first = first.expect("first trigger inserts");
        assert_eq!(first.book_id, BookId::new("A"));
        assert_eq!(first.quantity, 9);
        assert!(second.is_none());
        assert_eq!(store.list_replenishments(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn above_threshold_writes_nothing() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let inserted = maybe_request_replenishment(
            &mut tx,
            &ReplenishmentPolicy::default(),
            &snapshot(3),
            4,
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();

        assert!(inserted.is_none());
        assert!(store.list_replenishments(None).await.unwrap().is_empty());
    }
}
