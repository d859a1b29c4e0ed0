//! Cart operations exposed to customers.

use common::{BookId, CustomerId, Money};
use serde::{Deserialize, Serialize};
use storage::{CartHandle, CartLine, CartLineView, CartStore};

use crate::error::Result;

/// A cart with its lines priced at current catalog prices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartView {
    pub cart: CartHandle,
    pub lines: Vec<CartLineView>,
    pub total: Money,
}

/// Cart service wrapping a [`CartStore`].
#[derive(Clone)]
pub struct CartService<S: CartStore> {
    store: S,
}

impl<S: CartStore> CartService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns the customer's cart, creating it on first access.
    #[tracing::instrument(skip(self))]
    pub async fn view(&self, customer_id: CustomerId) -> Result<CartView> {
        let cart = self.store.get_or_create_cart(customer_id).await?;
        let lines = self.store.list_lines(&cart).await?;
        let total = lines.iter().map(|line| line.line_total).sum();
        Ok(CartView { cart, lines, total })
    }

    /// Adds `quantity` units of a book, merging into an existing line.
    #[tracing::instrument(skip(self))]
    pub async fn add_line(
        &self,
        customer_id: CustomerId,
        book_id: &BookId,
        quantity: i64,
    ) -> Result<CartLine> {
        let cart = self.store.get_or_create_cart(customer_id).await?;
        let line = self.store.upsert_line(&cart, book_id, quantity).await?;
        record_mutation("add");
        tracing::debug!(book_id = %line.book_id, quantity = line.quantity, "cart line added");
        Ok(line)
    }

    /// Replaces the quantity of a line.
    #[tracing::instrument(skip(self))]
    pub async fn set_line(
        &self,
        customer_id: CustomerId,
        book_id: &BookId,
        quantity: i64,
    ) -> Result<CartLine> {
        let cart = self.store.get_or_create_cart(customer_id).await?;
        let line = self.store.set_line(&cart, book_id, quantity).await?;
        record_mutation("set");
        Ok(line)
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove_line(&self, customer_id: CustomerId, book_id: &BookId) -> Result<()> {
        let cart = self.store.get_or_create_cart(customer_id).await?;
        self.store.remove_line(&cart, book_id).await?;
        record_mutation("remove");
        Ok(())
    }

    /// Empties the cart. Also used on logout.
    #[tracing::instrument(skip(self))]
    pub async fn clear(&self, customer_id: CustomerId) -> Result<()> {
        let cart = self.store.get_or_create_cart(customer_id).await?;
        self.store.clear(&cart).await?;
        record_mutation("clear");
        Ok(())
    }
}

fn record_mutation(operation: &'static str) {
    metrics::counter!("cart_mutations_total", "operation" => operation).increment(1);
}
