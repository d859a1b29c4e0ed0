//! Storage for the bookstore checkout core.
//!
//! Carts, inventory, orders and replenishment requests live behind the
//! traits in [`store`]. [`PostgresStore`] is the production backend;
//! [`InMemoryStore`] offers the same transactional guarantees for tests.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod records;
pub mod store;

pub use common::{
    BookId, CartId, CustomerId, MAX_LINE_QUANTITY, MAX_PRICE_CENTS, Money, OrderId, ReplenishmentId,
};
pub use error::{Result, StorageError};
pub use memory::{InMemoryStore, InMemoryTransaction};
pub use postgres::{PostgresStore, PostgresTransaction};
pub use records::{
    Book, CartHandle, CartLine, CartLineView, InventorySnapshot, NewReplenishment, Order,
    OrderLine, OrderPage, OrderSummary, PageRequest, PaymentDescriptor, ReplenishmentRequest,
    ReplenishmentStatus, SaleRecord,
};
pub use store::{
    CartStore, CheckoutStore, CheckoutTransaction, InventoryLedger, OrderLedger,
    MAX_STOCK, ReplenishmentLedger, Storage,
};
