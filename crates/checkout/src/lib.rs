//! Cart-to-order checkout for the bookstore.
//!
//! A checkout runs in a single storage transaction:
//! 1. Validate payment details (before any lock is taken)
//! 2. Lock the cart and every referenced book in ascending id order
//! 3. Check stock, compute the total
//! 4. Write the order and sales, decrement stock, raise replenishment
//!    requests for books at or below their threshold, clear the cart
//!
//! Any failure rolls the whole transaction back.

pub mod cart;
pub mod coordinator;
pub mod error;
pub mod payment;
pub mod replenishment;
pub mod stage;

pub use cart::{CartService, CartView};
pub use coordinator::{CheckoutCoordinator, CheckoutReceipt};
pub use error::{CheckoutAborted, CheckoutError};
pub use payment::{PaymentError, PaymentRequest};
pub use replenishment::{DEFAULT_REORDER_MULTIPLIER, ReplenishmentPolicy};
pub use stage::CheckoutStage;
