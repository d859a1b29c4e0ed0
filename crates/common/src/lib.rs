//! Shared types for the bookstore checkout core.

mod money;
mod types;

pub use money::{MAX_PRICE_CENTS, Money};
pub use types::{
    BookId, CartId, CustomerId, MAX_LINE_QUANTITY, OrderId, ReplenishmentId,
};
