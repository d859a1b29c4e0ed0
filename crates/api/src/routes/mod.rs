//! Route handlers.

pub mod books;
pub mod cart;
pub mod checkout;
pub mod health;
pub mod identity;
pub mod metrics;
pub mod orders;
pub mod replenishments;
