//! Checkout error types.

use common::BookId;
use storage::StorageError;
use thiserror::Error;

use crate::payment::PaymentError;
use crate::stage::CheckoutStage;

/// Why a checkout or cart operation failed.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Payment details were malformed. No transaction was opened.
    #[error("Payment validation failed: {0}")]
    PaymentValidation(#[from] PaymentError),

    /// The cart has no lines.
    #[error("Cart is empty")]
    EmptyCart,

    /// A cart line references a book that is not in the catalog.
    #[error("Book not found: {0}")]
    NotFound(BookId),

    /// A cart line asks for more units than are in stock.
    #[error("Insufficient stock for {book_id}: requested {requested}, available {available}")]
    InsufficientStock {
        book_id: BookId,
        requested: u32,
        available: u32,
    },

    /// A cart line quantity fell outside 1..=100.
    #[error("Invalid quantity: {0} (must be between 1 and 100)")]
    InvalidQuantity(i64),

    /// A row lock could not be acquired in time.
    #[error("Timed out waiting for a lock; retry the checkout")]
    LockTimeout,

    /// Any other storage failure.
    #[error("Persistence error: {0}")]
    Persistence(StorageError),
}

impl CheckoutError {
    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            CheckoutError::PaymentValidation(_) => "payment_validation",
            CheckoutError::EmptyCart => "empty_cart",
            CheckoutError::NotFound(_) => "not_found",
            CheckoutError::InsufficientStock { .. } => "insufficient_stock",
            CheckoutError::InvalidQuantity(_) => "invalid_quantity",
            CheckoutError::LockTimeout => "lock_timeout",
            CheckoutError::Persistence(_) => "persistence",
        }
    }

    /// Returns true if retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CheckoutError::LockTimeout)
    }
}

impl From<StorageError> for CheckoutError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::BookNotFound(book_id) => CheckoutError::NotFound(book_id),
            StorageError::InvalidQuantity { quantity } => CheckoutError::InvalidQuantity(quantity),
            StorageError::LockTimeout => CheckoutError::LockTimeout,
            other => CheckoutError::Persistence(other),
        }
    }
}

/// A checkout that did not commit, with the stage it stopped in.
///
/// Nothing the checkout wrote is visible after this is returned.
#[derive(Debug, Error)]
#[error("Checkout aborted during {stage}: {reason}")]
pub struct CheckoutAborted {
    pub stage: CheckoutStage,
    #[source]
    pub reason: CheckoutError,
}

impl CheckoutAborted {
    pub fn new(stage: CheckoutStage, reason: impl Into<CheckoutError>) -> Self {
        Self {
            stage,
            reason: reason.into(),
        }
    }
}

/// Convenience type alias for cart operation results.
pub type Result<T> = std::result::Result<T, CheckoutError>;
