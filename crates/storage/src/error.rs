use common::{BookId, ReplenishmentId};
use thiserror::Error;

use crate::records::ReplenishmentStatus;

/// PostgreSQL SQLSTATE codes that indicate lock contention.
const LOCK_NOT_AVAILABLE: &str = "55P03";
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";

/// Errors that can occur when interacting with storage.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The referenced book is not in the catalog.
    #[error("Book not found: {0}")]
    BookNotFound(BookId),

    /// A cart line quantity fell outside 1..=100.
    #[error("Invalid quantity: {quantity} (must be between 1 and 100)")]
    InvalidQuantity { quantity: i64 },

    /// A decrement would have taken stock below zero.
    #[error("Stock for {0} would become negative")]
    StockUnderflow(BookId),

    /// A catalog price was negative or above the price cap.
    #[error("Invalid price: {cents} cents (must be between 0 and {max})", max = common::MAX_PRICE_CENTS)]
    InvalidPrice { cents: i64 },

    /// A stock level or threshold would exceed the storable maximum.
    #[error("Stock for {book_id} cannot exceed {max}: requested {requested}", max = crate::store::MAX_STOCK)]
    StockOverflow { book_id: BookId, requested: u64 },

    /// The replenishment request does not exist.
    #[error("Replenishment request not found: {0}")]
    ReplenishmentNotFound(ReplenishmentId),

    /// The replenishment request cannot move to the requested status.
    #[error("Replenishment request {id} cannot move from {from} to {to}")]
    InvalidReplenishmentTransition {
        id: ReplenishmentId,
        from: ReplenishmentStatus,
        to: ReplenishmentStatus,
    },

    /// A row lock could not be acquired within the configured wait,
    /// or the transaction lost a serialization/deadlock race.
    #[error("Lock wait timed out or transaction conflicted; retry the operation")]
    LockTimeout,

    /// A stored value could not be decoded into its domain type.
    #[error("Corrupt stored value: {0}")]
    Decode(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StorageError {
    /// Returns true for contention errors the caller may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::LockTimeout)
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = err
            && let Some(code) = db_err.code()
            && matches!(
                code.as_ref(),
                LOCK_NOT_AVAILABLE | SERIALIZATION_FAILURE | DEADLOCK_DETECTED
            )
        {
            tracing::debug!(code = %code, "database lock contention");
            return StorageError::LockTimeout;
        }
        StorageError::Database(err)
    }
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
