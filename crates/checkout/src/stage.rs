//! Checkout state machine.

use serde::{Deserialize, Serialize};

/// The stage a checkout attempt has reached.
///
/// State transitions:
/// ```text
/// Validating ──► Locking ──► StockChecking ──► Computing ──► Writing ──► Committed
///      │            │              │               │            │
///      └────────────┴──────────────┴───────────────┴────────────┴──► Aborted(reason)
/// ```
///
/// An abort is reported as [`crate::CheckoutAborted`] carrying the stage it
/// happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CheckoutStage {
    /// Payment details are checked; no transaction is open.
    #[default]
    Validating,

    /// The cart and every book it references are being locked.
    Locking,

    /// Locked stock is compared against requested quantities.
    StockChecking,

    /// The order total is computed.
    Computing,

    /// Order, stock and replenishment writes are in progress.
    Writing,

    /// The transaction committed (terminal state).
    Committed,
}

impl CheckoutStage {
    /// Returns the stage that follows this one on the success path.
    pub fn next(&self) -> Option<CheckoutStage> {
        match self {
            CheckoutStage::Validating => Some(CheckoutStage::Locking),
            CheckoutStage::Locking => Some(CheckoutStage::StockChecking),
            CheckoutStage::StockChecking => Some(CheckoutStage::Computing),
            CheckoutStage::Computing => Some(CheckoutStage::Writing),
            CheckoutStage::Writing => Some(CheckoutStage::Committed),
            CheckoutStage::Committed => None,
        }
    }

    /// Moves to the next stage. `Committed` stays where it is.
    pub fn advance(&mut self) {
        if let Some(next) = self.next() {
            tracing::trace!(from = %self, to = %next, "checkout stage");
            *self = next;
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutStage::Validating => "Validating",
            CheckoutStage::Locking => "Locking",
            CheckoutStage::StockChecking => "StockChecking",
            CheckoutStage::Computing => "Computing",
            CheckoutStage::Writing => "Writing",
            CheckoutStage::Committed => "Committed",
        }
    }
}

impl std::fmt::Display for CheckoutStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
