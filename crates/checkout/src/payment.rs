//! Structural validation of payment details.
//!
//! No payment gateway is involved; a card is accepted when its fields are
//! well formed and not expired.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use storage::PaymentDescriptor;
use thiserror::Error;

const MIN_CARD_DIGITS: usize = 12;
const MAX_CARD_DIGITS: usize = 19;

/// Payment details as submitted by the customer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    /// `cod` or `card` (`visa` is accepted as a card alias).
    pub payment_method: String,
    #[serde(default)]
    pub card_number: Option<String>,
    #[serde(default)]
    pub cvv: Option<String>,
    /// Expiry in `MM/YY` form.
    #[serde(default)]
    pub card_expiry: Option<String>,
}

/// Reasons payment details are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaymentError {
    #[error("Unknown payment method: {0}")]
    UnknownMethod(String),

    #[error("Missing payment field: {0}")]
    MissingField(&'static str),

    #[error("Card number must have 12 to 19 digits, got {digits}")]
    CardNumber { digits: usize },

    #[error("CVV must be 3 or 4 digits")]
    Cvv,

    #[error("Invalid expiry '{0}' (use MM/YY)")]
    ExpiryFormat(String),

    #[error("Card expired in {0}")]
    Expired(String),
}

impl PaymentRequest {
    /// Cash on delivery.
    pub fn cash_on_delivery() -> Self {
        Self {
            payment_method: "cod".to_string(),
            ..Self::default()
        }
    }

    /// Card payment.
    pub fn card(
        number: impl Into<String>,
        cvv: impl Into<String>,
        expiry: impl Into<String>,
    ) -> Self {
        Self {
            payment_method: "card".to_string(),
            card_number: Some(number.into()),
            cvv: Some(cvv.into()),
            card_expiry: Some(expiry.into()),
        }
    }

    /// Validates the request against `today` and reduces it to what is
    /// stored with the order.
    ///
    /// Non-card methods drop any card fields that were sent.
    pub fn validate(&self, today: NaiveDate) -> Result<PaymentDescriptor, PaymentError> {
        match self.payment_method.trim().to_ascii_lowercase().as_str() {
            "cod" => Ok(PaymentDescriptor::CashOnDelivery),
            "card" | "visa" => self.validate_card(today),
            other => Err(PaymentError::UnknownMethod(other.to_string())),
        }
    }

    fn validate_card(&self, today: NaiveDate) -> Result<PaymentDescriptor, PaymentError> {
        let number = self
            .card_number
            .as_deref()
            .ok_or(PaymentError::MissingField("card_number"))?;
        let digits: String = number.chars().filter(char::is_ascii_digit).collect();
        if !(MIN_CARD_DIGITS..=MAX_CARD_DIGITS).contains(&digits.len()) {
            return Err(PaymentError::CardNumber {
                digits: digits.len(),
            });
        }

        let cvv = self.cvv.as_deref().ok_or(PaymentError::MissingField("cvv"))?;
        if !(3..=4).contains(&cvv.len()) || !cvv.chars().all(|c| c.is_ascii_digit()) {
            return Err(PaymentError::Cvv);
        }

        let expiry = self
            .card_expiry
            .as_deref()
            .ok_or(PaymentError::MissingField("card_expiry"))?;
        let (month, year) = parse_expiry(expiry)?;
        if (year, month) < (today.year(), today.month()) {
            return Err(PaymentError::Expired(expiry.to_string()));
        }

        Ok(PaymentDescriptor::Card {
            last4: digits[digits.len() - 4..].to_string(),
            expiry: expiry.to_string(),
        })
    }
}

/// Parses `MM/YY` into (month, four-digit year).
fn parse_expiry(expiry: &str) -> Result<(u32, i32), PaymentError> {
    let invalid = || PaymentError::ExpiryFormat(expiry.to_string());

    let (mm, yy) = expiry.split_once('/').ok_or_else(invalid)?;
    if mm.len() != 2 || yy.len() != 2 {
        return Err(invalid());
    }
    if !mm.chars().chain(yy.chars()).all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }

    let month: u32 = mm.parse().map_err(|_| invalid())?;
    let year: i32 = yy.parse().map_err(|_| invalid())?;
    if !(1..=12).contains(&month) {
        return Err(invalid());
    }
    Ok((month, 2000 + year))
}
