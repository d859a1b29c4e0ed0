use serde::{Deserialize, Serialize};

/// Highest catalog price in cents (100,000,000.00).
///
/// At this cap a full cart line is 10^12 cents, so order totals stay far
/// inside `i64` and the arithmetic below never saturates in practice.
pub const MAX_PRICE_CENTS: i64 = 10_000_000_000;

/// Currency amount held as integer cents.
///
/// All arithmetic stays in integers so order totals never drift.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates an amount from cents (1050 = 10.50).
    pub fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Returns zero.
    pub fn zero() -> Self {
        Self(0)
    }

    /// Returns the amount in cents.
    pub fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the whole-unit portion.
    pub fn units(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the cents remainder after whole units.
    pub fn cents_part(&self) -> i64 {
        self.0.abs() % 100
    }

    /// Returns true for a price a book may be listed at.
    pub fn is_valid_price(&self) -> bool {
        (0..=MAX_PRICE_CENTS).contains(&self.0)
    }

    /// Multiplies by a quantity, saturating at the `i64` bounds.
    pub fn multiply(&self, quantity: u32) -> Money {
        Money(self.0.saturating_mul(i64::from(quantity)))
    }


    /// Formats as a plain decimal string, e.g. `"25.50"`.
    pub fn to_decimal_string(&self) -> String {
        let sign = if self.0 < 0 { "-" } else { "" };
        format!("{sign}{}.{:02}", self.units().abs(), self.cents_part())
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0 < 0 {
            write!(f, "-${}.{:02}", self.units().abs(), self.cents_part())
        } else {
            write!(f, "${}.{:02}", self.units(), self.cents_part())
        }
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0.saturating_add(rhs.0))
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn money_parts() {
        let money = Money::from_cents(2550);
        assert_eq!(money.units(), 25);
        assert_eq!(money.cents_part(), 50);
    }

    #[test]
    fn money_display() {
        assert_eq!(Money::from_cents(2550).to_string(), "$25.50");
        assert_eq!(Money::from_cents(5).to_string(), "$0.05");
        assert_eq!(Money::from_cents(-1234).to_string(), "-$12.34");
    }

    #[test]
    fn money_decimal_string() {
        assert_eq!(Money::from_cents(2550).to_decimal_string(), "25.50");
        assert_eq!(Money::from_cents(-5).to_decimal_string(), "-0.05");
        assert_eq!(Money::zero().to_decimal_string(), "0.00");
    }

    #[test]
    fn money_sum_is_exact() {
        // 0.10 summed a thousand times is exactly 100.00
        let total: Money = (0..1000).map(|_| Money::from_cents(10)).sum();
        assert_eq!(total.cents(), 10_000);
    }

    #[test]
    fn money_multiply() {
        assert_eq!(Money::from_cents(1000).multiply(2).cents(), 2000);
        assert_eq!(Money::from_cents(550).multiply(0), Money::zero());
    }

    #[test]
    fn arithmetic_saturates_instead_of_overflowing() {
        let huge = Money::from_cents(i64::MAX / 50);
        assert_eq!(huge.multiply(100).cents(), i64::MAX);
        assert_eq!((huge.multiply(100) + huge).cents(), i64::MAX);

        let total: Money = [huge.multiply(100), huge].into_iter().sum();
        assert_eq!(total.cents(), i64::MAX);
    }

    #[test]
    fn price_cap() {
        assert!(Money::zero().is_valid_price());
        assert!(Money::from_cents(MAX_PRICE_CENTS).is_valid_price());
        assert!(!Money::from_cents(MAX_PRICE_CENTS + 1).is_valid_price());
        assert!(!Money::from_cents(-1).is_valid_price());

        // A full line at the cap stays exact
        let line = Money::from_cents(MAX_PRICE_CENTS).multiply(crate::MAX_LINE_QUANTITY);
        assert_eq!(line.cents(), 1_000_000_000_000);
    }
}
