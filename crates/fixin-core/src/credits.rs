//! # Credits
//!
//! Agent balances and the acceptance fee are denominated in credits, a
//! decimal amount with two fractional digits. A `Credits` value is never
//! negative; the signed direction of a balance change lives on the ledger
//! entry, not on the amount.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Number of fractional digits carried by credit amounts.
pub const CREDIT_SCALE: u32 = 2;

/// A non-negative credit amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Credits(Decimal);

impl Credits {
    /// Zero credits.
    pub const ZERO: Credits = Credits(Decimal::ZERO);

    /// Create a credit amount, rejecting negative values.
    ///
    /// The value is rounded to [`CREDIT_SCALE`] fractional digits.
    pub fn new(amount: Decimal) -> Result<Self, ValidationError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(ValidationError::NegativeAmount(amount.to_string()));
        }
        Ok(Self(amount.round_dp(CREDIT_SCALE)))
    }

    /// Create a credit amount from a whole number of cents.
    pub fn from_cents(cents: u32) -> Self {
        Self(Decimal::new(i64::from(cents), CREDIT_SCALE))
    }

    /// The underlying decimal value.
    pub fn amount(&self) -> Decimal {
        self.0
    }

    /// Whether the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Add two amounts. `None` on overflow.
    pub fn checked_add(self, other: Credits) -> Option<Credits> {
        self.0.checked_add(other.0).map(Credits)
    }

    /// Subtract `other`, refusing to go below zero.
    ///
    /// This is the balance-check half of every debit: `None` means the
    /// balance does not cover the amount.
    pub fn checked_sub(self, other: Credits) -> Option<Credits> {
        if other.0 > self.0 {
            return None;
        }
        self.0.checked_sub(other.0).map(Credits)
    }

    /// Whether this balance covers `amount`.
    pub fn covers(&self, amount: Credits) -> bool {
        self.0 >= amount.0
    }
}

impl TryFrom<Decimal> for Credits {
    type Error = ValidationError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Credits> for Decimal {
    fn from(value: Credits) -> Self {
        value.0
    }
}

impl FromStr for Credits {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let amount = Decimal::from_str(s.trim()).map_err(|_| ValidationError::OutOfRange {
            field: "credits",
            value: s.to_string(),
        })?;
        Self::new(amount)
    }
}

impl std::fmt::Display for Credits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn rejects_negative() {
        let err = Credits::new(Decimal::new(-1, 2)).unwrap_err();
        assert!(matches!(err, ValidationError::NegativeAmount(_)));
    }

    #[test]
    fn parses_and_displays_two_places() {
        let c: Credits = "5".parse().unwrap();
        assert_eq!(c.to_string(), "5.00");
        assert_eq!(c, Credits::from_cents(500));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("five".parse::<Credits>().is_err());
    }

    #[test]
    fn checked_sub_refuses_overdraft() {
        let balance = Credits::from_cents(400);
        let fee = Credits::from_cents(500);
        assert_eq!(balance.checked_sub(fee), None);
        assert!(!balance.covers(fee));
    }

    #[test]
    fn checked_sub_to_exactly_zero() {
        let balance = Credits::from_cents(500);
        assert_eq!(balance.checked_sub(balance), Some(Credits::ZERO));
    }

    #[test]
    fn deserialize_rejects_negative() {
        let parsed: Result<Credits, _> = serde_json::from_str("\"-3.00\"");
        assert!(parsed.is_err());
    }

    proptest! {
        #[test]
        fn sub_then_add_restores_balance(balance in 0u32..10_000_000, fee in 0u32..10_000_000) {
            let balance = Credits::from_cents(balance);
            let fee = Credits::from_cents(fee);
            match balance.checked_sub(fee) {
                Some(rest) => {
                    prop_assert!(balance.covers(fee));
                    prop_assert_eq!(rest.checked_add(fee), Some(balance));
                }
                None => prop_assert!(!balance.covers(fee)),
            }
        }

        #[test]
        fn never_negative_after_sub(a in 0u32..1_000_000, b in 0u32..1_000_000) {
            if let Some(rest) = Credits::from_cents(a).checked_sub(Credits::from_cents(b)) {
                prop_assert!(!rest.amount().is_sign_negative() || rest.is_zero());
            }
        }
    }
}
