//! Type-safe price representation using decimal arithmetic.
//!
//! The storefront sells in a single currency, so a price is a validated
//! non-negative [`Decimal`] amount. Construction goes through [`Price::new`]
//! (or [`Price::from_f64`] for data arriving as JSON numbers), which rejects
//! negative and non-finite values before they can reach a cart.

use core::fmt;
use core::ops::Add;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Errors that can occur when constructing a [`Price`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PriceError {
    /// The amount is negative.
    #[error("price cannot be negative")]
    Negative,
    /// The amount is not a finite number (NaN or infinite input).
    #[error("price must be a finite number")]
    NotFinite,
}

/// A validated, non-negative monetary amount.
///
/// ## Examples
///
/// ```
/// use faithline_core::Price;
/// use rust_decimal::Decimal;
///
/// let price = Price::new(Decimal::new(1999, 2)).expect("valid price");
/// assert_eq!(price.to_string(), "$19.99");
///
/// assert!(Price::new(Decimal::new(-1, 0)).is_err());
/// assert!(Price::from_f64(f64::NAN).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(Decimal);

impl Price {
    /// A zero price.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create a price from a decimal amount.
    ///
    /// # Errors
    ///
    /// Returns [`PriceError::Negative`] if the amount is below zero.
    pub fn new(amount: Decimal) -> Result<Self, PriceError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(PriceError::Negative);
        }
        Ok(Self(amount))
    }

    /// Create a price from a floating-point amount.
    ///
    /// # Errors
    ///
    /// Returns [`PriceError::NotFinite`] for NaN or infinite input, and
    /// [`PriceError::Negative`] for negative amounts.
    pub fn from_f64(amount: f64) -> Result<Self, PriceError> {
        let decimal = Decimal::try_from(amount).map_err(|_| PriceError::NotFinite)?;
        Self::new(decimal)
    }

    /// The underlying decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// The amount multiplied by a quantity (a cart line subtotal).
    #[must_use]
    pub fn line_total(&self, quantity: u32) -> Decimal {
        self.0 * Decimal::from(quantity)
    }
}

impl Add for Price {
    type Output = Decimal;

    fn add(self, rhs: Self) -> Decimal {
        self.0 + rhs.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${:.2}", self.0)
    }
}
