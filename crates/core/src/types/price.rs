//! Type-safe price representation using decimal arithmetic.
//!
//! Prices are stored as `NUMERIC(12, 2)` and never go negative; cart and
//! order totals use `NUMERIC(18, 2)`. Money is
//! single-currency throughout the store, so no currency code is carried.

use core::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::Quantity;

/// Errors that can occur when constructing a [`Price`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PriceError {
    /// The amount is below zero.
    #[error("price cannot be negative")]
    Negative,
    /// The amount has more than two decimal places.
    #[error("price can have at most {max} decimal places")]
    TooPrecise {
        /// Maximum allowed scale.
        max: u32,
    },
    /// The amount does not fit a `NUMERIC(12, 2)` column.
    #[error("price cannot exceed {max}")]
    TooLarge {
        /// Largest accepted amount.
        max: Decimal,
    },
    /// The input is not a decimal number.
    #[error("price is not a valid number: {0}")]
    Invalid(String),
}

/// A non-negative amount of money with at most two decimal places.
///
/// ```
/// use bazaar_core::{Price, Quantity};
/// use rust_decimal::Decimal;
///
/// let price = Price::parse("19.99").unwrap();
/// let qty = Quantity::new(3).unwrap();
/// assert_eq!(price.line_total(qty), Decimal::new(5997, 2));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Price(Decimal);

impl Price {
    /// Maximum number of decimal places.
    pub const MAX_SCALE: u32 = 2;

    /// A zero price.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// The largest storable price, `9999999999.99`.
    pub const MAX: Self = Self(Decimal::from_parts(0xD4A5_0FFF, 0xE8, 0, false, 2));

    /// The largest storable cart or order total, `9999999999999999.99`.
    pub const MAX_TOTAL: Decimal = Decimal::from_parts(0xA763_FFFF, 0x0DE0_B6B3, 0, false, 2);

    /// Create a price from a decimal amount.
    ///
    /// # Errors
    ///
    /// Returns [`PriceError::Negative`] for amounts below zero and
    /// [`PriceError::TooPrecise`] for amounts with more than two decimal places,
    /// and [`PriceError::TooLarge`] above [`Price::MAX`].
    pub fn new(amount: Decimal) -> Result<Self, PriceError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(PriceError::Negative);
        }
        if amount > Self::MAX.0 {
            return Err(PriceError::TooLarge { max: Self::MAX.0 });
        }
        let normalized = amount.normalize();
        if normalized.scale() > Self::MAX_SCALE {
            return Err(PriceError::TooPrecise {
                max: Self::MAX_SCALE,
            });
        }
        let mut rounded = normalized;
        rounded.rescale(Self::MAX_SCALE);
        Ok(Self(rounded))
    }

    /// Parse a price from its decimal string form (e.g. a multipart field).
    ///
    /// # Errors
    ///
    /// Returns [`PriceError::Invalid`] if the text is not a number, otherwise
    /// the same errors as [`Price::new`].
    pub fn parse(s: &str) -> Result<Self, PriceError> {
        let amount = s
            .trim()
            .parse::<Decimal>()
            .map_err(|e| PriceError::Invalid(e.to_string()))?;
        Self::new(amount)
    }

    /// The underlying decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// The total for `quantity` units at this price.
    #[must_use]
    pub fn line_total(&self, quantity: Quantity) -> Decimal {
        self.0 * Decimal::from(quantity.get())
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl TryFrom<Decimal> for Price {
    type Error = PriceError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Price> for Decimal {
    fn from(price: Price) -> Self {
        price.0
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for Price {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <Decimal as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <Decimal as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Price {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let amount = <Decimal as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self::new(amount)?)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for Price {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <Decimal as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn accepts_whole_and_cent_amounts() {
        assert_eq!(Price::parse("10").unwrap().to_string(), "10.00");
        assert_eq!(Price::parse(" 4.5 ").unwrap().to_string(), "4.50");
        assert_eq!(Price::parse("0").unwrap(), Price::ZERO);
    }

    #[test]
    fn rejects_negative() {
        assert_eq!(Price::parse("-1"), Err(PriceError::Negative));
    }

    #[test]
    fn rejects_sub_cent_precision() {
        assert_eq!(
            Price::parse("1.999"),
            Err(PriceError::TooPrecise { max: 2 })
        );
        // trailing zeros are not extra precision
        assert!(Price::parse("1.9900").is_ok());
    }

    #[test]
    fn rejects_amounts_beyond_the_column() {
        assert_eq!(Price::MAX.to_string(), "9999999999.99");
        assert_eq!(Price::MAX_TOTAL.to_string(), "9999999999999999.99");
        assert_eq!(Price::parse("9999999999.99"), Ok(Price::MAX));
        assert!(matches!(
            Price::parse("99999999999"),
            Err(PriceError::TooLarge { .. })
        ));
        assert!(matches!(
            Price::parse("10000000000.00"),
            Err(PriceError::TooLarge { .. })
        ));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(Price::parse("ten"), Err(PriceError::Invalid(_))));
    }

    #[test]
    fn line_total_multiplies_by_quantity() {
        let price = Price::parse("2.25").unwrap();
        let total = price.line_total(Quantity::new(4).unwrap());
        assert_eq!(total, Decimal::new(900, 2));
    }
}
