//! Strictly positive item quantity.

use serde::{Deserialize, Serialize};

/// Errors that can occur when constructing a [`Quantity`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum QuantityError {
    /// Zero or negative quantity.
    #[error("quantity must be at least 1 (got {0})")]
    NotPositive(i64),
    /// Quantity does not fit the `INTEGER` column.
    #[error("quantity is too large")]
    TooLarge,
}

/// The number of units of a product in a cart or order line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i32")]
pub struct Quantity(i32);

impl Quantity {
    /// Create a quantity.
    ///
    /// # Errors
    ///
    /// Returns [`QuantityError::NotPositive`] for values below 1.
    pub fn new(value: i32) -> Result<Self, QuantityError> {
        if value < 1 {
            return Err(QuantityError::NotPositive(i64::from(value)));
        }
        Ok(Self(value))
    }

    /// The raw value.
    #[must_use]
    pub const fn get(self) -> i32 {
        self.0
    }

    /// Add two quantities, failing if the sum overflows.
    ///
    /// # Errors
    ///
    /// Returns [`QuantityError::TooLarge`] on overflow.
    pub const fn checked_add(self, other: Self) -> Result<Self, QuantityError> {
        match self.0.checked_add(other.0) {
            Some(sum) => Ok(Self(sum)),
            None => Err(QuantityError::TooLarge),
        }
    }
}

impl TryFrom<i64> for Quantity {
    type Error = QuantityError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if value < 1 {
            return Err(QuantityError::NotPositive(value));
        }
        let value = i32::try_from(value).map_err(|_| QuantityError::TooLarge)?;
        Self::new(value)
    }
}

impl From<Quantity> for i32 {
    fn from(q: Quantity) -> Self {
        q.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn zero_and_negative_are_rejected() {
        assert_eq!(Quantity::new(0), Err(QuantityError::NotPositive(0)));
        assert_eq!(Quantity::new(-3), Err(QuantityError::NotPositive(-3)));
    }

    #[test]
    fn checked_add_detects_overflow() {
        let big = Quantity::new(i32::MAX).unwrap();
        assert_eq!(
            big.checked_add(Quantity::new(1).unwrap()),
            Err(QuantityError::TooLarge)
        );
        let sum = Quantity::new(2)
            .unwrap()
            .checked_add(Quantity::new(3).unwrap())
            .unwrap();
        assert_eq!(sum.get(), 5);
    }

    #[test]
    fn deserializes_from_json_number() {
        let q: Quantity = serde_json::from_str("7").unwrap();
        assert_eq!(q.get(), 7);
        assert!(serde_json::from_str::<Quantity>("0").is_err());
        assert!(serde_json::from_str::<Quantity>("99999999999").is_err());
    }
}
