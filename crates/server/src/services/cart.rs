//! Cart service.
//!
//! Every mutation runs in one transaction holding the cart row lock, so
//! concurrent requests for the same cart apply one after another and the
//! stored total always matches the lines.

use sqlx::PgPool;
use thiserror::Error;

use rust_decimal::Decimal;

use bazaar_core::{CartItemId, Price, ProductId, Quantity, QuantityError, UserId};

use crate::db::RepositoryError;
use crate::db::carts::{self, CartRepository, StockedProduct};
use crate::models::{Cart, CartItem};
use crate::models::cart::CartRow;

/// Errors from cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    #[error("invalid quantity: {0}")]
    InvalidQuantity(#[from] QuantityError),

    #[error("Product not found")]
    ProductNotFound,

    #[error("Cart item not found")]
    ItemNotFound,

    #[error("Not enough stock available")]
    NotEnoughStock,

    #[error("Cart total cannot exceed {}", Price::MAX_TOTAL)]
    TotalTooLarge,

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

impl From<sqlx::Error> for CartError {
    fn from(err: sqlx::Error) -> Self {
        Self::Repository(RepositoryError::Database(err))
    }
}

/// Cart service.
pub struct CartService<'a> {
    pool: &'a PgPool,
}

impl<'a> CartService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// The caller's cart, or `None` before anything was added.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if a query fails.
    pub async fn get(&self, user_id: UserId) -> Result<Option<Cart>, CartError> {
        Ok(CartRepository::new(self.pool).get_for_user(user_id).await?)
    }

    /// Add `quantity` units of a product, merging into an existing line.
    ///
    /// The line's unit price is refreshed from the product.
    ///
    /// # Errors
    ///
    /// Returns `CartError::NotEnoughStock` if the merged quantity exceeds the
    /// stock and `CartError::ProductNotFound` for an unknown product.
    pub async fn add_item(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<Cart, CartError> {
        let quantity = Quantity::try_from(quantity)?;
        let mut tx = self.pool.begin().await?;

        let cart = carts::lock_or_create(&mut tx, user_id).await?;
        let product = carts::stocked_product(&mut tx, product_id)
            .await?
            .ok_or(CartError::ProductNotFound)?;

        let merged = match carts::line_for_product(&mut tx, cart.id, product_id).await? {
            Some(line) => Quantity::new(line.quantity)?.checked_add(quantity)?,
            None => quantity,
        };
        ensure_in_stock(&product, merged)?;

        carts::upsert_line(&mut tx, cart.id, product_id, merged.get(), product.price).await?;
        let cart = finish(tx, cart.id).await?;

        tracing::debug!(%user_id, %product_id, quantity = merged.get(), "cart line added");
        Ok(cart)
    }

    /// Set a line's quantity.
    ///
    /// # Errors
    ///
    /// Returns `CartError::ItemNotFound` if the line is not in the caller's
    /// cart and `CartError::NotEnoughStock` if the stock is too low.
    pub async fn update_item(
        &self,
        user_id: UserId,
        item_id: CartItemId,
        quantity: i64,
    ) -> Result<Cart, CartError> {
        let quantity = Quantity::try_from(quantity)?;
        let mut tx = self.pool.begin().await?;

        let cart = carts::lock_for_user(&mut tx, user_id)
            .await?
            .ok_or(CartError::ItemNotFound)?;
        let line = carts::line_by_id(&mut tx, cart.id, item_id)
            .await?
            .ok_or(CartError::ItemNotFound)?;
        let product = carts::stocked_product(&mut tx, line.product_id)
            .await?
            .ok_or(CartError::ProductNotFound)?;
        ensure_in_stock(&product, quantity)?;

        carts::upsert_line(&mut tx, cart.id, line.product_id, quantity.get(), product.price).await?;
        finish(tx, cart.id).await
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// Returns `CartError::ItemNotFound` if the line is not in the caller's cart.
    pub async fn remove_item(&self, user_id: UserId, item_id: CartItemId) -> Result<Cart, CartError> {
        let mut tx = self.pool.begin().await?;

        let cart = carts::lock_for_user(&mut tx, user_id)
            .await?
            .ok_or(CartError::ItemNotFound)?;
        if !carts::delete_line(&mut tx, cart.id, item_id).await? {
            return Err(CartError::ItemNotFound);
        }
        finish(tx, cart.id).await
    }
}

fn ensure_in_stock(product: &StockedProduct, wanted: Quantity) -> Result<(), CartError> {
    if wanted.get() > product.quantity {
        tracing::debug!(
            product_id = %product.id,
            wanted = wanted.get(),
            in_stock = product.quantity,
            "not enough stock"
        );
        return Err(CartError::NotEnoughStock);
    }
    Ok(())
}

/// Sum of the lines, refusing totals the `total_price` column cannot hold.
fn checked_total(items: &[CartItem]) -> Result<Decimal, CartError> {
    items
        .iter()
        .try_fold(Decimal::ZERO, |total, item| {
            item.price
                .amount()
                .checked_mul(Decimal::from(item.quantity))
                .and_then(|line| total.checked_add(line))
        })
        .filter(|total| *total <= Price::MAX_TOTAL)
        .ok_or(CartError::TotalTooLarge)
}

/// Check and recompute the total, read the lines back and commit.
///
/// Returning early drops `tx`, rolling back the mutation.
async fn finish(
    mut tx: sqlx::Transaction<'_, sqlx::Postgres>,
    cart_id: bazaar_core::CartId,
) -> Result<Cart, CartError> {
    let items = carts::fetch_items(&mut *tx, cart_id).await?;
    checked_total(&items)?;
    let row: CartRow = carts::refresh_total(&mut tx, cart_id).await?;
    tx.commit().await?;
    Ok(row.with_items(items))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::models::CartProduct;

    fn product(stock: i32) -> StockedProduct {
        StockedProduct {
            id: ProductId::generate(),
            name: "Teapot".into(),
            price: Price::parse("24.00").unwrap(),
            quantity: stock,
        }
    }

    #[test]
    fn stock_check_allows_exact_stock() {
        assert!(ensure_in_stock(&product(3), Quantity::new(3).unwrap()).is_ok());
    }

    #[test]
    fn stock_check_rejects_excess() {
        assert!(matches!(
            ensure_in_stock(&product(3), Quantity::new(4).unwrap()),
            Err(CartError::NotEnoughStock)
        ));
        assert!(matches!(
            ensure_in_stock(&product(0), Quantity::new(1).unwrap()),
            Err(CartError::NotEnoughStock)
        ));
    }

    #[test]
    fn non_positive_quantity_is_rejected() {
        assert!(matches!(
            Quantity::try_from(0_i64).map_err(CartError::from),
            Err(CartError::InvalidQuantity(_))
        ));
    }

    fn line(quantity: i32, price: Price) -> CartItem {
        let product_id = ProductId::generate();
        CartItem {
            id: CartItemId::generate(),
            product_id,
            quantity,
            price,
            product: CartProduct {
                id: product_id,
                name: "Teapot".into(),
                price,
                images: Vec::new(),
                quantity,
            },
        }
    }

    #[test]
    fn total_sums_lines() {
        let items = [
            line(2, Price::parse("24.00").unwrap()),
            line(1, Price::parse("3.50").unwrap()),
        ];
        assert_eq!(checked_total(&items).unwrap(), Decimal::new(5150, 2));
        assert_eq!(checked_total(&[]).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn total_beyond_the_column_is_rejected() {
        // Each line is valid; together they cannot be stored.
        let items = [line(i32::MAX, Price::MAX), line(i32::MAX, Price::MAX)];
        assert!(matches!(checked_total(&items), Err(CartError::TotalTooLarge)));

        let at_limit = [line(1_000_000, Price::MAX)];
        assert!(checked_total(&at_limit).is_ok());
    }
}
