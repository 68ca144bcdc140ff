//! Checkout and order history.

use rust_decimal::Decimal;
use sqlx::PgPool;
use thiserror::Error;

use bazaar_core::{OrderId, Price, UserId};

use crate::db::RepositoryError;
use crate::db::carts;
use crate::db::orders::{self, OrderRepository, StockTaken};
use crate::models::{CartItem, CurrentUser, Order};

/// Errors from order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("Cart is empty")]
    EmptyCart,

    #[error("Not enough stock for {0}")]
    NotEnoughStock(String),

    #[error("Order total cannot exceed {}", Price::MAX_TOTAL)]
    TotalTooLarge,

    #[error("Order not found")]
    NotFound,

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

impl From<sqlx::Error> for OrderError {
    fn from(err: sqlx::Error) -> Self {
        Self::Repository(RepositoryError::Database(err))
    }
}

/// Order service.
pub struct OrderService<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Turn the caller's cart into an order.
    ///
    /// Runs in one transaction: stock is taken line by line with a
    /// conditional decrement, the order captures each product's current name
    /// and price, and the cart is deleted. Any shortage rolls everything back.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::EmptyCart` without a cart or lines and
    /// `OrderError::NotEnoughStock` naming the first product that ran out,
    /// `OrderError::TotalTooLarge` when the total cannot be stored.
    pub async fn checkout(&self, user_id: UserId) -> Result<Order, OrderError> {
        let mut tx = self.pool.begin().await?;

        let cart = carts::lock_for_user(&mut tx, user_id)
            .await?
            .ok_or(OrderError::EmptyCart)?;
        let mut items = carts::fetch_items(&mut *tx, cart.id).await?;
        if items.is_empty() {
            return Err(OrderError::EmptyCart);
        }

        // Concurrent checkouts lock product rows in the same order.
        items.sort_by_key(|item| item.product_id.as_uuid());

        let mut taken = Vec::with_capacity(items.len());
        for item in &items {
            let stock = orders::take_stock(&mut tx, item.product_id, item.quantity)
                .await?
                .ok_or_else(|| OrderError::NotEnoughStock(item.product.name.clone()))?;
            taken.push(stock);
        }

        let total = order_total(&items, &taken)?;
        let row = orders::insert_order(&mut tx, user_id, total).await?;

        let mut lines = Vec::with_capacity(items.len());
        for (item, stock) in items.iter().zip(&taken) {
            let line = orders::insert_item(
                &mut tx,
                row.id,
                item.product_id,
                &stock.name,
                item.quantity,
                stock.price,
            )
            .await?;
            lines.push(line);
        }

        carts::delete_cart(&mut tx, cart.id).await?;
        tx.commit().await?;

        tracing::info!(%user_id, order_id = %row.id, %total, lines = lines.len(), "order placed");
        Ok(row.with_items(lines))
    }

    /// The caller's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Repository` if a query fails.
    pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, OrderError> {
        Ok(OrderRepository::new(self.pool).list_for_user(user_id).await?)
    }

    /// Every order, newest first.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Repository` if a query fails.
    pub async fn list_all(&self) -> Result<Vec<Order>, OrderError> {
        Ok(OrderRepository::new(self.pool).list_all().await?)
    }

    /// One order, visible to its owner and to admins.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotFound` if the order does not exist or belongs
    /// to someone else.
    pub async fn get(&self, caller: &CurrentUser, id: OrderId) -> Result<Order, OrderError> {
        let order = OrderRepository::new(self.pool)
            .get(id)
            .await?
            .ok_or(OrderError::NotFound)?;
        if order.user_id != caller.id && !caller.is_admin() {
            return Err(OrderError::NotFound);
        }
        Ok(order)
    }
}

/// Sum of line totals at the prices captured while taking stock.
///
/// Prices may have risen since the lines were added, so the column bound is
/// checked again here.
fn order_total(items: &[CartItem], taken: &[StockTaken]) -> Result<Decimal, OrderError> {
    items
        .iter()
        .zip(taken)
        .try_fold(Decimal::ZERO, |total, (item, stock)| {
            stock
                .price
                .amount()
                .checked_mul(Decimal::from(item.quantity))
                .and_then(|line| total.checked_add(line))
        })
        .filter(|total| *total <= Price::MAX_TOTAL)
        .ok_or(OrderError::TotalTooLarge)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bazaar_core::{CartItemId, ProductId};

    use crate::models::CartProduct;

    fn item(quantity: i32, cart_price: &str) -> CartItem {
        let product_id = ProductId::generate();
        CartItem {
            id: CartItemId::generate(),
            product_id,
            quantity,
            price: Price::parse(cart_price).unwrap(),
            product: CartProduct {
                id: product_id,
                name: "Mug".into(),
                price: Price::parse(cart_price).unwrap(),
                images: Vec::new(),
                quantity: 10,
            },
        }
    }

    fn taken(price: &str) -> StockTaken {
        StockTaken {
            name: "Mug".into(),
            price: Price::parse(price).unwrap(),
        }
    }

    #[test]
    fn total_uses_prices_captured_at_checkout() {
        let items = vec![item(2, "5.00"), item(3, "1.50")];
        // The first product got more expensive since it was added to the cart.
        let stock = vec![taken("6.00"), taken("1.50")];
        assert_eq!(order_total(&items, &stock).unwrap(), Decimal::new(1650, 2));
    }

    #[test]
    fn total_of_nothing_is_zero() {
        assert_eq!(order_total(&[], &[]).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn total_beyond_the_column_is_rejected() {
        let items = vec![item(i32::MAX, "1.00"), item(i32::MAX, "1.00")];
        let stock = vec![taken("9999999999.99"), taken("9999999999.99")];
        assert!(matches!(
            order_total(&items, &stock),
            Err(OrderError::TotalTooLarge)
        ));
    }
}
