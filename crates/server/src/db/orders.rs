//! Order repository.
//!
//! Orders are inserted by checkout inside the cart transaction (see
//! [`insert_order`], [`insert_item`]) and only read afterwards.

use std::collections::HashMap;

use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};

use bazaar_core::{OrderId, OrderItemId, Price, ProductId, UserId};

use super::RepositoryError;
use crate::models::order::{Order, OrderItem, OrderRow};

const ORDER_COLUMNS: &str = "id, user_id, total_price, created_at, updated_at";
const ORDER_ITEM_COLUMNS: &str = "id, order_id, product_id, product_name, quantity, unit_price";

/// Name and price of a product at the moment its stock was taken.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StockTaken {
    pub name: String,
    pub price: Price,
}

/// Repository for order reads.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Orders placed by one user, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;
        self.attach_items(rows).await
    }

    /// Every order, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn list_all(&self) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC"
        ))
        .fetch_all(self.pool)
        .await?;
        self.attach_items(rows).await
    }

    /// One order with its lines.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        match row {
            Some(row) => Ok(self.attach_items(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn attach_items(&self, rows: Vec<OrderRow>) -> Result<Vec<Order>, RepositoryError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<uuid::Uuid> = rows.iter().map(|r| r.id.as_uuid()).collect();
        let items = sqlx::query_as::<_, OrderItem>(&format!(
            "SELECT {ORDER_ITEM_COLUMNS} FROM order_items \
             WHERE order_id = ANY($1) ORDER BY created_at, id"
        ))
        .bind(ids)
        .fetch_all(self.pool)
        .await?;

        let mut by_order: HashMap<OrderId, Vec<OrderItem>> = HashMap::new();
        for item in items {
            by_order.entry(item.order_id).or_default().push(item);
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let items = by_order.remove(&row.id).unwrap_or_default();
                row.with_items(items)
            })
            .collect())
    }
}

/// Take `quantity` units of stock if that many are available.
///
/// Returns `None` when stock is insufficient (or the product is gone); the
/// caller should roll back.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn take_stock(
    conn: &mut PgConnection,
    product_id: ProductId,
    quantity: i32,
) -> Result<Option<StockTaken>, RepositoryError> {
    let taken = sqlx::query_as::<_, StockTaken>(
        r"
        UPDATE products
        SET quantity = quantity - $2, updated_at = NOW()
        WHERE id = $1 AND quantity >= $2
        RETURNING name, price
        ",
    )
    .bind(product_id)
    .bind(quantity)
    .fetch_optional(conn)
    .await?;
    Ok(taken)
}

/// Insert an order header.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the insert fails.
pub async fn insert_order(
    conn: &mut PgConnection,
    user_id: UserId,
    total_price: Decimal,
) -> Result<OrderRow, RepositoryError> {
    let row = sqlx::query_as::<_, OrderRow>(&format!(
        "INSERT INTO orders (id, user_id, total_price) VALUES ($1, $2, $3) RETURNING {ORDER_COLUMNS}"
    ))
    .bind(OrderId::generate())
    .bind(user_id)
    .bind(total_price)
    .fetch_one(conn)
    .await?;
    Ok(row)
}

/// Insert one order line.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the insert fails.
pub async fn insert_item(
    conn: &mut PgConnection,
    order_id: OrderId,
    product_id: ProductId,
    product_name: &str,
    quantity: i32,
    unit_price: Price,
) -> Result<OrderItem, RepositoryError> {
    let item = sqlx::query_as::<_, OrderItem>(&format!(
        "INSERT INTO order_items (id, order_id, product_id, product_name, quantity, unit_price) \
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING {ORDER_ITEM_COLUMNS}"
    ))
    .bind(OrderItemId::generate())
    .bind(order_id)
    .bind(product_id)
    .bind(product_name)
    .bind(quantity)
    .bind(unit_price)
    .fetch_one(conn)
    .await?;
    Ok(item)
}
