//! Cart repository.
//!
//! Reads go through [`CartRepository`]. The write steps are free functions
//! over a `&mut PgConnection` and are meant to run inside one transaction
//! after [`lock_or_create`] / [`lock_for_user`] has taken the cart row lock.

use sqlx::{PgConnection, PgExecutor, PgPool};

use bazaar_core::{CartId, CartItemId, Price, ProductId, UserId};

use super::RepositoryError;
use crate::models::cart::{Cart, CartItem, CartItemRow, CartRow};

const CART_COLUMNS: &str = "id, user_id, total_price, created_at, updated_at";

/// Product fields needed to validate a cart line.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StockedProduct {
    pub id: ProductId,
    pub name: String,
    pub price: Price,
    /// Units in stock.
    pub quantity: i32,
}

/// A cart line's identity and current quantity.
#[derive(Debug, Clone, Copy, sqlx::FromRow)]
pub struct CartLine {
    pub id: CartItemId,
    pub product_id: ProductId,
    pub quantity: i32,
}

/// Repository for cart reads.
pub struct CartRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CartRepository<'a> {
    /// Create a new cart repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a user's cart with its lines, or `None` if they have never added anything.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn get_for_user(&self, user_id: UserId) -> Result<Option<Cart>, RepositoryError> {
        let row = sqlx::query_as::<_, CartRow>(&format!(
            "SELECT {CART_COLUMNS} FROM carts WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?;

        match row {
            Some(row) => {
                let items = fetch_items(self.pool, row.id).await?;
                Ok(Some(row.with_items(items)))
            }
            None => Ok(None),
        }
    }
}

/// Load a cart's lines joined with their products, oldest line first.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn fetch_items<'e, E>(executor: E, cart_id: CartId) -> Result<Vec<CartItem>, RepositoryError>
where
    E: PgExecutor<'e>,
{
    let rows = sqlx::query_as::<_, CartItemRow>(
        r"
        SELECT ci.id, ci.product_id, ci.quantity, ci.price,
               p.name AS product_name, p.price AS product_price,
               p.images AS product_images, p.quantity AS product_stock
        FROM cart_items ci
        JOIN products p ON p.id = ci.product_id
        WHERE ci.cart_id = $1
        ORDER BY ci.created_at, ci.id
        ",
    )
    .bind(cart_id)
    .fetch_all(executor)
    .await?;
    Ok(rows.into_iter().map(CartItem::from).collect())
}

/// Lock the user's cart row, creating the cart first if needed.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if a query fails.
pub async fn lock_or_create(
    conn: &mut PgConnection,
    user_id: UserId,
) -> Result<CartRow, RepositoryError> {
    sqlx::query("INSERT INTO carts (id, user_id) VALUES ($1, $2) ON CONFLICT (user_id) DO NOTHING")
        .bind(CartId::generate())
        .bind(user_id)
        .execute(&mut *conn)
        .await?;

    lock_for_user(conn, user_id)
        .await?
        .ok_or(RepositoryError::NotFound)
}

/// Lock the user's cart row (`SELECT ... FOR UPDATE`).
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn lock_for_user(
    conn: &mut PgConnection,
    user_id: UserId,
) -> Result<Option<CartRow>, RepositoryError> {
    let row = sqlx::query_as::<_, CartRow>(&format!(
        "SELECT {CART_COLUMNS} FROM carts WHERE user_id = $1 FOR UPDATE"
    ))
    .bind(user_id)
    .fetch_optional(conn)
    .await?;
    Ok(row)
}

/// Read the product a line refers to.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn stocked_product(
    conn: &mut PgConnection,
    product_id: ProductId,
) -> Result<Option<StockedProduct>, RepositoryError> {
    let product = sqlx::query_as::<_, StockedProduct>(
        "SELECT id, name, price, quantity FROM products WHERE id = $1",
    )
    .bind(product_id)
    .fetch_optional(conn)
    .await?;
    Ok(product)
}

/// Find the line for a product in a cart.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn line_for_product(
    conn: &mut PgConnection,
    cart_id: CartId,
    product_id: ProductId,
) -> Result<Option<CartLine>, RepositoryError> {
    let line = sqlx::query_as::<_, CartLine>(
        "SELECT id, product_id, quantity FROM cart_items WHERE cart_id = $1 AND product_id = $2",
    )
    .bind(cart_id)
    .bind(product_id)
    .fetch_optional(conn)
    .await?;
    Ok(line)
}

/// Find a line by its id, scoped to a cart.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn line_by_id(
    conn: &mut PgConnection,
    cart_id: CartId,
    item_id: CartItemId,
) -> Result<Option<CartLine>, RepositoryError> {
    let line = sqlx::query_as::<_, CartLine>(
        "SELECT id, product_id, quantity FROM cart_items WHERE cart_id = $1 AND id = $2",
    )
    .bind(cart_id)
    .bind(item_id)
    .fetch_optional(conn)
    .await?;
    Ok(line)
}

/// Insert a line or overwrite the existing line for the same product.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn upsert_line(
    conn: &mut PgConnection,
    cart_id: CartId,
    product_id: ProductId,
    quantity: i32,
    unit_price: Price,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r"
        INSERT INTO cart_items (id, cart_id, product_id, quantity, price)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (cart_id, product_id)
        DO UPDATE SET quantity = EXCLUDED.quantity, price = EXCLUDED.price, updated_at = NOW()
        ",
    )
    .bind(CartItemId::generate())
    .bind(cart_id)
    .bind(product_id)
    .bind(quantity)
    .bind(unit_price)
    .execute(conn)
    .await?;
    Ok(())
}

/// Delete a line. Returns `false` if it was not in the cart.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn delete_line(
    conn: &mut PgConnection,
    cart_id: CartId,
    item_id: CartItemId,
) -> Result<bool, RepositoryError> {
    let result = sqlx::query("DELETE FROM cart_items WHERE cart_id = $1 AND id = $2")
        .bind(cart_id)
        .bind(item_id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected() == 1)
}

/// Recompute and store the cart total from its lines.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn refresh_total(
    conn: &mut PgConnection,
    cart_id: CartId,
) -> Result<CartRow, RepositoryError> {
    sqlx::query_as::<_, CartRow>(&format!(
        r"
        UPDATE carts
        SET total_price = COALESCE(
                (SELECT SUM(price * quantity) FROM cart_items WHERE cart_id = $1), 0),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {CART_COLUMNS}
        "
    ))
    .bind(cart_id)
    .fetch_optional(conn)
    .await?
    .ok_or(RepositoryError::NotFound)
}

/// Delete a cart; its lines cascade.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn delete_cart(conn: &mut PgConnection, cart_id: CartId) -> Result<(), RepositoryError> {
    sqlx::query("DELETE FROM carts WHERE id = $1")
        .bind(cart_id)
        .execute(conn)
        .await?;
    Ok(())
}
