//! Shopping cart types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use bazaar_core::{CartId, CartItemId, Price, ProductId, UserId};

/// A user's cart with its lines.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    pub id: CartId,
    pub user_id: UserId,
    /// Always the sum of `price * quantity` over `items`.
    pub total_price: Decimal,
    pub items: Vec<CartItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A cart row without its lines.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CartRow {
    pub id: CartId,
    pub user_id: UserId,
    pub total_price: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CartRow {
    /// Attach lines to this row.
    #[must_use]
    pub fn with_items(self, items: Vec<CartItem>) -> Cart {
        Cart {
            id: self.id,
            user_id: self.user_id,
            total_price: self.total_price,
            items,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// One cart line.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub id: CartItemId,
    pub product_id: ProductId,
    pub quantity: i32,
    /// Unit price captured when the line was last added or updated.
    pub price: Price,
    pub product: CartProduct,
}

/// Product summary shown alongside a cart line.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartProduct {
    pub id: ProductId,
    pub name: String,
    pub price: Price,
    pub images: Vec<String>,
    /// Units currently in stock.
    pub quantity: i32,
}

/// A cart line joined with its product, as read from the database.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CartItemRow {
    pub id: CartItemId,
    pub product_id: ProductId,
    pub quantity: i32,
    pub price: Price,
    pub product_name: String,
    pub product_price: Price,
    pub product_images: Vec<String>,
    pub product_stock: i32,
}

impl From<CartItemRow> for CartItem {
    fn from(row: CartItemRow) -> Self {
        Self {
            id: row.id,
            product_id: row.product_id,
            quantity: row.quantity,
            price: row.price,
            product: CartProduct {
                id: row.product_id,
                name: row.product_name,
                price: row.product_price,
                images: row.product_images,
                quantity: row.product_stock,
            },
        }
    }
}
