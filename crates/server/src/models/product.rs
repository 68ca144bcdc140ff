//! Catalog types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use bazaar_core::{Price, ProductId};

/// A catalog product.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub price: Price,
    /// Cloudinary image URLs, first one is the primary image.
    pub images: Vec<String>,
    pub category: String,
    /// Units in stock.
    pub quantity: i32,
    pub views: i32,
    pub reviews: i32,
    pub likes: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One page of a product listing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPage {
    pub products: Vec<Product>,
    pub total_products: i64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
}

impl ProductPage {
    /// Assemble a page, computing `total_pages = ceil(total / limit)`.
    #[must_use]
    pub fn new(products: Vec<Product>, total_products: i64, page: i64, limit: i64) -> Self {
        let total_pages = if limit > 0 {
            (total_products + limit - 1) / limit
        } else {
            0
        };
        Self {
            products,
            total_products,
            page,
            limit,
            total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_pages_rounds_up() {
        assert_eq!(ProductPage::new(Vec::new(), 0, 1, 10).total_pages, 0);
        assert_eq!(ProductPage::new(Vec::new(), 10, 1, 10).total_pages, 1);
        assert_eq!(ProductPage::new(Vec::new(), 11, 1, 10).total_pages, 2);
        assert_eq!(ProductPage::new(Vec::new(), 250, 3, 100).total_pages, 3);
    }
}
