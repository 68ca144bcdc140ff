//! Product repository.

use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, QueryBuilder};

use bazaar_core::{Price, ProductId};

use super::RepositoryError;
use crate::models::Product;

const PRODUCT_COLUMNS: &str = "id, name, description, price, images, category, quantity, views, \
     reviews, likes, created_at, updated_at";

/// Sortable product columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    CreatedAt,
    Price,
    Name,
    Views,
    Likes,
    Quantity,
}

impl SortField {
    /// Parse the `sortBy` query value; unknown values fall back to `CreatedAt`.
    #[must_use]
    pub fn parse_or_default(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("price") => Self::Price,
            Some("name") => Self::Name,
            Some("views") => Self::Views,
            Some("likes") => Self::Likes,
            Some("quantity") => Self::Quantity,
            _ => Self::CreatedAt,
        }
    }

    const fn column(self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
            Self::Price => "price",
            Self::Name => "name",
            Self::Views => "views",
            Self::Likes => "likes",
            Self::Quantity => "quantity",
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    /// `DESC` in any case selects descending order; anything else is ascending.
    #[must_use]
    pub fn parse_or_default(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.trim().eq_ignore_ascii_case("desc") => Self::Desc,
            _ => Self::Asc,
        }
    }

    const fn keyword(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// A normalized product listing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductFilter {
    pub page: i64,
    pub limit: i64,
    pub search: Option<String>,
    pub category: Option<String>,
    pub min_price: Decimal,
    pub max_price: Option<Decimal>,
    pub sort_by: SortField,
    pub sort_order: SortOrder,
}

impl Default for ProductFilter {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 10,
            search: None,
            category: None,
            min_price: Decimal::ZERO,
            max_price: None,
            sort_by: SortField::default(),
            sort_order: SortOrder::default(),
        }
    }
}

impl ProductFilter {
    /// Rows to skip for the requested page.
    ///
    /// Saturates, so an absurd page reads past the end instead of overflowing.
    #[must_use]
    pub const fn offset(&self) -> i64 {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }

    fn push_conditions<'q>(&'q self, builder: &mut QueryBuilder<'q, Postgres>) {
        builder.push(" WHERE price >= ").push_bind(self.min_price);
        if let Some(max) = self.max_price {
            builder.push(" AND price <= ").push_bind(max);
        }
        if let Some(search) = &self.search {
            let pattern = format!("%{search}%");
            builder
                .push(" AND (name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR description ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR category ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
        if let Some(category) = &self.category {
            builder
                .push(" AND category ILIKE ")
                .push_bind(format!("%{category}%"));
        }
    }
}

/// Fields for a new product.
#[derive(Debug)]
pub struct NewProduct<'a> {
    pub name: &'a str,
    pub description: &'a str,
    pub price: Price,
    pub images: &'a [String],
    pub category: &'a str,
    pub quantity: i32,
}

/// Partial product update; `None` keeps the current value.
#[derive(Debug, Default)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Price>,
    pub category: Option<String>,
    pub quantity: Option<i32>,
}

/// Repository for catalog operations.
pub struct ProductRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProductRepository<'a> {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn create(&self, new: &NewProduct<'_>) -> Result<Product, RepositoryError> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "INSERT INTO products (id, name, description, price, images, category, quantity) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(ProductId::generate())
        .bind(new.name)
        .bind(new.description)
        .bind(new.price)
        .bind(new.images)
        .bind(new.category)
        .bind(new.quantity)
        .fetch_one(self.pool)
        .await?;
        Ok(product)
    }

    /// Get a product by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(product)
    }

    /// Fetch a product for its detail page, counting the view.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn view(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "UPDATE products SET views = views + 1 WHERE id = $1 RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(product)
    }

    /// List one page of products matching `filter`, with the total match count.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn list(&self, filter: &ProductFilter) -> Result<(Vec<Product>, i64), RepositoryError> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM products");
        filter.push_conditions(&mut count);
        let total = count.build_query_scalar::<i64>().fetch_one(self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!(
            "SELECT {PRODUCT_COLUMNS} FROM products"
        ));
        filter.push_conditions(&mut select);
        select
            .push(" ORDER BY ")
            .push(filter.sort_by.column())
            .push(" ")
            .push(filter.sort_order.keyword())
            .push(", id ASC LIMIT ")
            .push_bind(filter.limit)
            .push(" OFFSET ")
            .push_bind(filter.offset());

        let products = select
            .build_query_as::<Product>()
            .fetch_all(self.pool)
            .await?;
        Ok((products, total))
    }

    /// Distinct categories, alphabetically.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn categories(&self) -> Result<Vec<String>, RepositoryError> {
        let categories =
            sqlx::query_scalar("SELECT DISTINCT category FROM products ORDER BY category")
                .fetch_all(self.pool)
                .await?;
        Ok(categories)
    }

    /// Apply a partial update.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    pub async fn update(
        &self,
        id: ProductId,
        update: &ProductUpdate,
    ) -> Result<Product, RepositoryError> {
        sqlx::query_as::<_, Product>(&format!(
            r"
            UPDATE products
            SET name = COALESCE($2, name),
                description = COALESCE($3, description),
                price = COALESCE($4, price),
                category = COALESCE($5, category),
                quantity = COALESCE($6, quantity),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {PRODUCT_COLUMNS}
            "
        ))
        .bind(id)
        .bind(update.name.as_deref())
        .bind(update.description.as_deref())
        .bind(update.price)
        .bind(update.category.as_deref())
        .bind(update.quantity)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// Delete a product, returning the deleted row so its images can be removed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    pub async fn delete(&self, id: ProductId) -> Result<Product, RepositoryError> {
        sqlx::query_as::<_, Product>(&format!(
            "DELETE FROM products WHERE id = $1 RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_field_whitelist() {
        assert_eq!(SortField::parse_or_default(Some("price")), SortField::Price);
        assert_eq!(SortField::parse_or_default(Some("likes")), SortField::Likes);
        assert_eq!(SortField::parse_or_default(None), SortField::CreatedAt);
        assert_eq!(
            SortField::parse_or_default(Some("price; DROP TABLE products")),
            SortField::CreatedAt
        );
        assert_eq!(SortField::parse_or_default(Some("createdAt")), SortField::CreatedAt);
    }

    #[test]
    fn sort_order_is_case_insensitive() {
        assert_eq!(SortOrder::parse_or_default(Some("desc")), SortOrder::Desc);
        assert_eq!(SortOrder::parse_or_default(Some("DESC")), SortOrder::Desc);
        assert_eq!(SortOrder::parse_or_default(Some("sideways")), SortOrder::Asc);
        assert_eq!(SortOrder::parse_or_default(None), SortOrder::Asc);
    }

    #[test]
    fn filter_builds_expected_sql() {
        let filter = ProductFilter {
            search: Some("mug".to_owned()),
            category: Some("kitchen".to_owned()),
            max_price: Some(Decimal::new(5000, 2)),
            ..ProductFilter::default()
        };
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM products");
        filter.push_conditions(&mut builder);
        assert_eq!(
            builder.sql(),
            "SELECT COUNT(*) FROM products WHERE price >= $1 AND price <= $2 \
             AND (name ILIKE $3 OR description ILIKE $4 OR category ILIKE $5) \
             AND category ILIKE $6"
        );
    }

    #[test]
    fn offset_from_page() {
        let filter = ProductFilter {
            page: 3,
            limit: 20,
            ..ProductFilter::default()
        };
        assert_eq!(filter.offset(), 40);
    }
}
