//! Sales aggregation queries.
//!
//! All time bounds are half-open (`start <= created_at < end`) and days and
//! months are bucketed in UTC.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use super::RepositoryError;
use crate::models::Product;
use crate::models::report::{
    DailyReport, ExportRow, MonthlySales, TopSearchedProduct, TopSellingProduct,
};

/// Optional half-open time range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// A product with its order aggregates.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductSales {
    #[sqlx(flatten)]
    pub product: Product,
    pub total_revenue: Decimal,
    pub order_count: i64,
}

/// Repository for report queries.
pub struct ReportRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ReportRepository<'a> {
    /// Create a new report repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Sum of all order totals.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn total_revenue(&self) -> Result<Decimal, RepositoryError> {
        let total = sqlx::query_scalar::<_, Decimal>(
            "SELECT COALESCE(SUM(total_price), 0) FROM orders",
        )
        .fetch_one(self.pool)
        .await?;
        Ok(total)
    }

    /// Number of orders.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn total_orders(&self) -> Result<i64, RepositoryError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM orders")
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }

    /// Revenue in `[start, end)`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn revenue_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Decimal, RepositoryError> {
        let total = sqlx::query_scalar::<_, Decimal>(
            "SELECT COALESCE(SUM(total_price), 0) FROM orders \
             WHERE created_at >= $1 AND created_at < $2",
        )
        .bind(start)
        .bind(end)
        .fetch_one(self.pool)
        .await?;
        Ok(total)
    }

    /// Revenue and order count per UTC day, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn daily(&self, range: DateRange) -> Result<Vec<DailyReport>, RepositoryError> {
        let rows = sqlx::query_as::<_, DailyReport>(
            r"
            SELECT (created_at AT TIME ZONE 'UTC')::date AS date,
                   COALESCE(SUM(total_price), 0) AS total_revenue,
                   COUNT(*) AS order_count
            FROM orders
            WHERE ($1::timestamptz IS NULL OR created_at >= $1)
              AND ($2::timestamptz IS NULL OR created_at < $2)
            GROUP BY 1
            ORDER BY 1 DESC
            ",
        )
        .bind(range.start)
        .bind(range.end)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Revenue and order count per calendar month, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn monthly(&self, range: DateRange) -> Result<Vec<MonthlySales>, RepositoryError> {
        let rows = sqlx::query_as::<_, MonthlySales>(
            r"
            SELECT to_char(date_trunc('month', created_at AT TIME ZONE 'UTC'), 'YYYY-MM') AS month,
                   COALESCE(SUM(total_price), 0) AS total_price,
                   COUNT(*) AS count
            FROM orders
            WHERE ($1::timestamptz IS NULL OR created_at >= $1)
              AND ($2::timestamptz IS NULL OR created_at < $2)
            GROUP BY 1
            ORDER BY 1 ASC
            ",
        )
        .bind(range.start)
        .bind(range.end)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Products with the highest revenue from order lines.
    ///
    /// Lines whose product has since been deleted are excluded.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn top_selling(&self, limit: i64) -> Result<Vec<TopSellingProduct>, RepositoryError> {
        let rows = sqlx::query_as::<_, TopSellingProduct>(
            r"
            SELECT oi.product_id,
                   COALESCE(MAX(p.name), MAX(oi.product_name)) AS name,
                   SUM(oi.quantity)::BIGINT AS units_sold,
                   COUNT(DISTINCT oi.order_id) AS order_count,
                   SUM(oi.unit_price * oi.quantity) AS total_revenue
            FROM order_items oi
            LEFT JOIN products p ON p.id = oi.product_id
            WHERE oi.product_id IS NOT NULL
            GROUP BY oi.product_id
            ORDER BY total_revenue DESC, units_sold DESC
            LIMIT $1
            ",
        )
        .bind(limit)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Most viewed products (views > 0).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn top_searched(
        &self,
        limit: i64,
    ) -> Result<Vec<TopSearchedProduct>, RepositoryError> {
        let rows = sqlx::query_as::<_, TopSearchedProduct>(
            "SELECT id, name, views FROM products WHERE views > 0 \
             ORDER BY views DESC, name ASC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Every product with its revenue and the number of orders it appears in.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn product_sales(&self) -> Result<Vec<ProductSales>, RepositoryError> {
        let rows = sqlx::query_as::<_, ProductSales>(
            r"
            SELECT p.id, p.name, p.description, p.price, p.images, p.category, p.quantity,
                   p.views, p.reviews, p.likes, p.created_at, p.updated_at,
                   COALESCE(SUM(oi.unit_price * oi.quantity), 0) AS total_revenue,
                   COUNT(DISTINCT oi.order_id) AS order_count
            FROM products p
            LEFT JOIN order_items oi ON oi.product_id = p.id
            GROUP BY p.id
            ",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Orders for export, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn export_rows(&self) -> Result<Vec<ExportRow>, RepositoryError> {
        let rows = sqlx::query_as::<_, ExportRow>(
            "SELECT id, total_price, created_at FROM orders ORDER BY created_at DESC",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }
}
