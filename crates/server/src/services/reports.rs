//! Sales reports for administrators.

use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::PgPool;
use thiserror::Error;

use crate::cache::Cache;
use crate::db::RepositoryError;
use crate::db::reports::{DateRange, ReportRepository};
use crate::models::report::{
    DailyReport, ExportRow, MonthOverMonth, MonthlySales, Profitability, TopSearchedProduct,
    TopSellingProduct, YearOverYear,
};

/// How long scalar report results are cached.
const REPORT_TTL: Duration = Duration::from_secs(60);

/// Rows returned by the "top" reports.
const TOP_LIMIT: i64 = 10;

/// Errors from report operations.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("{0}")]
    InvalidPeriod(String),

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// `from` / `to` query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct RangeQuery {
    pub from: Option<String>,
    pub to: Option<String>,
}

impl RangeQuery {
    /// Parse into a half-open range. A bare `to` date includes that whole day.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::InvalidPeriod` for values that are neither a
    /// `YYYY-MM-DD` date nor an RFC 3339 timestamp.
    pub fn into_range(self) -> Result<DateRange, ReportError> {
        Ok(DateRange {
            start: parse_bound(self.from.as_deref(), Bound::Start)?,
            end: parse_bound(self.to.as_deref(), Bound::End)?,
        })
    }
}

#[derive(Clone, Copy)]
enum Bound {
    Start,
    End,
}

fn parse_bound(value: Option<&str>, bound: Bound) -> Result<Option<DateTime<Utc>>, ReportError> {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };

    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        let day = match bound {
            Bound::Start => Some(date),
            Bound::End => date.succ_opt(),
        };
        return day
            .map(start_of_day)
            .map(Some)
            .ok_or_else(|| ReportError::InvalidPeriod(format!("date out of range: {value}")));
    }

    DateTime::parse_from_rfc3339(value)
        .map(|dt| Some(dt.with_timezone(&Utc)))
        .map_err(|_| ReportError::InvalidPeriod(format!("invalid date: {value}")))
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

/// `[Jan 1 of year, Jan 1 of year + 1)`.
fn year_bounds(year: i32) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let start = NaiveDate::from_ymd_opt(year, 1, 1)?;
    let end = NaiveDate::from_ymd_opt(year.checked_add(1)?, 1, 1)?;
    Some((start_of_day(start), start_of_day(end)))
}

/// `[first of month, first of next month)`.
fn month_bounds(year: i32, month: u32) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)?;
    let (next_year, next_month) = next_month(year, month)?;
    let end = NaiveDate::from_ymd_opt(next_year, next_month, 1)?;
    Some((start_of_day(start), start_of_day(end)))
}

fn next_month(year: i32, month: u32) -> Option<(i32, u32)> {
    if month == 12 {
        Some((year.checked_add(1)?, 1))
    } else {
        Some((year, month + 1))
    }
}

fn previous_month(year: i32, month: u32) -> Option<(i32, u32)> {
    if month == 1 {
        Some((year.checked_sub(1)?, 12))
    } else {
        Some((year, month - 1))
    }
}

/// `(current - previous) / previous * 100`, rounded to two places; 0 when
/// there is nothing to compare against.
fn growth_percentage(current: Decimal, previous: Decimal) -> Decimal {
    if previous.is_zero() {
        return Decimal::ZERO;
    }
    ((current - previous) / previous * Decimal::ONE_HUNDRED).round_dp(2)
}

fn revenue_per_order(total: Decimal, orders: i64) -> Decimal {
    if orders == 0 {
        Decimal::ZERO
    } else {
        (total / Decimal::from(orders)).round_dp(2)
    }
}

/// Report service.
pub struct ReportService<'a> {
    reports: ReportRepository<'a>,
    cache: &'a Cache,
}

impl<'a> ReportService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool, cache: &'a Cache) -> Self {
        Self {
            reports: ReportRepository::new(pool),
            cache,
        }
    }

    /// Sum of every order total.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::Repository` if the query fails.
    pub async fn total_revenue(&self) -> Result<Decimal, ReportError> {
        self.cache
            .get_or_compute("report:total_revenue", REPORT_TTL, || async {
                self.reports.total_revenue().await.map_err(ReportError::from)
            })
            .await
    }

    /// Number of orders.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::Repository` if the query fails.
    pub async fn total_orders(&self) -> Result<i64, ReportError> {
        self.cache
            .get_or_compute("report:total_orders", REPORT_TTL, || async {
                self.reports.total_orders().await.map_err(ReportError::from)
            })
            .await
    }

    /// Revenue per UTC day, newest first.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::Repository` if the query fails.
    pub async fn daily(&self, range: DateRange) -> Result<Vec<DailyReport>, ReportError> {
        Ok(self.reports.daily(range).await?)
    }

    /// Revenue per month, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::Repository` if the query fails.
    pub async fn monthly(&self, range: DateRange) -> Result<Vec<MonthlySales>, ReportError> {
        Ok(self.reports.monthly(range).await?)
    }

    /// The ten products with the highest revenue.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::Repository` if the query fails.
    pub async fn top_selling(&self) -> Result<Vec<TopSellingProduct>, ReportError> {
        Ok(self.reports.top_selling(TOP_LIMIT).await?)
    }

    /// The ten most viewed products.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::Repository` if the query fails.
    pub async fn top_searched(&self) -> Result<Vec<TopSearchedProduct>, ReportError> {
        Ok(self.reports.top_searched(TOP_LIMIT).await?)
    }

    /// Compare a calendar year with the one before.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::InvalidPeriod` for a year chrono cannot represent.
    pub async fn year_over_year(&self, year: i32) -> Result<YearOverYear, ReportError> {
        let invalid = || ReportError::InvalidPeriod(format!("invalid year: {year}"));
        let (start, end) = year_bounds(year).ok_or_else(invalid)?;
        let (prev_start, prev_end) = year
            .checked_sub(1)
            .and_then(year_bounds)
            .ok_or_else(invalid)?;

        self.cache
            .get_or_compute(&format!("report:yoy:{year}"), REPORT_TTL, || async {
                let current = self.reports.revenue_between(start, end).await?;
                let previous = self.reports.revenue_between(prev_start, prev_end).await?;
                Ok::<_, ReportError>(YearOverYear {
                    current_year_revenue: current,
                    previous_year_revenue: previous,
                    growth_percentage: growth_percentage(current, previous),
                })
            })
            .await
    }

    /// Compare a month with the one before (January with the previous December).
    ///
    /// # Errors
    ///
    /// Returns `ReportError::InvalidPeriod` unless `month` is 1..=12.
    pub async fn month_over_month(
        &self,
        year: i32,
        month: u32,
    ) -> Result<MonthOverMonth, ReportError> {
        let invalid = || ReportError::InvalidPeriod(format!("invalid month: {year}-{month}"));
        let (start, end) = month_bounds(year, month).ok_or_else(invalid)?;
        let (prev_year, prev_month) = previous_month(year, month).ok_or_else(invalid)?;
        let (prev_start, prev_end) = month_bounds(prev_year, prev_month).ok_or_else(invalid)?;

        self.cache
            .get_or_compute(&format!("report:mom:{year}:{month}"), REPORT_TTL, || async {
                let current = self.reports.revenue_between(start, end).await?;
                let previous = self.reports.revenue_between(prev_start, prev_end).await?;
                Ok::<_, ReportError>(MonthOverMonth {
                    current_month_revenue: current,
                    previous_month_revenue: previous,
                    growth_percentage: growth_percentage(current, previous),
                })
            })
            .await
    }

    /// Revenue per order for every product, best first.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::Repository` if the query fails.
    pub async fn profitability(&self) -> Result<Vec<Profitability>, ReportError> {
        let mut rows: Vec<Profitability> = self
            .reports
            .product_sales()
            .await?
            .into_iter()
            .map(|sales| Profitability {
                revenue_per_order: revenue_per_order(sales.total_revenue, sales.order_count),
                product: sales.product,
                total_revenue: sales.total_revenue,
                order_count: sales.order_count,
            })
            .collect();
        rows.sort_by(|a, b| {
            b.revenue_per_order
                .cmp(&a.revenue_per_order)
                .then_with(|| b.total_revenue.cmp(&a.total_revenue))
        });
        Ok(rows)
    }

    /// Orders to export, newest first.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::Repository` if the query fails.
    pub async fn export_rows(&self) -> Result<Vec<ExportRow>, ReportError> {
        Ok(self.reports.export_rows().await?)
    }
}
