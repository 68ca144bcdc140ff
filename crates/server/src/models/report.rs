//! Sales report rows.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use bazaar_core::{OrderId, ProductId};

use super::Product;

/// Revenue and order count for one UTC day.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DailyReport {
    pub date: NaiveDate,
    pub total_revenue: Decimal,
    pub order_count: i64,
}

/// Revenue and order count for one calendar month (`YYYY-MM`).
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MonthlySales {
    pub month: String,
    pub total_price: Decimal,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TopSellingProduct {
    pub product_id: ProductId,
    pub name: String,
    pub units_sold: i64,
    pub order_count: i64,
    pub total_revenue: Decimal,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TopSearchedProduct {
    pub id: ProductId,
    pub name: String,
    pub views: i32,
}

/// Year-over-year revenue comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YearOverYear {
    pub current_year_revenue: Decimal,
    pub previous_year_revenue: Decimal,
    pub growth_percentage: Decimal,
}

/// Month-over-month revenue comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthOverMonth {
    pub current_month_revenue: Decimal,
    pub previous_month_revenue: Decimal,
    pub growth_percentage: Decimal,
}

/// Revenue per product relative to the number of orders it appears in.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profitability {
    pub product: Product,
    pub total_revenue: Decimal,
    pub order_count: i64,
    pub revenue_per_order: Decimal,
}

/// One order line of an export file.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ExportRow {
    pub id: OrderId,
    pub total_price: Decimal,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::cache::Cache;

    #[tokio::test]
    async fn period_comparisons_survive_the_cache() {
        let cache = Cache::memory();
        let ttl = Duration::from_secs(60);

        let yoy = YearOverYear {
            current_year_revenue: Decimal::new(15_000, 2),
            previous_year_revenue: Decimal::new(10_000, 2),
            growth_percentage: Decimal::new(50, 0),
        };
        cache.set_json("report:yoy:2025", &yoy, ttl).await.unwrap();
        let cached: Option<YearOverYear> = cache.get_json("report:yoy:2025").await.unwrap();
        assert_eq!(cached, Some(yoy));

        let mom = MonthOverMonth {
            current_month_revenue: Decimal::new(2_550, 2),
            previous_month_revenue: Decimal::ZERO,
            growth_percentage: Decimal::ZERO,
        };
        cache.set_json("report:mom:2025:1", &mom, ttl).await.unwrap();
        let cached: Option<MonthOverMonth> = cache.get_json("report:mom:2025:1").await.unwrap();
        assert_eq!(cached, Some(mom));
    }

    #[test]
    fn comparisons_serialize_camel_case() {
        let json = serde_json::to_value(MonthOverMonth {
            current_month_revenue: Decimal::new(1_000, 2),
            previous_month_revenue: Decimal::new(500, 2),
            growth_percentage: Decimal::new(100, 0),
        })
        .unwrap();
        assert_eq!(json["currentMonthRevenue"], "10.00");
        assert_eq!(json["growthPercentage"], "100");
    }
}
