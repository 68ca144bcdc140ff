//! Sales report route handlers (admin only).

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};
use rust_decimal::Decimal;
use tracing::instrument;

use crate::error::AppError;
use crate::middleware::RequireAdmin;
use crate::models::report::{
    DailyReport, MonthOverMonth, MonthlySales, Profitability, TopSearchedProduct,
    TopSellingProduct, YearOverYear,
};
use crate::routes::response::{ApiResponse, Path, Query};
use crate::services::ExportFormat;
use crate::services::reports::{RangeQuery, ReportService};
use crate::state::AppState;

fn report_service(state: &AppState) -> ReportService<'_> {
    ReportService::new(state.pool(), state.cache())
}

/// `GET /api/v1/report/totalRevenue`
#[instrument(skip_all)]
pub async fn total_revenue(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<ApiResponse<Decimal>, AppError> {
    let total = report_service(&state).total_revenue().await?;
    Ok(ApiResponse::ok(total, "Total sales fetched"))
}

/// `GET /api/v1/report/totalOrders`
#[instrument(skip_all)]
pub async fn total_orders(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<ApiResponse<i64>, AppError> {
    let total = report_service(&state).total_orders().await?;
    Ok(ApiResponse::ok(total, "Total orders fetched"))
}

/// `GET /api/v1/report/dailyReport?from&to`
#[instrument(skip(state, _admin))]
pub async fn daily(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Query(range): Query<RangeQuery>,
) -> Result<ApiResponse<Vec<DailyReport>>, AppError> {
    let report = report_service(&state).daily(range.into_range()?).await?;
    Ok(ApiResponse::ok(report, "Daily report fetched"))
}

/// `GET /api/v1/report/monthlySales?from&to`
#[instrument(skip(state, _admin))]
pub async fn monthly(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Query(range): Query<RangeQuery>,
) -> Result<ApiResponse<Vec<MonthlySales>>, AppError> {
    let report = report_service(&state).monthly(range.into_range()?).await?;
    Ok(ApiResponse::ok(report, "Monthly sales fetched"))
}

/// `GET /api/v1/report/topSellingProducts`
#[instrument(skip_all)]
pub async fn top_selling(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<ApiResponse<Vec<TopSellingProduct>>, AppError> {
    let report = report_service(&state).top_selling().await?;
    Ok(ApiResponse::ok(report, "Top selling products fetched"))
}

/// `GET /api/v1/report/topSearchedProducts`
#[instrument(skip_all)]
pub async fn top_searched(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<ApiResponse<Vec<TopSearchedProduct>>, AppError> {
    let report = report_service(&state).top_searched().await?;
    Ok(ApiResponse::ok(report, "Top searched products fetched"))
}

/// `GET /api/v1/report/yoy/{year}`
#[instrument(skip(state, _admin))]
pub async fn year_over_year(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(year): Path<i32>,
) -> Result<ApiResponse<YearOverYear>, AppError> {
    let report = report_service(&state).year_over_year(year).await?;
    Ok(ApiResponse::ok(report, "Year over year growth fetched"))
}

/// `GET /api/v1/report/mom/{year}/{month}`
#[instrument(skip(state, _admin))]
pub async fn month_over_month(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path((year, month)): Path<(i32, u32)>,
) -> Result<ApiResponse<MonthOverMonth>, AppError> {
    let report = report_service(&state).month_over_month(year, month).await?;
    Ok(ApiResponse::ok(report, "Month over month growth fetched"))
}

/// `GET /api/v1/report/profitability`
#[instrument(skip_all)]
pub async fn profitability(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<ApiResponse<Vec<Profitability>>, AppError> {
    let report = report_service(&state).profitability().await?;
    Ok(ApiResponse::ok(report, "Profitability fetched"))
}

/// Render every order in `format` as a download.
async fn export(state: &AppState, format: ExportFormat) -> Result<Response, AppError> {
    let rows = report_service(state).export_rows().await?;
    let count = rows.len();

    let bytes = tokio::task::spawn_blocking(move || format.render(&rows))
        .await
        .map_err(|e| AppError::Internal(format!("export task failed: {e}")))??;

    tracing::info!(?format, orders = count, size = bytes.len(), "report exported");

    Ok((
        [
            (header::CONTENT_TYPE, format.mime_type().to_owned()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", format.file_name()),
            ),
        ],
        bytes,
    )
        .into_response())
}

/// `GET /api/v1/report/export/csv`
#[instrument(skip_all)]
pub async fn export_csv(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<Response, AppError> {
    export(&state, ExportFormat::Csv).await
}

/// `GET /api/v1/report/export/excel`
#[instrument(skip_all)]
pub async fn export_excel(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<Response, AppError> {
    export(&state, ExportFormat::Excel).await
}

/// `GET /api/v1/report/export/pdf`
#[instrument(skip_all)]
pub async fn export_pdf(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<Response, AppError> {
    export(&state, ExportFormat::Pdf).await
}
