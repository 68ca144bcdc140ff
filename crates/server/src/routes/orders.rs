//! Order route handlers.

use axum::extract::State;
use tracing::instrument;

use bazaar_core::OrderId;

use crate::error::{AppError, add_breadcrumb};
use crate::middleware::{RequireAdmin, RequireAuth};
use crate::models::Order;
use crate::routes::response::{ApiResponse, Path};
use crate::services::OrderService;
use crate::state::AppState;

/// Check out the caller's cart.
///
/// # Route
///
/// `POST /api/v1/order`
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn checkout(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<ApiResponse<Order>, AppError> {
    let order = OrderService::new(state.pool()).checkout(user.id).await?;
    add_breadcrumb(
        "order",
        "Checked out",
        Some(&[("order_id", order.id.to_string().as_str())]),
    );
    Ok(ApiResponse::created(order, "Order created successfully"))
}

/// The caller's orders.
///
/// # Route
///
/// `GET /api/v1/order`
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<ApiResponse<Vec<Order>>, AppError> {
    let orders = OrderService::new(state.pool()).list_for_user(user.id).await?;
    Ok(ApiResponse::ok(orders, "Orders fetched successfully"))
}

/// Every order.
///
/// # Route
///
/// `GET /api/v1/order/all` (admin)
#[instrument(skip_all)]
pub async fn all(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<ApiResponse<Vec<Order>>, AppError> {
    let orders = OrderService::new(state.pool()).list_all().await?;
    Ok(ApiResponse::ok(orders, "Orders fetched successfully"))
}

/// One order, for its owner or an admin.
///
/// # Route
///
/// `GET /api/v1/order/{id}`
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<OrderId>,
) -> Result<ApiResponse<Order>, AppError> {
    let order = OrderService::new(state.pool()).get(&user, id).await?;
    Ok(ApiResponse::ok(order, "Order fetched successfully"))
}
