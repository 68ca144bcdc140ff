//! Cart route handlers.
//!
//! Every handler works on the caller's own cart.

use axum::extract::State;
use serde::Deserialize;
use tracing::instrument;

use bazaar_core::{CartItemId, ProductId};

use crate::error::{AppError, add_breadcrumb};
use crate::middleware::RequireAuth;
use crate::models::Cart;
use crate::routes::response::{ApiResponse, Json, Path};
use crate::services::CartService;
use crate::state::AppState;

/// Add-to-cart body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddToCartRequest {
    pub product_id: ProductId,
    pub quantity: i64,
}

/// Quantity update body.
#[derive(Debug, Deserialize)]
pub struct UpdateQuantityRequest {
    pub quantity: i64,
}

/// Add a product, merging with an existing line.
///
/// # Route
///
/// `POST /api/v1/cart`
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn add(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Json(body): Json<AddToCartRequest>,
) -> Result<ApiResponse<Cart>, AppError> {
    let cart = CartService::new(state.pool())
        .add_item(user.id, body.product_id, body.quantity)
        .await?;
    add_breadcrumb(
        "cart",
        "Added item",
        Some(&[("product_id", body.product_id.to_string().as_str())]),
    );
    Ok(ApiResponse::created(cart, "Product added to cart"))
}

/// The caller's cart, or `null`.
///
/// # Route
///
/// `GET /api/v1/cart`
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<ApiResponse<Option<Cart>>, AppError> {
    let cart = CartService::new(state.pool()).get(user.id).await?;
    Ok(ApiResponse::ok(cart, "Cart fetched successfully"))
}

/// Set one line's quantity.
///
/// # Route
///
/// `PATCH /api/v1/cart/{itemId}`
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn update(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(item_id): Path<CartItemId>,
    Json(body): Json<UpdateQuantityRequest>,
) -> Result<ApiResponse<Cart>, AppError> {
    let cart = CartService::new(state.pool())
        .update_item(user.id, item_id, body.quantity)
        .await?;
    Ok(ApiResponse::ok(cart, "Cart item updated"))
}

/// Remove one line.
///
/// # Route
///
/// `DELETE /api/v1/cart/{itemId}`
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn remove(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(item_id): Path<CartItemId>,
) -> Result<ApiResponse<Cart>, AppError> {
    let cart = CartService::new(state.pool())
        .remove_item(user.id, item_id)
        .await?;
    Ok(ApiResponse::ok(cart, "Cart item removed"))
}
