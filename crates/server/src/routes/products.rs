//! Catalog route handlers.

use axum::extract::{Multipart, State};
use tracing::instrument;

use bazaar_core::ProductId;

use crate::error::AppError;
use crate::middleware::RequireAdmin;
use crate::models::{Product, ProductPage};
use crate::routes::multipart::{read_text, read_upload};
use crate::routes::response::{ApiResponse, Json, Path, Query};
use crate::services::products::{ProductForm, ProductPatch, ProductQuery, ProductService};
use crate::state::AppState;

fn product_service(state: &AppState) -> ProductService<'_> {
    ProductService::new(state.pool(), state.media(), state.cache())
}

/// Create a product from a multipart form.
///
/// Files may be sent as `image` or `images`, one part each.
///
/// # Route
///
/// `POST /api/v1/product` (admin)
#[instrument(skip(state, admin, multipart), fields(admin_id = %admin.id))]
pub async fn create(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    mut multipart: Multipart,
) -> Result<ApiResponse<Product>, AppError> {
    let mut form = ProductForm::default();

    while let Some(field) = multipart.next_field().await? {
        match field.name() {
            Some("name") => form.name = Some(read_text(field).await?),
            Some("description") => form.description = Some(read_text(field).await?),
            Some("price") => form.price = Some(read_text(field).await?),
            Some("category") => form.category = Some(read_text(field).await?),
            Some("quantity") => form.quantity = Some(read_text(field).await?),
            Some("image" | "images") => form.images.push(read_upload(field).await?),
            _ => {}
        }
    }

    let product = product_service(&state).create(form).await?;
    Ok(ApiResponse::created(product, "Product created successfully"))
}

/// Paginated, filtered listing.
///
/// # Route
///
/// `GET /api/v1/product`
#[instrument(skip(state))]
pub async fn index(
    State(state): State<AppState>,
    Query(query): Query<ProductQuery>,
) -> Result<ApiResponse<ProductPage>, AppError> {
    let filter = query.into_filter()?;
    let page = product_service(&state).list(&filter).await?;
    Ok(ApiResponse::ok(page, "Products fetched successfully"))
}

/// Distinct categories.
///
/// # Route
///
/// `GET /api/v1/product/category`
#[instrument(skip(state))]
pub async fn categories(
    State(state): State<AppState>,
) -> Result<ApiResponse<Vec<String>>, AppError> {
    let categories = product_service(&state).categories().await?;
    Ok(ApiResponse::ok(categories, "Categories fetched successfully"))
}

/// Product detail.
///
/// # Route
///
/// `GET /api/v1/product/{id}`
#[instrument(skip(state))]
pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
) -> Result<ApiResponse<Product>, AppError> {
    let product = product_service(&state).view(id).await?;
    Ok(ApiResponse::ok(product, "Product fetched successfully"))
}

/// Partial update.
///
/// # Route
///
/// `PUT /api/v1/product/{id}` (admin)
#[instrument(skip(state, admin, patch), fields(admin_id = %admin.id))]
pub async fn update(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<ProductId>,
    Json(patch): Json<ProductPatch>,
) -> Result<ApiResponse<Product>, AppError> {
    let product = product_service(&state).update(id, patch).await?;
    Ok(ApiResponse::ok(product, "Product updated successfully"))
}

/// Delete a product and its images.
///
/// # Route
///
/// `DELETE /api/v1/product/{id}` (admin)
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn delete(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<ProductId>,
) -> Result<ApiResponse<Option<()>>, AppError> {
    product_service(&state).delete(id).await?;
    Ok(ApiResponse::ok(None, "Product deleted successfully"))
}
