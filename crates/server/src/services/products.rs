//! Catalog service.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::PgPool;
use thiserror::Error;

use bazaar_core::{Price, ProductId};

use crate::cache::Cache;
use crate::db::RepositoryError;
use crate::db::products::{
    NewProduct, ProductFilter, ProductRepository, ProductUpdate, SortField, SortOrder,
};
use crate::models::{Product, ProductPage};
use crate::services::media::{MediaError, MediaService, PRODUCT_FOLDER, Upload};

const CATEGORIES_KEY: &str = "product:categories";
const CATEGORIES_TTL: Duration = Duration::from_secs(10 * 60);

/// Largest page a client may request.
pub const MAX_PAGE_SIZE: i64 = 100;

/// Errors from catalog operations.
#[derive(Debug, Error)]
pub enum ProductError {
    #[error("{0}")]
    Validation(String),

    #[error("At least one product image is required")]
    ImageRequired,

    #[error("Product not found")]
    NotFound,

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("media error: {0}")]
    Media(#[from] MediaError),
}

/// Listing query parameters as received.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub search: Option<String>,
    pub category: Option<String>,
    pub min_price: Option<String>,
    pub max_price: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

impl ProductQuery {
    /// Apply defaults and bounds.
    ///
    /// Page and limit are lenient: unparseable values fall back to their
    /// defaults and out-of-range values are clamped.
    ///
    /// # Errors
    ///
    /// Returns `ProductError::Validation` for a price bound that is not a number.
    pub fn into_filter(self) -> Result<ProductFilter, ProductError> {
        let defaults = ProductFilter::default();
        let page = parse_int(self.page.as_deref()).map_or(defaults.page, |p| p.max(1));
        let limit =
            parse_int(self.limit.as_deref()).map_or(defaults.limit, |l| l.clamp(1, MAX_PAGE_SIZE));

        Ok(ProductFilter {
            page,
            limit,
            search: non_blank(self.search),
            category: non_blank(self.category),
            min_price: parse_price_bound(self.min_price.as_deref(), "minPrice")?
                .unwrap_or(Decimal::ZERO),
            max_price: parse_price_bound(self.max_price.as_deref(), "maxPrice")?,
            sort_by: SortField::parse_or_default(self.sort_by.as_deref()),
            sort_order: SortOrder::parse_or_default(self.sort_order.as_deref()),
        })
    }
}

/// Multipart fields for a new product.
#[derive(Debug, Default)]
pub struct ProductForm {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<String>,
    pub category: Option<String>,
    pub quantity: Option<String>,
    pub images: Vec<Upload>,
}

/// JSON body of a product update.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Price>,
    pub category: Option<String>,
    pub quantity: Option<i32>,
}

impl ProductPatch {
    fn validate(self) -> Result<ProductUpdate, ProductError> {
        if self.quantity.is_some_and(|q| q < 0) {
            return Err(ProductError::Validation("quantity cannot be negative".into()));
        }
        Ok(ProductUpdate {
            name: optional_text(self.name, "name")?,
            description: optional_text(self.description, "description")?,
            price: self.price,
            category: optional_text(self.category, "category")?,
            quantity: self.quantity,
        })
    }
}

/// Catalog service.
pub struct ProductService<'a> {
    products: ProductRepository<'a>,
    media: &'a MediaService,
    cache: &'a Cache,
}

impl<'a> ProductService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool, media: &'a MediaService, cache: &'a Cache) -> Self {
        Self {
            products: ProductRepository::new(pool),
            media,
            cache,
        }
    }

    /// Validate the form, upload its images and insert the product.
    ///
    /// # Errors
    ///
    /// Returns `ProductError::Validation` for missing or malformed fields,
    /// `ProductError::ImageRequired` without images, and `ProductError::Media`
    /// if an upload fails (already uploaded images are removed again).
    pub async fn create(&self, form: ProductForm) -> Result<Product, ProductError> {
        let name = required_text(form.name, "name")?;
        let description = required_text(form.description, "description")?;
        let category = required_text(form.category, "category")?;
        let price = Price::parse(&required_text(form.price, "price")?)
            .map_err(|e| ProductError::Validation(format!("price: {e}")))?;
        let quantity = parse_stock(&required_text(form.quantity, "quantity")?)?;
        if form.images.is_empty() {
            return Err(ProductError::ImageRequired);
        }

        let mut images = Vec::with_capacity(form.images.len());
        for upload in form.images {
            match self.media.upload(upload, PRODUCT_FOLDER).await {
                Ok(url) => images.push(url),
                Err(e) => {
                    self.media.destroy_all(&images).await;
                    return Err(e.into());
                }
            }
        }

        let created = self
            .products
            .create(&NewProduct {
                name: &name,
                description: &description,
                price,
                images: &images,
                category: &category,
                quantity,
            })
            .await;
        let product = match created {
            Ok(product) => product,
            Err(e) => {
                self.media.destroy_all(&images).await;
                return Err(e.into());
            }
        };

        self.invalidate_categories().await;
        tracing::info!(product_id = %product.id, "product created");
        Ok(product)
    }

    /// One page of the catalog.
    ///
    /// # Errors
    ///
    /// Returns `ProductError::Repository` if a query fails.
    pub async fn list(&self, filter: &ProductFilter) -> Result<ProductPage, ProductError> {
        let (products, total) = self.products.list(filter).await?;
        Ok(ProductPage::new(products, total, filter.page, filter.limit))
    }

    /// Product detail; counts the view.
    ///
    /// # Errors
    ///
    /// Returns `ProductError::NotFound` for an unknown id.
    pub async fn view(&self, id: ProductId) -> Result<Product, ProductError> {
        self.products.view(id).await?.ok_or(ProductError::NotFound)
    }

    /// Distinct categories, cached.
    ///
    /// # Errors
    ///
    /// Returns `ProductError::Repository` if the query fails.
    pub async fn categories(&self) -> Result<Vec<String>, ProductError> {
        self.cache
            .get_or_compute(CATEGORIES_KEY, CATEGORIES_TTL, || async {
                self.products.categories().await.map_err(ProductError::from)
            })
            .await
    }

    /// Apply a partial update.
    ///
    /// # Errors
    ///
    /// Returns `ProductError::NotFound` for an unknown id.
    pub async fn update(&self, id: ProductId, patch: ProductPatch) -> Result<Product, ProductError> {
        let update = patch.validate()?;
        let product = self.products.update(id, &update).await.map_err(not_found)?;
        if update.category.is_some() {
            self.invalidate_categories().await;
        }
        Ok(product)
    }

    /// Delete a product and its images.
    ///
    /// # Errors
    ///
    /// Returns `ProductError::NotFound` for an unknown id.
    pub async fn delete(&self, id: ProductId) -> Result<Product, ProductError> {
        let product = self.products.delete(id).await.map_err(not_found)?;
        self.media.destroy_all(&product.images).await;
        self.invalidate_categories().await;
        tracing::info!(product_id = %product.id, "product deleted");
        Ok(product)
    }

    async fn invalidate_categories(&self) {
        if let Err(e) = self.cache.invalidate(CATEGORIES_KEY).await {
            tracing::warn!(error = %e, "failed to invalidate category cache");
        }
    }
}

fn not_found(err: RepositoryError) -> ProductError {
    match err {
        RepositoryError::NotFound => ProductError::NotFound,
        other => ProductError::Repository(other),
    }
}

fn parse_int(value: Option<&str>) -> Option<i64> {
    value.and_then(|v| v.trim().parse().ok())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

fn parse_price_bound(value: Option<&str>, field: &str) -> Result<Option<Decimal>, ProductError> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => v
            .parse::<Decimal>()
            .map(Some)
            .map_err(|_| ProductError::Validation(format!("{field} must be a number"))),
    }
}

fn required_text(value: Option<String>, field: &str) -> Result<String, ProductError> {
    non_blank(value).ok_or_else(|| ProductError::Validation(format!("{field} is required")))
}

fn optional_text(value: Option<String>, field: &str) -> Result<Option<String>, ProductError> {
    match value {
        None => Ok(None),
        Some(v) => required_text(Some(v), field).map(Some),
    }
}

fn parse_stock(value: &str) -> Result<i32, ProductError> {
    match value.trim().parse::<i32>() {
        Ok(n) if n >= 0 => Ok(n),
        _ => Err(ProductError::Validation(
            "quantity must be a non-negative whole number".into(),
        )),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn empty_query_uses_defaults() {
        let filter = ProductQuery::default().into_filter().unwrap();
        assert_eq!(filter, ProductFilter::default());
    }

    #[test]
    fn page_and_limit_are_clamped() {
        let filter = ProductQuery {
            page: Some("0".into()),
            limit: Some("1000".into()),
            ..ProductQuery::default()
        }
        .into_filter()
        .unwrap();
        assert_eq!(filter.page, 1);
        assert_eq!(filter.limit, MAX_PAGE_SIZE);

        let filter = ProductQuery {
            page: Some("abc".into()),
            limit: Some("-5".into()),
            ..ProductQuery::default()
        }
        .into_filter()
        .unwrap();
        assert_eq!(filter.page, 1);
        assert_eq!(filter.limit, 1);
    }

    #[test]
    fn huge_page_reads_past_the_end() {
        let filter = ProductQuery {
            page: Some(i64::MAX.to_string()),
            limit: Some("10".into()),
            ..ProductQuery::default()
        }
        .into_filter()
        .unwrap();
        assert_eq!(filter.page, i64::MAX);
        assert_eq!(filter.offset(), i64::MAX);

        let filter = ProductQuery {
            page: Some("3".into()),
            limit: Some("20".into()),
            ..ProductQuery::default()
        }
        .into_filter()
        .unwrap();
        assert_eq!(filter.offset(), 40);
    }

    #[test]
    fn sorting_and_prices_are_parsed() {
        let filter = ProductQuery {
            sort_by: Some("bogus".into()),
            sort_order: Some("DeSc".into()),
            min_price: Some("5".into()),
            max_price: Some("19.99".into()),
            search: Some("  ".into()),
            ..ProductQuery::default()
        }
        .into_filter()
        .unwrap();
        assert_eq!(filter.sort_by, SortField::CreatedAt);
        assert_eq!(filter.sort_order, SortOrder::Desc);
        assert_eq!(filter.min_price, Decimal::new(5, 0));
        assert_eq!(filter.max_price, Some(Decimal::new(1999, 2)));
        assert_eq!(filter.search, None);
    }

    #[test]
    fn bad_price_bound_is_rejected() {
        let result = ProductQuery {
            max_price: Some("cheap".into()),
            ..ProductQuery::default()
        }
        .into_filter();
        assert!(matches!(result, Err(ProductError::Validation(_))));
    }

    #[test]
    fn patch_rejects_blank_and_negative_fields() {
        let blank = ProductPatch {
            name: Some("  ".into()),
            ..ProductPatch::default()
        };
        assert!(matches!(blank.validate(), Err(ProductError::Validation(_))));

        let negative = ProductPatch {
            quantity: Some(-1),
            ..ProductPatch::default()
        };
        assert!(matches!(negative.validate(), Err(ProductError::Validation(_))));

        let ok = ProductPatch {
            name: Some(" Mug ".into()),
            quantity: Some(0),
            ..ProductPatch::default()
        }
        .validate()
        .unwrap();
        assert_eq!(ok.name.as_deref(), Some("Mug"));
        assert_eq!(ok.quantity, Some(0));
    }

    #[test]
    fn patch_price_must_fit_the_column() {
        let result = serde_json::from_str::<ProductPatch>(r#"{"price": "99999999999"}"#);
        assert!(result.is_err());

        let patch: ProductPatch = serde_json::from_str(r#"{"price": "9999999999.99"}"#).unwrap();
        assert_eq!(patch.price, Some(Price::MAX));
    }

    #[test]
    fn parse_stock_accepts_zero() {
        assert_eq!(parse_stock("0").unwrap(), 0);
        assert_eq!(parse_stock(" 12 ").unwrap(), 12);
        assert!(parse_stock("-3").is_err());
        assert!(parse_stock("1.5").is_err());
    }
}
