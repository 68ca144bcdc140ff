//! Catalog seeding from YAML.
//!
//! ```yaml
//! - name: Enamel Mug
//!   description: 350 ml, dishwasher safe
//!   price: "12.50"
//!   category: kitchen
//!   quantity: 40
//!   images:
//!     - https://res.cloudinary.com/demo/image/upload/mug.jpg
//! ```
//!
//! Images are referenced by URL; nothing is uploaded.

use std::path::Path;

use serde::Deserialize;
use tracing::{error, info};

use bazaar_core::Price;
use bazaar_server::db::products::{NewProduct, ProductRepository};

/// One product entry in a seed file.
#[derive(Debug, Deserialize)]
pub struct SeedProduct {
    pub name: String,
    pub description: String,
    pub price: Price,
    pub category: String,
    pub quantity: i32,
    #[serde(default)]
    pub images: Vec<String>,
}

/// Problems with a seed entry, prefixed with its position.
fn validate(products: &[SeedProduct]) -> Vec<String> {
    let mut errors = Vec::new();
    for (index, product) in products.iter().enumerate() {
        let at = index + 1;
        if product.name.trim().is_empty() {
            errors.push(format!("#{at}: name is empty"));
        }
        if product.category.trim().is_empty() {
            errors.push(format!("#{at} ({}): category is empty", product.name));
        }
        if product.quantity < 0 {
            errors.push(format!("#{at} ({}): quantity is negative", product.name));
        }
        if product.images.is_empty() {
            errors.push(format!("#{at} ({}): at least one image is required", product.name));
        }
    }
    errors
}

/// Insert every product in `file_path`.
///
/// The whole file is validated before anything is written.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, fails validation,
/// or an insert fails.
pub async fn products(file_path: &str) -> Result<usize, Box<dyn std::error::Error>> {
    let path = Path::new(file_path);
    if !path.exists() {
        return Err(format!("File not found: {file_path}").into());
    }

    info!(path = %file_path, "Loading products from file");
    let content = tokio::fs::read_to_string(path).await?;
    let products: Vec<SeedProduct> = serde_yaml::from_str(&content)?;
    info!(products = products.len(), "Parsed seed file");

    let errors = validate(&products);
    if !errors.is_empty() {
        error!("Seed file validation failed:");
        for err in &errors {
            error!("  - {err}");
        }
        return Err(format!("{} validation errors found", errors.len()).into());
    }

    let pool = super::connect().await?;
    let repo = ProductRepository::new(&pool);

    for product in &products {
        let created = repo
            .create(&NewProduct {
                name: product.name.trim(),
                description: product.description.trim(),
                price: product.price,
                images: &product.images,
                category: product.category.trim(),
                quantity: product.quantity,
            })
            .await?;
        info!(id = %created.id, name = %created.name, "Inserted product");
    }

    info!("Seeding complete! {} products inserted", products.len());
    Ok(products.len())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
- name: Enamel Mug
  description: 350 ml
  price: "12.50"
  category: kitchen
  quantity: 40
  images: [https://example.com/mug.jpg]
- name: ""
  description: nothing
  price: "1.00"
  category: misc
  quantity: -1
"#;

    #[test]
    fn parses_and_flags_bad_entries() {
        let products: Vec<SeedProduct> = serde_yaml::from_str(SAMPLE).unwrap();
        assert_eq!(products.len(), 2);
        assert_eq!(products[0].price, Price::parse("12.50").unwrap());

        let errors = validate(&products);
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().all(|e| e.starts_with("#2")));
    }

    #[test]
    fn negative_price_does_not_parse() {
        let yaml = "- {name: X, description: Y, price: \"-1\", category: c, quantity: 1}";
        assert!(serde_yaml::from_str::<Vec<SeedProduct>>(yaml).is_err());
    }
}
