//! Catalog seeding from YAML.
//!
//! ```yaml
//! categories:
//!   - name: Coffee
//!     description: Whole bean and ground
//!     products:
//!       - name: House Blend
//!         sku: COF-HOUSE-1KG
//!         price: "24.90"
//!         stock_quantity: 40
//! ```
//!
//! Entries are validated with the same rules as the admin API. Categories
//! whose slug already exists are reused; products whose sku or slug is taken
//! are skipped.

use std::path::Path;

use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;

use emporium_api::db::inventory::NewMovement;
use emporium_api::db::{RepositoryError, UnitOfWork, categories, inventory, products};
use emporium_api::error::AppError;
use emporium_api::services::category::CategoryInput;
use emporium_api::services::product::ProductInput;
use emporium_core::{CategoryId, MovementType};

use super::ConnectError;

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Could not read seed file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid entry {name}: {source}")]
    Invalid { name: String, source: AppError },

    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error("Database error: {0}")]
    Repository(#[from] RepositoryError),
}

#[derive(Debug, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub categories: Vec<SeedCategory>,
}

#[derive(Debug, Deserialize)]
pub struct SeedCategory {
    pub name: String,
    pub slug: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub sort_order: i32,
    #[serde(default)]
    pub products: Vec<SeedProduct>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedProduct {
    pub name: String,
    pub slug: Option<String>,
    pub sku: String,
    #[serde(default)]
    pub description: String,
    pub price: Decimal,
    pub compare_at_price: Option<Decimal>,
    #[serde(default)]
    pub stock_quantity: i32,
    #[serde(default = "default_threshold")]
    pub low_stock_threshold: i32,
    pub image_url: Option<String>,
}

const fn default_threshold() -> i32 {
    5
}

impl SeedProduct {
    fn into_input(self, category_id: CategoryId) -> ProductInput {
        ProductInput {
            category_id,
            name: self.name,
            slug: self.slug,
            sku: self.sku,
            description: self.description,
            price: self.price,
            compare_at_price: self.compare_at_price,
            stock_quantity: self.stock_quantity,
            low_stock_threshold: self.low_stock_threshold,
            image_url: self.image_url,
            is_active: true,
        }
    }
}

/// Rows written by one seed run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedReport {
    pub categories: usize,
    pub products: usize,
    pub skipped: usize,
}

/// Parse and validate a seed file without touching the database.
///
/// # Errors
///
/// Returns `SeedError::Invalid` for the first entry the admin API would
/// reject.
pub fn parse(content: &str) -> Result<SeedFile, SeedError> {
    let file: SeedFile = serde_yaml::from_str(content)?;
    for category in &file.categories {
        category_input(category).into_fields().map_err(|source| SeedError::Invalid {
            name: category.name.clone(),
            source,
        })?;
        for product in &category.products {
            // Placeholder id: the real category only exists after insert.
            let input = product.clone().into_input(CategoryId::generate());
            input.into_fields().map_err(|source| SeedError::Invalid {
                name: product.name.clone(),
                source,
            })?;
        }
    }
    Ok(file)
}

fn category_input(category: &SeedCategory) -> CategoryInput {
    CategoryInput {
        name: category.name.clone(),
        slug: category.slug.clone(),
        description: category.description.clone(),
        parent_id: None,
        sort_order: category.sort_order,
    }
}

/// Seed categories and products from a YAML file.
///
/// # Errors
///
/// Returns an error if the file is missing or invalid, or a write fails for a
/// reason other than a duplicate.
pub async fn catalog(file_path: &str) -> Result<SeedReport, SeedError> {
    let path = Path::new(file_path);
    if !path.exists() {
        return Err(SeedError::FileNotFound(file_path.to_string()));
    }
    tracing::info!(path = %file_path, "Loading catalog");
    let content = tokio::fs::read_to_string(path).await?;
    let file = parse(&content)?;

    let pool = super::connect().await?;
    let existing = categories::list(&pool).await?;
    let mut report = SeedReport::default();

    for category in file.categories {
        let fields = category_input(&category)
            .into_fields()
            .map_err(|source| SeedError::Invalid {
                name: category.name.clone(),
                source,
            })?;
        let category_id = match existing.iter().find(|c| c.slug == fields.slug) {
            Some(found) => {
                tracing::info!(slug = %found.slug, "Category exists, reusing");
                found.id
            }
            None => {
                let created = categories::create(&pool, &fields).await?;
                report.categories += 1;
                created.id
            }
        };

        for product in category.products {
            let name = product.name.clone();
            let (fields, stock) = product
                .into_input(category_id)
                .into_fields()
                .map_err(|source| SeedError::Invalid {
                    name: name.clone(),
                    source,
                })?;

            let mut uow = UnitOfWork::begin(&pool).await?;
            let created = match products::create(uow.conn(), &fields, stock).await {
                Ok(created) => created,
                Err(RepositoryError::Conflict(reason)) => {
                    tracing::info!(sku = %fields.sku, %reason, "Product exists, skipping");
                    report.skipped += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            if stock > 0 {
                inventory::record(
                    uow.conn(),
                    &NewMovement {
                        product_id: created.id,
                        movement_type: MovementType::Restock,
                        quantity_change: stock,
                        quantity_after: stock,
                        reason: Some("initial stock"),
                        reference_id: None,
                    },
                )
                .await?;
            }
            uow.commit().await?;
            report.products += 1;
        }
    }

    Ok(report)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bundled_catalog() {
        let file = parse(include_str!("../../seed/catalog.yaml")).unwrap();
        assert!(!file.categories.is_empty());
        assert!(file.categories.iter().all(|c| !c.products.is_empty()));
    }

    #[test]
    fn test_parse_rejects_invalid_price() {
        let yaml = r"
categories:
  - name: Tea
    products:
      - name: Free Sample
        sku: TEA-FREE
        price: 0
";
        let err = parse(yaml).unwrap_err();
        assert!(matches!(err, SeedError::Invalid { ref name, .. } if name == "Free Sample"));
    }

    #[test]
    fn test_missing_products_default_to_empty() {
        let file = parse("categories:\n  - name: Gifts\n").unwrap();
        assert_eq!(file.categories.len(), 1);
        assert!(file.categories.first().unwrap().products.is_empty());
    }
}
