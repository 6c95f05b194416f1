//! Category catalog with a cached list and tree.

use tracing::instrument;

use emporium_core::CategoryId;

use crate::db::categories::{self, CategoryFields};
use crate::error::{AppError, Result};
use crate::models::category::{build_tree, would_create_cycle};
use crate::models::slug::{is_valid_slug, slugify};
use crate::models::{Category, CategoryNode};
use crate::services::cache::keys;
use crate::state::AppState;

/// Admin input for creating or replacing a category.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct CategoryInput {
    pub name: String,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub parent_id: Option<CategoryId>,
    #[serde(default)]
    pub sort_order: i32,
}

impl CategoryInput {
    /// Validate and normalize into repository fields.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for a blank name or malformed slug.
    pub fn into_fields(self) -> Result<CategoryFields> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::validation("category name is required"));
        }
        let slug = match self.slug.as_deref().map(str::trim) {
            Some(slug) if !slug.is_empty() => slug.to_string(),
            _ => slugify(&name),
        };
        if !is_valid_slug(&slug) {
            return Err(AppError::validation(format!("invalid slug: {slug}")));
        }
        Ok(CategoryFields {
            name,
            slug,
            description: self.description.filter(|d| !d.trim().is_empty()),
            parent_id: self.parent_id,
            sort_order: self.sort_order,
        })
    }
}

pub struct CategoryService<'a> {
    state: &'a AppState,
}

impl<'a> CategoryService<'a> {
    #[must_use]
    pub const fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    /// Flat list ordered by `sort_order`, then name.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Database` if the query fails.
    pub async fn list(&self) -> Result<Vec<Category>> {
        let cache = self.state.cache();
        if let Some(list) = cache.get(keys::CATEGORY_LIST).await {
            return Ok(list);
        }
        let list = categories::list(self.state.pool()).await?;
        cache.set(keys::CATEGORY_LIST, &list).await;
        Ok(list)
    }

    /// Nested tree of every live category.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Database` if the query fails.
    pub async fn tree(&self) -> Result<Vec<CategoryNode>> {
        let cache = self.state.cache();
        if let Some(tree) = cache.get(keys::CATEGORY_TREE).await {
            return Ok(tree);
        }
        let tree = build_tree(self.list().await?);
        cache.set(keys::CATEGORY_TREE, &tree).await;
        Ok(tree)
    }

    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the category does not exist.
    pub async fn get(&self, id: CategoryId) -> Result<Category> {
        categories::get(self.state.pool(), id)
            .await?
            .ok_or_else(|| AppError::not_found("category not found"))
    }

    /// # Errors
    ///
    /// Returns `AppError::Validation` for bad input or a missing parent, and
    /// `AppError::Database` with a conflict when the slug is taken.
    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create(&self, input: CategoryInput) -> Result<Category> {
        let fields = input.into_fields()?;
        if let Some(parent_id) = fields.parent_id {
            self.ensure_parent_exists(parent_id).await?;
        }

        let category = categories::create(self.state.pool(), &fields).await?;
        self.invalidate().await;
        tracing::info!(category_id = %category.id, slug = %category.slug, "Category created");
        Ok(category)
    }

    /// Replace a category's fields.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` if the new parent is missing, is the
    /// category itself or one of its descendants.
    #[instrument(skip(self, input))]
    pub async fn update(&self, id: CategoryId, input: CategoryInput) -> Result<Category> {
        let fields = input.into_fields()?;
        if let Some(parent_id) = fields.parent_id {
            if parent_id == id {
                return Err(AppError::validation("a category cannot be its own parent"));
            }
            self.ensure_parent_exists(parent_id).await?;
            let parents = categories::parent_map(self.state.pool()).await?;
            if would_create_cycle(id, parent_id, &parents) {
                return Err(AppError::validation(
                    "a category cannot be moved under one of its descendants",
                ));
            }
        }

        let category = categories::update(self.state.pool(), id, &fields).await?;
        self.invalidate().await;
        Ok(category)
    }

    /// Soft delete a category with no live children or products.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Conflict` (`CATEGORY_IN_USE`) while anything still
    /// references the category.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: CategoryId) -> Result<()> {
        let (children, products) = categories::dependents(self.state.pool(), id).await?;
        if children > 0 || products > 0 {
            return Err(AppError::conflict(
                "CATEGORY_IN_USE",
                format!(
                    "category still has {children} child categories and {products} products"
                ),
            ));
        }

        categories::soft_delete(self.state.pool(), id).await?;
        self.invalidate().await;
        tracing::info!(category_id = %id, "Category deleted");
        Ok(())
    }

    async fn ensure_parent_exists(&self, parent_id: CategoryId) -> Result<()> {
        if categories::get(self.state.pool(), parent_id).await?.is_none() {
            return Err(AppError::validation("parent category does not exist"));
        }
        Ok(())
    }

    async fn invalidate(&self) {
        self.state.cache().remove_by_prefix(keys::CATEGORY_PREFIX).await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn input(name: &str, slug: Option<&str>) -> CategoryInput {
        CategoryInput {
            name: name.to_string(),
            slug: slug.map(str::to_string),
            description: Some("   ".to_string()),
            parent_id: None,
            sort_order: 0,
        }
    }

    #[test]
    fn test_slug_generated_from_name() {
        let fields = input("  Kitchen & Dining ", None).into_fields().unwrap();
        assert_eq!(fields.name, "Kitchen & Dining");
        assert_eq!(fields.slug, "kitchen-dining");
        assert_eq!(fields.description, None);
    }

    #[test]
    fn test_explicit_slug_kept() {
        let fields = input("Kitchen", Some("kitchenware")).into_fields().unwrap();
        assert_eq!(fields.slug, "kitchenware");
    }

    #[test]
    fn test_blank_name_rejected() {
        assert!(matches!(
            input("   ", None).into_fields(),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_bad_slug_rejected() {
        assert!(matches!(
            input("Kitchen", Some("Not A Slug")).into_fields(),
            Err(AppError::Validation(_))
        ));
    }
}
