//! Product reviews and moderation.

use serde::{Deserialize, Serialize};
use tracing::instrument;

use emporium_core::{Page, PageRequest, ProductId, ReviewId, UserId};

use crate::db::{RepositoryError, UnitOfWork, orders, products, reviews};
use crate::error::{AppError, Result};
use crate::models::Review;
use crate::models::review::{ProductReviews, RatingBreakdown, ReviewContent};
use crate::services::product::invalidate_product;
use crate::state::AppState;

/// Body of review create and update requests.
#[derive(Debug, Clone, Deserialize)]
pub struct ReviewInput {
    pub rating: i16,
    pub title: Option<String>,
    pub body: String,
}

impl ReviewInput {
    fn content(&self) -> Result<ReviewContent> {
        ReviewContent::parse(self.rating, self.title.as_deref(), &self.body).map_err(AppError::Validation)
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct HelpfulCount {
    pub helpful_count: i32,
}

pub struct ReviewService<'a> {
    state: &'a AppState,
}

impl<'a> ReviewService<'a> {
    #[must_use]
    pub const fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    /// Approved reviews, newest first, with the rating breakdown.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown product.
    pub async fn list_for_product(
        &self,
        product_id: ProductId,
        page: PageRequest,
    ) -> Result<ProductReviews> {
        let pool = self.state.pool();
        products::get_plain(pool, product_id)
            .await?
            .ok_or_else(|| AppError::not_found("product not found"))?;

        let (items, total) = reviews::list_approved(pool, product_id, page).await?;
        let counts = reviews::rating_counts(pool, product_id).await?;
        Ok(ProductReviews {
            rating: RatingBreakdown::from_counts(&counts),
            reviews: Page::new(items, page, total),
        })
    }

    /// Submit a review; it stays hidden until approved.
    ///
    /// # Errors
    ///
    /// Returns `ALREADY_REVIEWED` for a second review of the same product.
    #[instrument(skip(self, input))]
    pub async fn create(
        &self,
        user_id: UserId,
        product_id: ProductId,
        input: &ReviewInput,
    ) -> Result<Review> {
        let content = input.content()?;
        let pool = self.state.pool();
        products::get_plain(pool, product_id)
            .await?
            .ok_or_else(|| AppError::not_found("product not found"))?;
        if reviews::exists_for_user(pool, product_id, user_id).await? {
            return Err(already_reviewed());
        }

        let verified = orders::has_delivered_purchase(pool, user_id, product_id).await?;
        let id = reviews::create(pool, product_id, user_id, &content, verified)
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => already_reviewed(),
                other => other.into(),
            })?;
        tracing::info!(review_id = %id, verified, "Review submitted");
        self.load(id).await
    }

    /// Edit an own review. Editing sends it back to moderation.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Database` (not found) unless the review is the user's.
    #[instrument(skip(self, input))]
    pub async fn update(&self, user_id: UserId, id: ReviewId, input: &ReviewInput) -> Result<Review> {
        let content = input.content()?;
        let pool = self.state.pool();
        let before = self.load(id).await?;
        reviews::update_own(pool, id, user_id, &content).await?;
        if before.is_approved {
            self.refresh_product(before.product_id).await;
        }
        self.load(id).await
    }

    /// # Errors
    ///
    /// Returns `AppError::Database` (not found) unless the review is the user's.
    pub async fn delete(&self, user_id: UserId, id: ReviewId) -> Result<()> {
        let product_id = reviews::soft_delete_own(self.state.pool(), id, user_id).await?;
        self.refresh_product(product_id).await;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `AppError::Database` (not found) for an unknown review.
    #[instrument(skip(self))]
    pub async fn approve(&self, id: ReviewId) -> Result<Review> {
        let product_id = reviews::approve(self.state.pool(), id).await?;
        self.refresh_product(product_id).await;
        self.load(id).await
    }

    /// Oldest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Database` if the query fails.
    pub async fn list_pending(&self, page: PageRequest) -> Result<Page<Review>> {
        let (items, total) = reviews::list_pending(self.state.pool(), page).await?;
        Ok(Page::new(items, page, total))
    }

    /// Count the user's helpful vote once; repeat votes leave the count as is.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` unless the review is approved.
    #[instrument(skip(self))]
    pub async fn mark_helpful(&self, user_id: UserId, id: ReviewId) -> Result<HelpfulCount> {
        let mut uow = UnitOfWork::begin(self.state.pool()).await?;
        let current = reviews::lock_helpful_count(uow.conn(), id)
            .await?
            .ok_or_else(|| AppError::not_found("review not found"))?;
        let helpful_count = if reviews::record_helpful_vote(uow.conn(), id, user_id).await? {
            reviews::increment_helpful(uow.conn(), id).await?
        } else {
            current
        };
        uow.commit().await?;
        Ok(HelpfulCount { helpful_count })
    }

    async fn load(&self, id: ReviewId) -> Result<Review> {
        reviews::get(self.state.pool(), id)
            .await?
            .ok_or_else(|| AppError::not_found("review not found"))
    }

    /// Ratings are cached with the product.
    async fn refresh_product(&self, product_id: ProductId) {
        match products::get_plain(self.state.pool(), product_id).await {
            Ok(Some(product)) => invalidate_product(self.state, &product).await,
            Ok(None) => {}
            Err(e) => tracing::warn!(%product_id, error = %e, "Failed to reload product for cache"),
        }
    }
}

fn already_reviewed() -> AppError {
    AppError::conflict("ALREADY_REVIEWED", "you have already reviewed this product")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_validation() {
        let input = ReviewInput {
            rating: 6,
            title: None,
            body: "Works as described.".to_string(),
        };
        assert!(matches!(input.content(), Err(AppError::Validation(_))));

        let input = ReviewInput {
            rating: 4,
            title: Some("  ".to_string()),
            body: "  Works as described.  ".to_string(),
        };
        let content = input.content().ok();
        assert_eq!(content.as_ref().map(|c| c.body.as_str()), Some("Works as described."));
        assert_eq!(content.and_then(|c| c.title), None);
    }

    #[test]
    fn test_short_body_rejected() {
        let input = ReviewInput {
            rating: 5,
            title: None,
            body: "Great".to_string(),
        };
        assert!(input.content().is_err());
    }

    #[test]
    fn test_already_reviewed_code() {
        assert_eq!(already_reviewed().code(), "ALREADY_REVIEWED");
    }
}
