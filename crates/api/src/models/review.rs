//! Product reviews.

use chrono::{DateTime, Utc};
use serde::Serialize;

use emporium_core::{ProductId, ReviewId, UserId};

use super::product::RatingSummary;

pub const MIN_BODY_CHARS: usize = 10;
pub const MAX_BODY_CHARS: usize = 2000;
pub const MAX_TITLE_CHARS: usize = 200;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Review {
    pub id: ReviewId,
    pub product_id: ProductId,
    pub user_id: UserId,
    /// Reviewer's first name, joined from `users`.
    pub author_name: String,
    pub rating: i16,
    pub title: Option<String>,
    pub body: String,
    pub is_verified_purchase: bool,
    pub is_approved: bool,
    pub helpful_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Validated review content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewContent {
    pub rating: i16,
    pub title: Option<String>,
    pub body: String,
}

impl ReviewContent {
    /// Check rating and text lengths, trimming text.
    ///
    /// # Errors
    ///
    /// Returns a message describing the first invalid field.
    pub fn parse(rating: i16, title: Option<&str>, body: &str) -> Result<Self, String> {
        if !(1..=5).contains(&rating) {
            return Err("rating must be between 1 and 5".to_string());
        }
        let body = body.trim();
        let chars = body.chars().count();
        if !(MIN_BODY_CHARS..=MAX_BODY_CHARS).contains(&chars) {
            return Err(format!(
                "review body must be between {MIN_BODY_CHARS} and {MAX_BODY_CHARS} characters"
            ));
        }
        let title = title.map(str::trim).filter(|t| !t.is_empty());
        if title.is_some_and(|t| t.chars().count() > MAX_TITLE_CHARS) {
            return Err(format!("title must be at most {MAX_TITLE_CHARS} characters"));
        }
        Ok(Self {
            rating,
            title: title.map(str::to_string),
            body: body.to_string(),
        })
    }
}

/// Rating summary with a 1..=5 histogram.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RatingBreakdown {
    #[serde(flatten)]
    pub summary: RatingSummary,
    /// Index 0 holds the count of 1-star reviews.
    pub distribution: [i64; 5],
}

impl RatingBreakdown {
    /// Build from `(rating, count)` rows.
    #[must_use]
    pub fn from_counts(counts: &[(i16, i64)]) -> Self {
        let mut distribution = [0i64; 5];
        for &(rating, count) in counts {
            if let Some(slot) = usize::try_from(rating - 1).ok().and_then(|i| distribution.get_mut(i)) {
                *slot += count;
            }
        }

        let count: i64 = distribution.iter().sum();
        let average = (count > 0).then(|| {
            let weighted: i64 = distribution
                .iter()
                .zip(1i64..)
                .map(|(n, stars)| n * stars)
                .sum();
            (rust_decimal::Decimal::from(weighted) / rust_decimal::Decimal::from(count)).round_dp(1)
        });

        Self {
            summary: RatingSummary { average, count },
            distribution,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductReviews {
    pub rating: RatingBreakdown,
    pub reviews: emporium_core::Page<Review>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_content_validation() {
        assert!(ReviewContent::parse(0, None, "Perfectly fine kettle").is_err());
        assert!(ReviewContent::parse(6, None, "Perfectly fine kettle").is_err());
        assert!(ReviewContent::parse(4, None, "short").is_err());
        assert!(ReviewContent::parse(4, None, &"x".repeat(2001)).is_err());

        let content = ReviewContent::parse(5, Some("  "), "  Boils water quickly.  ").unwrap();
        assert_eq!(content.title, None);
        assert_eq!(content.body, "Boils water quickly.");
    }

    #[test]
    fn test_breakdown_average_and_distribution() {
        let breakdown = RatingBreakdown::from_counts(&[(5, 3), (4, 1), (1, 1)]);
        assert_eq!(breakdown.distribution, [1, 0, 0, 1, 3]);
        assert_eq!(breakdown.summary.count, 5);
        // (15 + 4 + 1) / 5 = 4.0
        assert_eq!(breakdown.summary.average, Some("4.0".parse().unwrap()));
    }

    #[test]
    fn test_breakdown_empty() {
        let breakdown = RatingBreakdown::from_counts(&[]);
        assert_eq!(breakdown.summary.average, None);
        assert_eq!(breakdown.summary.count, 0);
    }

    #[test]
    fn test_breakdown_ignores_out_of_range() {
        let breakdown = RatingBreakdown::from_counts(&[(0, 4), (7, 2), (3, 1)]);
        assert_eq!(breakdown.summary.count, 1);
    }
}
