//! Read-side aggregation over ratings and shelf entries.

use crate::db::Shelf;
use serde::Serialize;

/// One star value of the 1..=10 rating distribution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatingBucket {
    /// Star value.
    pub star: i64,
    /// Number of ratings with exactly this value.
    pub total: i64,
    /// Share of all ratings, in percent.
    pub percent: f64,
}

/// Full rating distribution of a manga.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatingHistogram {
    /// Number of ratings counted.
    pub total_rated: i64,
    /// Exactly ten buckets, star 1 through 10 in order.
    pub ratings: Vec<RatingBucket>,
}

/// One shelf category of the distribution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShelfSlice {
    /// Shelf category.
    pub status: Shelf,
    /// Number of users with the manga on this shelf.
    pub total: i64,
    /// Share of total_users, in percent.
    pub percent: f64,
}

/// Shelf membership distribution of a manga. A user on several shelves is
/// counted once per shelf, so total_users is the category sum, not a
/// distinct-user count.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShelfDistribution {
    /// Sum of per-shelf counts.
    pub total_users: i64,
    /// Five slices in fixed shelf order.
    pub user_list: Vec<ShelfSlice>,
}

/// Mean of the given star values; 0.0 when there are none.
pub fn average(stars: &[i64]) -> f64 {
    if stars.is_empty() {
        return 0.0;
    }
    stars.iter().sum::<i64>() as f64 / stars.len() as f64
}

/// Distribution of star values across the fixed 1..=10 buckets.
pub fn histogram(stars: &[i64]) -> RatingHistogram {
    let total_rated = stars.len() as i64;

    let ratings = (1..=10)
        .map(|star| {
            let total = stars.iter().filter(|&&s| s == star).count() as i64;
            let percent = if total_rated > 0 {
                total as f64 / total_rated as f64 * 100.0
            } else {
                0.0
            };
            RatingBucket {
                star,
                total,
                percent,
            }
        })
        .collect();

    RatingHistogram {
        total_rated,
        ratings,
    }
}

/// Shelf distribution from per-shelf counts (fixed shelf order expected).
pub fn shelf_distribution(counts: &[(Shelf, i64)]) -> ShelfDistribution {
    let total_users: i64 = counts.iter().map(|(_, total)| total).sum();

    let user_list = counts
        .iter()
        .map(|&(status, total)| {
            let percent = if total_users > 0 {
                total as f64 / total_users as f64 * 100.0
            } else {
                0.0
            };
            ShelfSlice {
                status,
                total,
                percent,
            }
        })
        .collect();

    ShelfDistribution {
        total_users,
        user_list,
    }
}
