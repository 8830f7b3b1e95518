//! Catalog filtering, search, sorting and pagination.
//!
//! Queries run over a per-request snapshot of the catalog with computed
//! aggregates (`Database::catalog_rows`), so the rating-range rules and
//! sort keys work on derived values without denormalized columns.

use crate::db::{AgeRating, Manga, MangaKind, MangaStatus};
use serde::Serialize;

/// One manga with the computed aggregates the query layer needs.
#[derive(Debug, Clone)]
pub struct CatalogRow {
    /// The manga row.
    pub manga: Manga,
    /// Mean star rating; None when unrated.
    pub avg_rating: Option<f64>,
    /// Number of ratings.
    pub ratings_count: i64,
    /// Number of chapters.
    pub chapters_count: i64,
    /// Creation timestamp of the newest chapter; None when chapterless.
    pub latest_chapter_at: Option<i64>,
    /// Genre membership.
    pub genre_ids: Vec<i64>,
    /// Tag membership.
    pub tag_ids: Vec<i64>,
}

/// Combinable catalog filters. Unset fields do not constrain.
#[derive(Debug, Clone, Default)]
pub struct MangaFilter {
    /// Chapter-count range.
    pub chapters_min: Option<i64>,
    /// Chapter-count range.
    pub chapters_max: Option<i64>,
    /// Release-year range.
    pub release_year_min: Option<i64>,
    /// Release-year range.
    pub release_year_max: Option<i64>,
    /// Average-rating range, lower bound.
    pub rating_min: Option<f64>,
    /// Average-rating range, upper bound.
    pub rating_max: Option<f64>,
    /// Exact age-rating match.
    pub age_rating: Option<AgeRating>,
    /// Genre membership, any-of. Empty means unconstrained.
    pub genres: Vec<i64>,
    /// Tag membership, any-of. Empty means unconstrained.
    pub tags: Vec<i64>,
    /// Exact kind match.
    pub kind: Option<MangaKind>,
    /// Exact status match.
    pub status: Option<MangaStatus>,
}

impl MangaFilter {
    /// Whether a row passes every set filter.
    pub fn matches(&self, row: &CatalogRow) -> bool {
        if let Some(min) = self.chapters_min
            && row.chapters_count < min
        {
            return false;
        }
        if let Some(max) = self.chapters_max
            && row.chapters_count > max
        {
            return false;
        }

        if let Some(min) = self.release_year_min
            && row.manga.release_year < min
        {
            return false;
        }
        if let Some(max) = self.release_year_max
            && row.manga.release_year > max
        {
            return false;
        }

        if !self.rating_in_range(row) {
            return false;
        }

        if let Some(age_rating) = self.age_rating
            && row.manga.age_rating != age_rating
        {
            return false;
        }
        if let Some(kind) = self.kind
            && row.manga.kind != kind
        {
            return false;
        }
        if let Some(status) = self.status
            && row.manga.status != status
        {
            return false;
        }

        if !self.genres.is_empty() && !self.genres.iter().any(|id| row.genre_ids.contains(id)) {
            return false;
        }
        if !self.tags.is_empty() && !self.tags.iter().any(|id| row.tag_ids.contains(id)) {
            return false;
        }

        true
    }

    /// Rating-range rule: with a zero (or unset) lower bound, unrated manga
    /// pass alongside those whose average falls in range; with a positive
    /// lower bound only rated manga in range pass.
    fn rating_in_range(&self, row: &CatalogRow) -> bool {
        if self.rating_min.is_none() && self.rating_max.is_none() {
            return true;
        }

        let lower = self.rating_min.unwrap_or(0.0);
        let upper = self.rating_max.unwrap_or(10.0);

        match row.avg_rating {
            Some(avg) => avg >= lower && avg <= upper,
            None => lower <= 0.0,
        }
    }
}

/// Sortable catalog keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    /// Mean star rating.
    Rating,
    /// Manga creation timestamp.
    CreatedAt,
    /// Newest-chapter creation timestamp.
    LatestChapter,
    /// Chapter count.
    ChaptersCount,
    /// View counter.
    ViewCount,
    /// Rating count.
    RatingsCount,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDir {
    /// Smallest first.
    Asc,
    /// Largest first.
    Desc,
}

impl SortKey {
    /// Parse an ordering token; a leading '-' flips the direction.
    /// Unknown tokens are ignored by callers, matching lenient ordering
    /// params.
    pub fn parse(token: &str) -> Option<(SortKey, SortDir)> {
        let (name, dir) = match token.strip_prefix('-') {
            Some(rest) => (rest, SortDir::Desc),
            None => (token, SortDir::Asc),
        };

        let key = match name {
            "rating" => SortKey::Rating,
            "created_at" => SortKey::CreatedAt,
            "latest_chapter" => SortKey::LatestChapter,
            "chapters_count" => SortKey::ChaptersCount,
            "view_count" => SortKey::ViewCount,
            "ratings_count" => SortKey::RatingsCount,
            _ => return None,
        };

        Some((key, dir))
    }
}

/// Sort rows in place by the given key and direction. Unrated and
/// chapterless rows sort below everything on ascending order.
pub fn sort_rows(rows: &mut [CatalogRow], key: SortKey, dir: SortDir) {
    rows.sort_by(|a, b| {
        let ord = match key {
            SortKey::Rating => float_key(a.avg_rating).total_cmp(&float_key(b.avg_rating)),
            SortKey::CreatedAt => a.manga.created_at.cmp(&b.manga.created_at),
            SortKey::LatestChapter => a.latest_chapter_at.cmp(&b.latest_chapter_at),
            SortKey::ChaptersCount => a.chapters_count.cmp(&b.chapters_count),
            SortKey::ViewCount => a.manga.view_count.cmp(&b.manga.view_count),
            SortKey::RatingsCount => a.ratings_count.cmp(&b.ratings_count),
        };
        match dir {
            SortDir::Asc => ord,
            SortDir::Desc => ord.reverse(),
        }
    });
}

fn float_key(value: Option<f64>) -> f64 {
    value.unwrap_or(f64::NEG_INFINITY)
}

/// Case-insensitive substring match over title and subtitle.
pub fn search_matches(row: &CatalogRow, query: &str) -> bool {
    let needle = query.to_lowercase();
    row.manga.title.to_lowercase().contains(&needle)
        || row.manga.subtitle.to_lowercase().contains(&needle)
}

/// One page of results with paging metadata.
#[derive(Debug, Clone, Serialize)]
pub struct Paginated<T> {
    /// Items on this page.
    pub results: Vec<T>,
    /// Total items across all pages.
    pub total: usize,
    /// 1-based page number.
    pub page: usize,
    /// Fixed page size.
    pub page_size: usize,
    /// Number of pages.
    pub total_pages: usize,
}

/// Slice a full result set into one page. Pages are 1-based; a page past
/// the end yields empty results with intact metadata.
pub fn paginate<T>(items: Vec<T>, page: usize, page_size: usize) -> Paginated<T> {
    let page = page.max(1);
    let page_size = page_size.max(1);
    let total = items.len();
    let total_pages = total.div_ceil(page_size);

    let start = (page - 1).saturating_mul(page_size);
    let results = if start >= total {
        Vec::new()
    } else {
        items
            .into_iter()
            .skip(start)
            .take(page_size)
            .collect()
    };

    Paginated {
        results,
        total,
        page,
        page_size,
        total_pages,
    }
}

/// Top titles by view count.
pub fn popular(mut rows: Vec<CatalogRow>, limit: usize) -> Vec<CatalogRow> {
    sort_rows(&mut rows, SortKey::ViewCount, SortDir::Desc);
    rows.truncate(limit);
    rows
}

/// Most recently added titles.
pub fn newest(mut rows: Vec<CatalogRow>, limit: usize) -> Vec<CatalogRow> {
    sort_rows(&mut rows, SortKey::CreatedAt, SortDir::Desc);
    rows.truncate(limit);
    rows
}

/// Top titles by view count, ties broken by newest chapter.
pub fn popular_with_latest(mut rows: Vec<CatalogRow>, limit: usize) -> Vec<CatalogRow> {
    rows.sort_by(|a, b| {
        b.manga
            .view_count
            .cmp(&a.manga.view_count)
            .then(b.latest_chapter_at.cmp(&a.latest_chapter_at))
    });
    rows.truncate(limit);
    rows
}
