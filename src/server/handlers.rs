//! HTTP request handlers.

use crate::catalog::{self, CatalogRow, MangaFilter, Paginated, SortKey};
use crate::comments::{self, NewComment, VoteOutcome};
use crate::db::{
    AgeRating, ChapterInfo, LatestChapter, Manga, MangaKind, MangaStatus, NewManga, Rating,
    RefListEntry, Shelf, ShelfEntry, User, slugify,
};
use crate::error::{AppError, Result};
use crate::server::AppState;
use crate::stats;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
};
use serde::{Deserialize, Serialize};

/// Limits of the fixed derived lists.
const POPULAR_LIMIT: usize = 10;
const NEW_LIMIT: usize = 10;
const POPULAR_CHAPTERS_LIMIT: usize = 6;
const LATEST_CHAPTERS_LIMIT: i64 = 50;

// ============================================================================
// INDEX & STATS
// ============================================================================

/// Index response.
#[derive(Serialize)]
pub struct IndexResponse {
    title: String,
    total_manga: i64,
}

/// Index: catalog title and size.
pub async fn index(State(state): State<AppState>) -> Result<Json<IndexResponse>> {
    let stats = state.db.catalog_stats()?;
    Ok(Json(IndexResponse {
        title: state.config.server.title.clone(),
        total_manga: stats.total_manga,
    }))
}

/// API: catalog-wide counts.
pub async fn api_stats(
    State(state): State<AppState>,
) -> Result<Json<crate::db::CatalogStats>> {
    Ok(Json(state.db.catalog_stats()?))
}

// ============================================================================
// MANGA LISTING
// ============================================================================

/// Catalog listing query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct MangaListParams {
    /// 1-based page number.
    page: Option<usize>,
    /// Case-insensitive title/subtitle search.
    search: Option<String>,
    /// Sort key, '-' prefix for descending.
    ordering: Option<String>,
    chapters_min: Option<i64>,
    chapters_max: Option<i64>,
    release_year_min: Option<i64>,
    release_year_max: Option<i64>,
    rating_min: Option<f64>,
    rating_max: Option<f64>,
    age_rating: Option<String>,
    /// Comma-separated genre IDs, any-of.
    genres: Option<String>,
    /// Comma-separated tag IDs, any-of.
    tags: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    status: Option<String>,
}

/// Catalog listing item.
#[derive(Serialize)]
pub struct MangaListItem {
    id: i64,
    title: String,
    poster: Option<String>,
    #[serde(rename = "type")]
    kind: MangaKind,
    slug: String,
}

impl MangaListItem {
    fn from_row(row: &CatalogRow) -> Self {
        Self {
            id: row.manga.id,
            title: row.manga.title.clone(),
            poster: row.manga.poster.clone(),
            kind: row.manga.kind,
            slug: row.manga.slug.clone(),
        }
    }
}

fn build_filter(params: &MangaListParams) -> Result<MangaFilter> {
    let age_rating = match &params.age_rating {
        Some(raw) => Some(AgeRating::parse(raw).ok_or_else(|| AppError::Validation {
            field: "age_rating",
            message: format!("Unknown age rating: {}", raw),
        })?),
        None => None,
    };
    let kind = match &params.kind {
        Some(raw) => Some(MangaKind::parse(raw).ok_or_else(|| AppError::Validation {
            field: "type",
            message: format!("Unknown manga type: {}", raw),
        })?),
        None => None,
    };
    let status = match &params.status {
        Some(raw) => Some(MangaStatus::parse(raw).ok_or_else(|| AppError::Validation {
            field: "status",
            message: format!("Unknown status: {}", raw),
        })?),
        None => None,
    };

    Ok(MangaFilter {
        chapters_min: params.chapters_min,
        chapters_max: params.chapters_max,
        release_year_min: params.release_year_min,
        release_year_max: params.release_year_max,
        rating_min: params.rating_min,
        rating_max: params.rating_max,
        age_rating,
        genres: parse_id_list(params.genres.as_deref(), "genres")?,
        tags: parse_id_list(params.tags.as_deref(), "tags")?,
        kind,
        status,
    })
}

fn parse_id_list(raw: Option<&str>, field: &'static str) -> Result<Vec<i64>> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };

    raw.split(',')
        .filter(|part| !part.trim().is_empty())
        .map(|part| {
            part.trim().parse::<i64>().map_err(|_| AppError::Validation {
                field,
                message: format!("Invalid ID: {}", part.trim()),
            })
        })
        .collect()
}

/// List manga: filter, search, sort, paginate.
pub async fn manga_list(
    State(state): State<AppState>,
    Query(params): Query<MangaListParams>,
) -> Result<Json<Paginated<MangaListItem>>> {
    let filter = build_filter(&params)?;

    let mut rows: Vec<CatalogRow> = state
        .db
        .catalog_rows()?
        .into_iter()
        .filter(|row| filter.matches(row))
        .collect();

    if let Some(query) = &params.search {
        rows.retain(|row| catalog::search_matches(row, query));
    }

    // Unknown ordering tokens are ignored, keeping insertion order
    if let Some((key, dir)) = params.ordering.as_deref().and_then(SortKey::parse) {
        catalog::sort_rows(&mut rows, key, dir);
    }

    let items: Vec<MangaListItem> = rows.iter().map(MangaListItem::from_row).collect();

    Ok(Json(catalog::paginate(
        items,
        params.page.unwrap_or(1),
        state.config.catalog.page_size,
    )))
}

// ============================================================================
// MANGA CRUD
// ============================================================================

/// Manga create/update payload.
#[derive(Debug, Deserialize)]
pub struct MangaPayload {
    title: String,
    subtitle: String,
    description: String,
    #[serde(rename = "type")]
    kind: String,
    age_rating: String,
    status: String,
    release_year: i64,
    poster: Option<String>,
    background: Option<String>,
    /// Author name; created on first use.
    author: String,
    /// Painter name; created on first use.
    painter: String,
    #[serde(default)]
    genres: Vec<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    publishers: Vec<String>,
    /// Related manga IDs (outgoing edges).
    #[serde(default)]
    related: Vec<i64>,
}

struct ResolvedPayload {
    new: NewManga,
    genre_ids: Vec<i64>,
    tag_ids: Vec<i64>,
    publisher_ids: Vec<i64>,
    related: Vec<i64>,
}

fn resolve_payload(state: &AppState, payload: &MangaPayload, slug: String) -> Result<ResolvedPayload> {
    let kind = MangaKind::parse(&payload.kind).ok_or_else(|| AppError::Validation {
        field: "type",
        message: format!("Unknown manga type: {}", payload.kind),
    })?;
    let age_rating = AgeRating::parse(&payload.age_rating).ok_or_else(|| AppError::Validation {
        field: "age_rating",
        message: format!("Unknown age rating: {}", payload.age_rating),
    })?;
    let status = MangaStatus::parse(&payload.status).ok_or_else(|| AppError::Validation {
        field: "status",
        message: format!("Unknown status: {}", payload.status),
    })?;

    if payload.title.trim().is_empty() {
        return Err(AppError::Validation {
            field: "title",
            message: "Title must not be empty".to_string(),
        });
    }

    let author_id = state.db.get_or_create_author(&payload.author)?;
    let painter_id = state.db.get_or_create_painter(&payload.painter)?;

    let genre_ids = payload
        .genres
        .iter()
        .map(|name| state.db.get_or_create_genre(name))
        .collect::<Result<Vec<_>>>()?;
    let tag_ids = payload
        .tags
        .iter()
        .map(|name| state.db.get_or_create_tag(name))
        .collect::<Result<Vec<_>>>()?;
    let publisher_ids = payload
        .publishers
        .iter()
        .map(|name| state.db.get_or_create_publisher(name))
        .collect::<Result<Vec<_>>>()?;

    Ok(ResolvedPayload {
        new: NewManga {
            slug,
            title: payload.title.clone(),
            subtitle: payload.subtitle.clone(),
            description: payload.description.clone(),
            kind,
            age_rating,
            status,
            release_year: payload.release_year,
            poster: payload.poster.clone(),
            background: payload.background.clone(),
            author_id,
            painter_id,
        },
        genre_ids,
        tag_ids,
        publisher_ids,
        related: payload.related.clone(),
    })
}

fn apply_links(state: &AppState, manga_id: i64, resolved: &ResolvedPayload) -> Result<()> {
    state.db.set_manga_genres(manga_id, &resolved.genre_ids)?;
    state.db.set_manga_tags(manga_id, &resolved.tag_ids)?;
    state
        .db
        .set_manga_publishers(manga_id, &resolved.publisher_ids)?;
    state.db.set_related_manga(manga_id, &resolved.related)?;
    Ok(())
}

/// Create a manga.
pub async fn manga_create(
    State(state): State<AppState>,
    Json(payload): Json<MangaPayload>,
) -> Result<(StatusCode, Json<Manga>)> {
    let slug = slugify(&payload.title);
    let resolved = resolve_payload(&state, &payload, slug)?;

    let manga = state.db.create_manga(&resolved.new)?;
    apply_links(&state, manga.id, &resolved)?;

    tracing::info!(slug = %manga.slug, "Created manga");
    Ok((StatusCode::CREATED, Json(manga)))
}

/// Update a manga. The slug stays stable.
pub async fn manga_update(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Json(payload): Json<MangaPayload>,
) -> Result<Json<Manga>> {
    let manga = get_by_slug(&state, &slug)?;
    let resolved = resolve_payload(&state, &payload, manga.slug.clone())?;

    state.db.update_manga(manga.id, &resolved.new)?;
    apply_links(&state, manga.id, &resolved)?;

    let updated = state
        .db
        .get_manga(manga.id)?
        .ok_or_else(|| AppError::Internal("Manga vanished after update".to_string()))?;
    Ok(Json(updated))
}

/// Delete a manga.
pub async fn manga_delete(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<StatusCode> {
    let manga = get_by_slug(&state, &slug)?;
    state.db.delete_manga(manga.id)?;
    tracing::info!(slug = %slug, "Deleted manga");
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// MANGA DETAIL & SUB-RESOURCES
// ============================================================================

/// Status with its display form.
#[derive(Serialize)]
pub struct StatusInfo {
    status: MangaStatus,
    status_display: &'static str,
}

/// Related-manga listing entry.
#[derive(Serialize)]
pub struct RelatedMangaInfo {
    id: i64,
    title: String,
    #[serde(rename = "type")]
    kind: MangaKind,
    status: &'static str,
    slug: String,
}

/// Full manga detail.
#[derive(Serialize)]
pub struct MangaDetail {
    id: i64,
    title: String,
    subtitle: String,
    description: String,
    poster: Option<String>,
    background: Option<String>,
    genres: Vec<RefListEntry>,
    #[serde(rename = "type")]
    kind: &'static str,
    release_year: i64,
    related_manga: Vec<RelatedMangaInfo>,
    status: StatusInfo,
    author: String,
    painter: String,
    publishers: Vec<String>,
    age_rating: &'static str,
    total_chapters: i64,
    rating: f64,
    ratings: stats::RatingHistogram,
    user_list: stats::ShelfDistribution,
    tags: Vec<RefListEntry>,
}

/// Retrieve a manga by slug. Counts the view.
pub async fn manga_detail(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<MangaDetail>> {
    let manga = get_by_slug(&state, &slug)?;
    state.db.bump_view_count(manga.id)?;

    let author = state
        .db
        .get_author(manga.author_id)?
        .ok_or_else(|| AppError::Internal("Manga author missing".to_string()))?;
    let painter = state
        .db
        .get_painter(manga.painter_id)?
        .ok_or_else(|| AppError::Internal("Manga painter missing".to_string()))?;

    let stars = state.db.manga_rating_stars(manga.id)?;
    let shelf_counts = state.db.shelf_counts(manga.id)?;

    let related_manga = state
        .db
        .related_manga(manga.id)?
        .into_iter()
        .map(|related| RelatedMangaInfo {
            id: related.id,
            title: related.title,
            kind: related.kind,
            status: related.status.display_name(),
            slug: related.slug,
        })
        .collect();

    Ok(Json(MangaDetail {
        id: manga.id,
        title: manga.title,
        subtitle: manga.subtitle,
        description: manga.description,
        poster: manga.poster,
        background: manga.background,
        genres: state.db.manga_genres(manga.id)?,
        kind: manga.kind.display_name(),
        release_year: manga.release_year,
        related_manga,
        status: StatusInfo {
            status: manga.status,
            status_display: manga.status.display_name(),
        },
        author: author.name,
        painter: painter.name,
        publishers: state
            .db
            .manga_publishers(manga.id)?
            .into_iter()
            .map(|p| p.name)
            .collect(),
        age_rating: manga.age_rating.display_name(),
        total_chapters: state.db.total_chapter_count(manga.id)?,
        rating: stats::average(&stars),
        ratings: stats::histogram(&stars),
        user_list: stats::shelf_distribution(&shelf_counts),
        tags: state.db.manga_tags(manga.id)?,
    }))
}

/// Condensed manga info.
#[derive(Serialize)]
pub struct MangaShortInfo {
    title: String,
    subtitle: String,
    description: String,
    release_year: i64,
    age_rating: &'static str,
    author: String,
    rating: f64,
    genres: Vec<RefListEntry>,
    tags: Vec<RefListEntry>,
}

/// Short-info sub-resource.
pub async fn manga_short_info(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<MangaShortInfo>> {
    let manga = get_by_slug(&state, &slug)?;

    let author = state
        .db
        .get_author(manga.author_id)?
        .ok_or_else(|| AppError::Internal("Manga author missing".to_string()))?;
    let stars = state.db.manga_rating_stars(manga.id)?;

    Ok(Json(MangaShortInfo {
        title: manga.title,
        subtitle: manga.subtitle,
        description: manga.description,
        release_year: manga.release_year,
        age_rating: manga.age_rating.display_name(),
        author: author.name,
        rating: stats::average(&stars),
        genres: state.db.manga_genres(manga.id)?,
        tags: state.db.manga_tags(manga.id)?,
    }))
}

/// Chapters sub-resource.
pub async fn manga_chapters(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<Vec<ChapterInfo>>> {
    let manga = get_by_slug(&state, &slug)?;
    Ok(Json(state.db.manga_chapters(manga.id)?))
}

// ============================================================================
// DERIVED MANGA LISTS
// ============================================================================

/// Popular listing entry.
#[derive(Serialize)]
pub struct PopularManga {
    title: String,
    subtitle: String,
    poster: Option<String>,
    view_count: i64,
}

/// Top titles by view count.
pub async fn popular_manga(State(state): State<AppState>) -> Result<Json<Vec<PopularManga>>> {
    let rows = catalog::popular(state.db.catalog_rows()?, POPULAR_LIMIT);

    Ok(Json(
        rows.into_iter()
            .map(|row| PopularManga {
                title: row.manga.title,
                subtitle: row.manga.subtitle,
                poster: row.manga.poster,
                view_count: row.manga.view_count,
            })
            .collect(),
    ))
}

/// Newest listing entry.
#[derive(Serialize)]
pub struct NewMangaItem {
    title: String,
    subtitle: String,
    poster: Option<String>,
}

/// Most recently added titles.
pub async fn new_manga(State(state): State<AppState>) -> Result<Json<Vec<NewMangaItem>>> {
    let rows = catalog::newest(state.db.catalog_rows()?, NEW_LIMIT);

    Ok(Json(
        rows.into_iter()
            .map(|row| NewMangaItem {
                title: row.manga.title,
                subtitle: row.manga.subtitle,
                poster: row.manga.poster,
            })
            .collect(),
    ))
}

/// Popular-with-latest-chapters entry.
#[derive(Serialize)]
pub struct PopularChapterManga {
    title: String,
    poster: Option<String>,
    last_chapter: Option<ChapterInfo>,
}

/// Top titles by view count with their newest chapter.
pub async fn popular_manga_chapters(
    State(state): State<AppState>,
) -> Result<Json<Vec<PopularChapterManga>>> {
    let rows = catalog::popular_with_latest(state.db.catalog_rows()?, POPULAR_CHAPTERS_LIMIT);

    let mut entries = Vec::with_capacity(rows.len());
    for row in rows {
        entries.push(PopularChapterManga {
            last_chapter: state.db.last_chapter(row.manga.id)?,
            title: row.manga.title,
            poster: row.manga.poster,
        });
    }

    Ok(Json(entries))
}

// ============================================================================
// SHELVES
// ============================================================================

/// Shelf assignment payload.
#[derive(Debug, Deserialize)]
pub struct ShelfPayload {
    /// Shelf category name.
    list: String,
    /// Optional short note.
    note: Option<String>,
}

/// Put a manga on one of the current user's shelves.
pub async fn shelf_set(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(slug): Path<String>,
    Json(payload): Json<ShelfPayload>,
) -> Result<StatusCode> {
    let user = current_user(&state, &headers)?;
    let manga = get_by_slug(&state, &slug)?;

    let shelf = Shelf::parse(&payload.list).ok_or_else(|| AppError::Validation {
        field: "list",
        message: format!("Unknown shelf: {}", payload.list),
    })?;

    state
        .db
        .set_shelf(&user.id, manga.id, shelf, payload.note.as_deref())?;
    Ok(StatusCode::OK)
}

/// Remove a manga from one of the current user's shelves.
pub async fn shelf_remove(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((slug, shelf)): Path<(String, String)>,
) -> Result<StatusCode> {
    let user = current_user(&state, &headers)?;
    let manga = get_by_slug(&state, &slug)?;

    let shelf = Shelf::parse(&shelf).ok_or_else(|| AppError::Validation {
        field: "shelf",
        message: format!("Unknown shelf: {}", shelf),
    })?;

    state.db.remove_shelf(&user.id, manga.id, shelf)?;
    Ok(StatusCode::OK)
}

/// The current user's shelf entries.
pub async fn my_lists(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<ShelfEntry>>> {
    let user = current_user(&state, &headers)?;
    Ok(Json(state.db.user_shelf(&user.id)?))
}

// ============================================================================
// CHAPTERS
// ============================================================================

/// Page listing entry.
#[derive(Serialize)]
pub struct PageInfo {
    id: i64,
    image: String,
    page_number: i64,
}

/// All chapters.
pub async fn chapter_list(State(state): State<AppState>) -> Result<Json<Vec<ChapterInfo>>> {
    Ok(Json(state.db.list_chapters()?))
}

/// One chapter.
pub async fn chapter_detail(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ChapterInfo>> {
    let info = state
        .db
        .chapter_info(id)?
        .ok_or_else(|| AppError::NotFound(format!("Chapter not found: {}", id)))?;
    Ok(Json(info))
}

/// Pages of a chapter, ordered by page number.
pub async fn chapter_pages(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<PageInfo>>> {
    if state.db.get_chapter(id)?.is_none() {
        return Err(AppError::NotFound(format!("Chapter not found: {}", id)));
    }

    let pages = state
        .db
        .chapter_pages(id)?
        .into_iter()
        .map(|page| PageInfo {
            id: page.id,
            image: page.image,
            page_number: page.page_number,
        })
        .collect();

    Ok(Json(pages))
}

/// Most recent chapters across all manga.
pub async fn chapter_latest(State(state): State<AppState>) -> Result<Json<Vec<LatestChapter>>> {
    Ok(Json(state.db.latest_chapters(LATEST_CHAPTERS_LIMIT)?))
}

// ============================================================================
// COMMENTS
// ============================================================================

/// Comment listing query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct CommentListParams {
    /// Manga slug.
    manga: Option<String>,
    /// Chapter number, combined with page for page comments.
    chapter: Option<String>,
    /// Page number within the chapter.
    page: Option<i64>,
    /// "created_at" or "rating", '-' prefix for descending.
    ordering: Option<String>,
}

/// Top-level comments with their reply trees.
pub async fn comment_list(
    State(state): State<AppState>,
    Query(params): Query<CommentListParams>,
) -> Result<Json<Vec<comments::CommentNode>>> {
    let rows = state.db.top_level_comments(
        params.manga.as_deref(),
        params.chapter.as_deref(),
        params.page,
    )?;

    let mut nodes = rows
        .iter()
        .map(|comment| comments::comment_tree(&state.db, comment))
        .collect::<Result<Vec<_>>>()?;

    match params.ordering.as_deref() {
        Some("created_at") | None => {}
        Some("-created_at") => nodes.reverse(),
        Some("rating") => nodes.sort_by_key(|node| node.rating),
        Some("-rating") => nodes.sort_by_key(|node| std::cmp::Reverse(node.rating)),
        Some(_) => {}
    }

    Ok(Json(nodes))
}

/// Comment creation payload.
#[derive(Debug, Deserialize)]
pub struct CommentPayload {
    /// Target manga ID.
    manga: i64,
    /// Comment body.
    content: String,
    /// Target page ID, for page comments.
    page: Option<i64>,
    /// Parent comment ID, for replies.
    parent: Option<i64>,
}

/// Create a comment or reply.
pub async fn comment_create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CommentPayload>,
) -> Result<(StatusCode, Json<crate::db::Comment>)> {
    let user = current_user(&state, &headers)?;

    let comment = comments::create_comment(
        &state.db,
        &NewComment {
            author_id: user.id,
            manga_id: payload.manga,
            content: payload.content,
            page_id: payload.page,
            parent_id: payload.parent,
        },
    )?;

    Ok((StatusCode::CREATED, Json(comment)))
}

/// Comment update payload; content only.
#[derive(Debug, Deserialize)]
pub struct CommentUpdatePayload {
    content: String,
}

/// Edit a comment's content.
pub async fn comment_update(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(payload): Json<CommentUpdatePayload>,
) -> Result<Json<crate::db::Comment>> {
    let user = current_user(&state, &headers)?;
    let comment = get_own_comment(&state, &user, id)?;

    state.db.update_comment_content(comment.id, &payload.content)?;

    let updated = state
        .db
        .get_comment(comment.id)?
        .ok_or_else(|| AppError::Internal("Comment vanished after update".to_string()))?;
    Ok(Json(updated))
}

/// Delete a comment; replies cascade.
pub async fn comment_delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    let user = current_user(&state, &headers)?;
    let comment = get_own_comment(&state, &user, id)?;

    state.db.delete_comment(comment.id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Vote payload.
#[derive(Debug, Deserialize)]
pub struct VotePayload {
    vote: i64,
}

/// Vote response.
#[derive(Serialize)]
pub struct VoteResponse {
    detail: &'static str,
    outcome: VoteOutcome,
}

/// Cast, flip or withdraw a vote on a comment.
pub async fn comment_vote(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(payload): Json<VotePayload>,
) -> Result<(StatusCode, Json<VoteResponse>)> {
    let user = current_user(&state, &headers)?;
    let outcome = comments::cast_vote(&state.db, &user.id, id, payload.vote)?;

    let status = match outcome {
        VoteOutcome::Added => StatusCode::CREATED,
        _ => StatusCode::OK,
    };

    Ok((
        status,
        Json(VoteResponse {
            detail: outcome.detail(),
            outcome,
        }),
    ))
}

// ============================================================================
// RATINGS
// ============================================================================

/// Rating creation payload.
#[derive(Debug, Deserialize)]
pub struct RatingPayload {
    /// Target manga ID.
    manga: i64,
    /// Star value in 1..=10.
    star: i64,
}

/// Rating update payload.
#[derive(Debug, Deserialize)]
pub struct RatingUpdatePayload {
    /// Star value in 1..=10.
    star: i64,
}

fn validate_star(star: i64) -> Result<()> {
    if !(1..=10).contains(&star) {
        return Err(AppError::Validation {
            field: "star",
            message: "Star value must be between 1 and 10".to_string(),
        });
    }
    Ok(())
}

/// Rate a manga. One rating per user per manga.
pub async fn rating_create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RatingPayload>,
) -> Result<(StatusCode, Json<Rating>)> {
    let user = current_user(&state, &headers)?;
    validate_star(payload.star)?;

    if state.db.get_manga(payload.manga)?.is_none() {
        return Err(AppError::NotFound(format!(
            "Manga not found: {}",
            payload.manga
        )));
    }

    let rating = state.db.create_rating(&user.id, payload.manga, payload.star)?;
    Ok((StatusCode::CREATED, Json(rating)))
}

/// Change an existing rating's star value.
pub async fn rating_update(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(payload): Json<RatingUpdatePayload>,
) -> Result<Json<Rating>> {
    let user = current_user(&state, &headers)?;
    validate_star(payload.star)?;

    let rating = get_own_rating(&state, &user, id)?;
    state.db.update_rating(rating.id, payload.star)?;

    let updated = state
        .db
        .get_rating(rating.id)?
        .ok_or_else(|| AppError::Internal("Rating vanished after update".to_string()))?;
    Ok(Json(updated))
}

/// Withdraw a rating.
pub async fn rating_delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    let user = current_user(&state, &headers)?;
    let rating = get_own_rating(&state, &user, id)?;

    state.db.delete_rating(rating.id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// The current user's rating for a manga.
pub async fn user_rating(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(manga_id): Path<i64>,
) -> Result<Json<Rating>> {
    let user = current_user(&state, &headers)?;

    let rating = state
        .db
        .user_rating(&user.id, manga_id)?
        .ok_or_else(|| AppError::NotFound("Rating not found".to_string()))?;
    Ok(Json(rating))
}

// ============================================================================
// REFERENCE LISTS
// ============================================================================

/// Genre listing query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct GenreListParams {
    /// Cap on the number of genres returned.
    limit: Option<i64>,
}

/// Genres, optionally limited.
pub async fn genre_list(
    State(state): State<AppState>,
    Query(params): Query<GenreListParams>,
) -> Result<Json<Vec<RefListEntry>>> {
    Ok(Json(state.db.list_genres(params.limit)?))
}

/// All tags.
pub async fn tag_list(State(state): State<AppState>) -> Result<Json<Vec<RefListEntry>>> {
    Ok(Json(state.db.list_tags()?))
}

/// The fixed manga-type list.
pub async fn manga_types() -> Json<Vec<&'static str>> {
    Json(
        MangaKind::all()
            .into_iter()
            .map(|kind| kind.display_name())
            .collect(),
    )
}

// ============================================================================
// HELPERS
// ============================================================================

/// Resolve the current user from the X-User-Id header. Identity itself is
/// managed by the external provider; only mirrored users are accepted.
fn current_user(state: &AppState, headers: &HeaderMap) -> Result<User> {
    let id = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing X-User-Id header".to_string()))?;

    state
        .db
        .get_user(id)?
        .ok_or_else(|| AppError::Unauthorized("Unknown user".to_string()))
}

fn get_by_slug(state: &AppState, slug: &str) -> Result<Manga> {
    state
        .db
        .get_manga_by_slug(slug)?
        .ok_or_else(|| AppError::NotFound(format!("Manga not found: {}", slug)))
}

/// Fetch a comment the current user authored; anyone else sees 404.
fn get_own_comment(state: &AppState, user: &User, id: i64) -> Result<crate::db::Comment> {
    let comment = state
        .db
        .get_comment(id)?
        .ok_or_else(|| AppError::NotFound("Comment not found.".to_string()))?;

    if comment.author_id != user.id {
        return Err(AppError::NotFound("Comment not found.".to_string()));
    }
    Ok(comment)
}

/// Fetch a rating the current user owns; anyone else sees 404.
fn get_own_rating(state: &AppState, user: &User, id: i64) -> Result<Rating> {
    let rating = state
        .db
        .get_rating(id)?
        .ok_or_else(|| AppError::NotFound("Rating not found".to_string()))?;

    if rating.user_id != user.id {
        return Err(AppError::NotFound("Rating not found".to_string()));
    }
    Ok(rating)
}
