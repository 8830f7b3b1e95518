mod schema;

pub use schema::{CatalogStats, Database};

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Publication kind of a title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MangaKind {
    /// Japanese comic.
    Manga,
    /// Korean comic.
    Manhwa,
    /// Chinese comic.
    Manhua,
}

impl MangaKind {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            MangaKind::Manga => "manga",
            MangaKind::Manhwa => "manhwa",
            MangaKind::Manhua => "manhua",
        }
    }

    /// Human-readable form.
    pub fn display_name(&self) -> &'static str {
        match self {
            MangaKind::Manga => "Manga",
            MangaKind::Manhwa => "Manhwa",
            MangaKind::Manhua => "Manhua",
        }
    }

    /// Parse the storage representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "manga" => Some(MangaKind::Manga),
            "manhwa" => Some(MangaKind::Manhwa),
            "manhua" => Some(MangaKind::Manhua),
            _ => None,
        }
    }

    /// All kinds in display order.
    pub fn all() -> [MangaKind; 3] {
        [MangaKind::Manga, MangaKind::Manhwa, MangaKind::Manhua]
    }
}

/// Publication status of a title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MangaStatus {
    /// Chapters are still being released.
    Ongoing,
    /// Announced but not started.
    Planned,
    /// Fully released.
    Released,
    /// Release halted indefinitely.
    Suspended,
}

impl MangaStatus {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            MangaStatus::Ongoing => "ongoing",
            MangaStatus::Planned => "planned",
            MangaStatus::Released => "released",
            MangaStatus::Suspended => "suspended",
        }
    }

    /// Human-readable form.
    pub fn display_name(&self) -> &'static str {
        match self {
            MangaStatus::Ongoing => "Ongoing",
            MangaStatus::Planned => "Planned",
            MangaStatus::Released => "Released",
            MangaStatus::Suspended => "Suspended",
        }
    }

    /// Parse the storage representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ongoing" => Some(MangaStatus::Ongoing),
            "planned" => Some(MangaStatus::Planned),
            "released" => Some(MangaStatus::Released),
            "suspended" => Some(MangaStatus::Suspended),
            _ => None,
        }
    }
}

/// Age restriction of a title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgeRating {
    /// No restriction.
    #[serde(rename = "absent")]
    Absent,
    /// 16 years and older.
    #[serde(rename = "16+")]
    SixteenPlus,
    /// 18 years and older.
    #[serde(rename = "18+")]
    EighteenPlus,
}

impl AgeRating {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            AgeRating::Absent => "absent",
            AgeRating::SixteenPlus => "16+",
            AgeRating::EighteenPlus => "18+",
        }
    }

    /// Human-readable form.
    pub fn display_name(&self) -> &'static str {
        match self {
            AgeRating::Absent => "Absent",
            AgeRating::SixteenPlus => "16+",
            AgeRating::EighteenPlus => "18+",
        }
    }

    /// Parse the storage representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "absent" => Some(AgeRating::Absent),
            "16+" => Some(AgeRating::SixteenPlus),
            "18+" => Some(AgeRating::EighteenPlus),
            _ => None,
        }
    }
}

/// Per-user reading-list category a manga can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shelf {
    /// Currently reading.
    Reading,
    /// Plans to read.
    Planned,
    /// Dropped without finishing.
    Dropped,
    /// Finished reading.
    Readed,
    /// Marked as favorite.
    Favorite,
}

impl Shelf {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Shelf::Reading => "reading",
            Shelf::Planned => "planned",
            Shelf::Dropped => "dropped",
            Shelf::Readed => "readed",
            Shelf::Favorite => "favorite",
        }
    }

    /// Parse the storage representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "reading" => Some(Shelf::Reading),
            "planned" => Some(Shelf::Planned),
            "dropped" => Some(Shelf::Dropped),
            "readed" => Some(Shelf::Readed),
            "favorite" => Some(Shelf::Favorite),
            _ => None,
        }
    }

    /// All shelves in the fixed distribution order.
    pub fn all() -> [Shelf; 5] {
        [
            Shelf::Reading,
            Shelf::Planned,
            Shelf::Dropped,
            Shelf::Readed,
            Shelf::Favorite,
        ]
    }
}

/// Identity mirror of an externally-managed user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique user ID.
    pub id: String,
    /// Username for display.
    pub username: String,
    /// Avatar image reference.
    pub avatar: Option<String>,
    /// Account creation timestamp.
    pub created_at: i64,
}

/// Named reference row (author, painter, publisher).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Named {
    /// Row ID.
    pub id: i64,
    /// Unique name.
    pub name: String,
}

/// Genre or tag listing row with its catalog usage count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefListEntry {
    /// Row ID.
    pub id: i64,
    /// Unique name.
    pub name: String,
    /// Number of manga carrying this genre/tag.
    pub total_manga: i64,
}

/// Catalog title.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manga {
    /// Row ID.
    pub id: i64,
    /// URL slug, unique and stable once assigned.
    pub slug: String,
    /// Primary title.
    pub title: String,
    /// Secondary (original) title.
    pub subtitle: String,
    /// Long description.
    pub description: String,
    /// Publication kind.
    pub kind: MangaKind,
    /// Age restriction.
    pub age_rating: AgeRating,
    /// Publication status.
    pub status: MangaStatus,
    /// Year of first release.
    pub release_year: i64,
    /// Page-view counter.
    pub view_count: i64,
    /// Poster image reference.
    pub poster: Option<String>,
    /// Background image reference.
    pub background: Option<String>,
    /// Author row ID.
    pub author_id: i64,
    /// Painter row ID.
    pub painter_id: i64,
    /// Creation timestamp.
    pub created_at: i64,
    /// Last update timestamp.
    pub updated_at: i64,
}

/// Fields for creating or replacing a manga row.
#[derive(Debug, Clone)]
pub struct NewManga {
    /// URL slug.
    pub slug: String,
    /// Primary title.
    pub title: String,
    /// Secondary title.
    pub subtitle: String,
    /// Long description.
    pub description: String,
    /// Publication kind.
    pub kind: MangaKind,
    /// Age restriction.
    pub age_rating: AgeRating,
    /// Publication status.
    pub status: MangaStatus,
    /// Year of first release.
    pub release_year: i64,
    /// Poster image reference.
    pub poster: Option<String>,
    /// Background image reference.
    pub background: Option<String>,
    /// Author row ID.
    pub author_id: i64,
    /// Painter row ID.
    pub painter_id: i64,
}

/// Volume within a manga.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Volume {
    /// Row ID.
    pub id: i64,
    /// Owning manga.
    pub manga_id: i64,
    /// Ordering number within the manga.
    pub volume_number: i64,
}

/// Chapter within a volume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    /// Row ID.
    pub id: i64,
    /// Owning volume.
    pub volume_id: i64,
    /// Owning manga (denormalized).
    pub manga_id: i64,
    /// Chapter number; string so "10.5" and the like are representable.
    pub chapter_number: String,
    /// Chapter title.
    pub title: Option<String>,
    /// URL slug.
    pub slug: Option<String>,
    /// Creation timestamp.
    pub created_at: i64,
    /// Last update timestamp.
    pub updated_at: i64,
}

/// Single page of a chapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    /// Row ID.
    pub id: i64,
    /// Owning chapter.
    pub chapter_id: i64,
    /// Owning manga (denormalized).
    pub manga_id: i64,
    /// Ordering number within the chapter.
    pub page_number: i64,
    /// Page image reference.
    pub image: String,
}

/// Star rating a user gave a manga. One per (user, manga).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rating {
    /// Row ID.
    pub id: i64,
    /// Rating user.
    pub user_id: String,
    /// Rated manga.
    pub manga_id: i64,
    /// Star value, stored in 0..=10, accepted from input in 1..=10.
    pub star: i64,
}

/// Comment on a manga or on a specific page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    /// Row ID.
    pub id: i64,
    /// Comment author.
    pub author_id: String,
    /// Target manga.
    pub manga_id: i64,
    /// Target page, when this is a page comment.
    pub page_id: Option<i64>,
    /// Comment body.
    pub content: String,
    /// Whether the comment targets a page.
    pub is_page_comment: bool,
    /// Parent comment for replies; set once at creation.
    pub parent_id: Option<i64>,
    /// Whether any reply exists under this comment.
    pub is_parent: bool,
    /// Creation timestamp.
    pub created_at: i64,
    /// Last update timestamp.
    pub updated_at: i64,
}

/// Up/down vote on a comment. One per (user, comment).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentVote {
    /// Row ID.
    pub id: i64,
    /// Voting user.
    pub user_id: String,
    /// Voted comment.
    pub comment_id: i64,
    /// +1 or -1.
    pub vote: i64,
}

/// Shelf membership of a manga for a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShelfEntry {
    /// Owning user.
    pub user_id: String,
    /// Shelved manga.
    pub manga_id: i64,
    /// Shelf category.
    pub shelf: Shelf,
    /// Optional short note.
    pub note: Option<String>,
    /// Creation timestamp.
    pub created_at: i64,
}

/// Chapter listing row with volume and page info resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterInfo {
    /// Chapter row ID.
    pub id: i64,
    /// Volume ordering number.
    pub volume_number: i64,
    /// Chapter number string.
    pub chapter_number: String,
    /// Chapter title.
    pub title: Option<String>,
    /// Number of pages in the chapter.
    pub total_pages: i64,
}

/// Sitewide latest-chapter row, carrying its manga titles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatestChapter {
    /// Chapter row ID.
    pub id: i64,
    /// Volume ordering number.
    pub volume_number: i64,
    /// Chapter number string.
    pub chapter_number: String,
    /// Chapter title.
    pub title: Option<String>,
    /// Number of pages in the chapter.
    pub total_pages: i64,
    /// Creation timestamp.
    pub created_at: i64,
    /// Owning manga title.
    pub manga_title: String,
    /// Owning manga subtitle.
    pub manga_subtitle: String,
}

/// Timestamp helper.
pub fn now_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// Derive a URL slug from a title: lowercase, alphanumeric runs joined by '-'.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;
    for ch in title.chars() {
        if ch.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            for lower in ch.to_lowercase() {
                slug.push(lower);
            }
        } else {
            pending_dash = true;
        }
    }
    slug
}
