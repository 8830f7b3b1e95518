use crate::catalog::CatalogRow;
use crate::comments::VoteOutcome;
use crate::db::*;
use crate::error::{AppError, Result};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Database wrapper for thread-safe access.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| AppError::Internal(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_schema()?;
        Ok(db)
    }

    /// Open in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::Internal(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_schema()?;
        Ok(db)
    }

    /// Initialize database schema.
    fn initialize_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            -- Users table (identity mirror; accounts live in the identity provider)
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT UNIQUE NOT NULL,
                avatar TEXT,
                created_at INTEGER NOT NULL
            );

            -- Reference tables
            CREATE TABLE IF NOT EXISTS genres (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT UNIQUE NOT NULL
            );

            CREATE TABLE IF NOT EXISTS tags (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT UNIQUE NOT NULL
            );

            CREATE TABLE IF NOT EXISTS authors (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT UNIQUE NOT NULL
            );

            CREATE TABLE IF NOT EXISTS painters (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT UNIQUE NOT NULL
            );

            CREATE TABLE IF NOT EXISTS publishers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT UNIQUE NOT NULL
            );

            -- Manga table
            CREATE TABLE IF NOT EXISTS manga (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                slug TEXT UNIQUE NOT NULL,
                title TEXT NOT NULL,
                subtitle TEXT NOT NULL,
                description TEXT NOT NULL,
                kind TEXT NOT NULL,
                age_rating TEXT NOT NULL DEFAULT 'absent',
                status TEXT NOT NULL DEFAULT 'planned',
                release_year INTEGER NOT NULL,
                view_count INTEGER NOT NULL DEFAULT 0,
                poster TEXT,
                background TEXT,
                author_id INTEGER NOT NULL,
                painter_id INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                FOREIGN KEY (author_id) REFERENCES authors(id) ON DELETE CASCADE,
                FOREIGN KEY (painter_id) REFERENCES painters(id) ON DELETE CASCADE
            );

            -- Membership tables
            CREATE TABLE IF NOT EXISTS manga_genres (
                manga_id INTEGER NOT NULL,
                genre_id INTEGER NOT NULL,
                PRIMARY KEY (manga_id, genre_id),
                FOREIGN KEY (manga_id) REFERENCES manga(id) ON DELETE CASCADE,
                FOREIGN KEY (genre_id) REFERENCES genres(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS manga_tags (
                manga_id INTEGER NOT NULL,
                tag_id INTEGER NOT NULL,
                PRIMARY KEY (manga_id, tag_id),
                FOREIGN KEY (manga_id) REFERENCES manga(id) ON DELETE CASCADE,
                FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS manga_publishers (
                manga_id INTEGER NOT NULL,
                publisher_id INTEGER NOT NULL,
                PRIMARY KEY (manga_id, publisher_id),
                FOREIGN KEY (manga_id) REFERENCES manga(id) ON DELETE CASCADE,
                FOREIGN KEY (publisher_id) REFERENCES publishers(id) ON DELETE CASCADE
            );

            -- Stored one-directional; reads resolve the union of both directions
            CREATE TABLE IF NOT EXISTS related_manga (
                manga_id INTEGER NOT NULL,
                related_id INTEGER NOT NULL,
                PRIMARY KEY (manga_id, related_id),
                FOREIGN KEY (manga_id) REFERENCES manga(id) ON DELETE CASCADE,
                FOREIGN KEY (related_id) REFERENCES manga(id) ON DELETE CASCADE
            );

            -- Volumes table
            CREATE TABLE IF NOT EXISTS volumes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                manga_id INTEGER NOT NULL,
                volume_number INTEGER NOT NULL,
                FOREIGN KEY (manga_id) REFERENCES manga(id) ON DELETE CASCADE
            );

            -- Chapters table (manga_id denormalized from the volume)
            CREATE TABLE IF NOT EXISTS chapters (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                volume_id INTEGER NOT NULL,
                manga_id INTEGER NOT NULL,
                chapter_number TEXT NOT NULL,
                title TEXT,
                slug TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                FOREIGN KEY (volume_id) REFERENCES volumes(id) ON DELETE CASCADE,
                FOREIGN KEY (manga_id) REFERENCES manga(id) ON DELETE CASCADE
            );

            -- Pages table (manga_id denormalized from the chapter)
            CREATE TABLE IF NOT EXISTS pages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                chapter_id INTEGER NOT NULL,
                manga_id INTEGER NOT NULL,
                page_number INTEGER NOT NULL,
                image TEXT NOT NULL,
                FOREIGN KEY (chapter_id) REFERENCES chapters(id) ON DELETE CASCADE,
                FOREIGN KEY (manga_id) REFERENCES manga(id) ON DELETE CASCADE
            );

            -- Ratings table
            CREATE TABLE IF NOT EXISTS ratings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                manga_id INTEGER NOT NULL,
                star INTEGER NOT NULL CHECK (star >= 0 AND star <= 10),
                UNIQUE (user_id, manga_id),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (manga_id) REFERENCES manga(id) ON DELETE CASCADE
            );

            -- Comments table (parent_id threads replies; set once at creation)
            CREATE TABLE IF NOT EXISTS comments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                author_id TEXT NOT NULL,
                manga_id INTEGER NOT NULL,
                page_id INTEGER,
                content TEXT NOT NULL,
                is_page_comment INTEGER NOT NULL DEFAULT 0,
                parent_id INTEGER,
                is_parent INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                FOREIGN KEY (author_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (manga_id) REFERENCES manga(id) ON DELETE CASCADE,
                FOREIGN KEY (page_id) REFERENCES pages(id) ON DELETE CASCADE,
                FOREIGN KEY (parent_id) REFERENCES comments(id) ON DELETE CASCADE
            );

            -- Comment votes table
            CREATE TABLE IF NOT EXISTS comment_votes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                comment_id INTEGER NOT NULL,
                vote INTEGER NOT NULL CHECK (vote IN (1, -1)),
                UNIQUE (user_id, comment_id),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (comment_id) REFERENCES comments(id) ON DELETE CASCADE
            );

            -- Shelf entries table
            CREATE TABLE IF NOT EXISTS shelf_entries (
                user_id TEXT NOT NULL,
                manga_id INTEGER NOT NULL,
                shelf TEXT NOT NULL,
                note TEXT,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (user_id, manga_id, shelf),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (manga_id) REFERENCES manga(id) ON DELETE CASCADE
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_manga_slug ON manga(slug);
            CREATE INDEX IF NOT EXISTS idx_volumes_manga ON volumes(manga_id);
            CREATE INDEX IF NOT EXISTS idx_chapters_manga ON chapters(manga_id);
            CREATE INDEX IF NOT EXISTS idx_chapters_volume ON chapters(volume_id);
            CREATE INDEX IF NOT EXISTS idx_pages_chapter ON pages(chapter_id);
            CREATE INDEX IF NOT EXISTS idx_ratings_manga ON ratings(manga_id);
            CREATE INDEX IF NOT EXISTS idx_comments_manga ON comments(manga_id);
            CREATE INDEX IF NOT EXISTS idx_comments_parent ON comments(parent_id);
            CREATE INDEX IF NOT EXISTS idx_votes_comment ON comment_votes(comment_id);
            CREATE INDEX IF NOT EXISTS idx_shelf_manga ON shelf_entries(manga_id);
            "#,
        )
        .map_err(|e| AppError::Internal(format!("Failed to initialize schema: {}", e)))?;

        Ok(())
    }

    // ========== USER OPERATIONS ==========

    /// Create a new user (identity mirror).
    pub fn create_user(&self, user: &User) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO users (id, username, avatar, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![user.id, user.username, user.avatar, user.created_at],
        )
        .map_err(|e| {
            if e.to_string().contains("UNIQUE constraint") {
                AppError::Conflict(format!("Username '{}' already exists", user.username))
            } else {
                AppError::Internal(format!("Failed to create user: {}", e))
            }
        })?;
        Ok(())
    }

    /// Get user by ID.
    pub fn get_user(&self, id: &str) -> Result<Option<User>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, username, avatar, created_at FROM users WHERE id = ?1",
            params![id],
            Self::row_to_user,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get user: {}", e)))
    }

    /// Get user by username.
    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, username, avatar, created_at FROM users WHERE username = ?1",
            params![username],
            Self::row_to_user,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get user: {}", e)))
    }

    /// List all users.
    pub fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT id, username, avatar, created_at FROM users ORDER BY username")
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let users = stmt
            .query_map([], Self::row_to_user)
            .map_err(|e| AppError::Internal(format!("Failed to list users: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect users: {}", e)))?;

        Ok(users)
    }

    /// Delete user by username.
    pub fn delete_user(&self, username: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute("DELETE FROM users WHERE username = ?1", params![username])
            .map_err(|e| AppError::Internal(format!("Failed to delete user: {}", e)))?;
        Ok(rows > 0)
    }

    fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
        Ok(User {
            id: row.get(0)?,
            username: row.get(1)?,
            avatar: row.get(2)?,
            created_at: row.get(3)?,
        })
    }

    // ========== REFERENCE OPERATIONS ==========

    /// Get or create a row in one of the named reference tables.
    fn get_or_create_named(&self, table: &str, name: &str) -> Result<i64> {
        let conn = self.conn.lock();
        // INSERT OR IGNORE keeps the existing row on a name collision
        conn.execute(
            &format!("INSERT OR IGNORE INTO {} (name) VALUES (?1)", table),
            params![name],
        )
        .map_err(|e| AppError::Internal(format!("Failed to insert into {}: {}", table, e)))?;

        conn.query_row(
            &format!("SELECT id FROM {} WHERE name = ?1", table),
            params![name],
            |row| row.get(0),
        )
        .map_err(|e| AppError::Internal(format!("Failed to look up {}: {}", table, e)))
    }

    /// Get or create an author by name.
    pub fn get_or_create_author(&self, name: &str) -> Result<i64> {
        self.get_or_create_named("authors", name)
    }

    /// Get or create a painter by name.
    pub fn get_or_create_painter(&self, name: &str) -> Result<i64> {
        self.get_or_create_named("painters", name)
    }

    /// Get or create a publisher by name.
    pub fn get_or_create_publisher(&self, name: &str) -> Result<i64> {
        self.get_or_create_named("publishers", name)
    }

    /// Get or create a genre by name.
    pub fn get_or_create_genre(&self, name: &str) -> Result<i64> {
        self.get_or_create_named("genres", name)
    }

    /// Get or create a tag by name.
    pub fn get_or_create_tag(&self, name: &str) -> Result<i64> {
        self.get_or_create_named("tags", name)
    }

    /// Look up a name in one of the reference tables.
    fn named_lookup(&self, table: &str, id: i64) -> Result<Option<Named>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT id, name FROM {} WHERE id = ?1", table),
            params![id],
            |row| {
                Ok(Named {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            },
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to look up {}: {}", table, e)))
    }

    /// Get an author by ID.
    pub fn get_author(&self, id: i64) -> Result<Option<Named>> {
        self.named_lookup("authors", id)
    }

    /// Get a painter by ID.
    pub fn get_painter(&self, id: i64) -> Result<Option<Named>> {
        self.named_lookup("painters", id)
    }

    /// List genres with per-genre manga counts, optionally limited.
    pub fn list_genres(&self, limit: Option<i64>) -> Result<Vec<RefListEntry>> {
        self.list_ref_entries("genres", "manga_genres", "genre_id", limit)
    }

    /// List tags with per-tag manga counts.
    pub fn list_tags(&self) -> Result<Vec<RefListEntry>> {
        self.list_ref_entries("tags", "manga_tags", "tag_id", None)
    }

    fn list_ref_entries(
        &self,
        table: &str,
        link_table: &str,
        link_col: &str,
        limit: Option<i64>,
    ) -> Result<Vec<RefListEntry>> {
        let conn = self.conn.lock();
        let mut sql = format!(
            "SELECT t.id, t.name,
                    (SELECT COUNT(*) FROM {link} l WHERE l.{col} = t.id)
             FROM {table} t ORDER BY t.id",
            link = link_table,
            col = link_col,
            table = table,
        );
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let entries = stmt
            .query_map([], |row| {
                Ok(RefListEntry {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    total_manga: row.get(2)?,
                })
            })
            .map_err(|e| AppError::Internal(format!("Failed to list {}: {}", table, e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect {}: {}", table, e)))?;

        Ok(entries)
    }

    // ========== MANGA OPERATIONS ==========

    /// Create a manga. Fails with Conflict when the slug is taken.
    pub fn create_manga(&self, new: &NewManga) -> Result<Manga> {
        let conn = self.conn.lock();
        let now = now_timestamp();
        conn.execute(
            "INSERT INTO manga
             (slug, title, subtitle, description, kind, age_rating, status, release_year,
              poster, background, author_id, painter_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                new.slug,
                new.title,
                new.subtitle,
                new.description,
                new.kind.as_str(),
                new.age_rating.as_str(),
                new.status.as_str(),
                new.release_year,
                new.poster,
                new.background,
                new.author_id,
                new.painter_id,
                now,
                now,
            ],
        )
        .map_err(|e| {
            if e.to_string().contains("UNIQUE constraint") {
                AppError::Conflict(format!("Manga slug '{}' already exists", new.slug))
            } else {
                AppError::Internal(format!("Failed to create manga: {}", e))
            }
        })?;

        let id = conn.last_insert_rowid();
        drop(conn);

        self.get_manga(id)?
            .ok_or_else(|| AppError::Internal("Manga vanished after insert".to_string()))
    }

    /// Get manga by ID.
    pub fn get_manga(&self, id: i64) -> Result<Option<Manga>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("{} WHERE id = ?1", MANGA_SELECT),
            params![id],
            Self::row_to_manga,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get manga: {}", e)))
    }

    /// Get manga by slug.
    pub fn get_manga_by_slug(&self, slug: &str) -> Result<Option<Manga>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("{} WHERE slug = ?1", MANGA_SELECT),
            params![slug],
            Self::row_to_manga,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get manga: {}", e)))
    }

    /// Update a manga's fields. The slug is stable and never rewritten.
    pub fn update_manga(&self, id: i64, new: &NewManga) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "UPDATE manga SET
                    title = ?1, subtitle = ?2, description = ?3, kind = ?4,
                    age_rating = ?5, status = ?6, release_year = ?7, poster = ?8,
                    background = ?9, author_id = ?10, painter_id = ?11, updated_at = ?12
                 WHERE id = ?13",
                params![
                    new.title,
                    new.subtitle,
                    new.description,
                    new.kind.as_str(),
                    new.age_rating.as_str(),
                    new.status.as_str(),
                    new.release_year,
                    new.poster,
                    new.background,
                    new.author_id,
                    new.painter_id,
                    now_timestamp(),
                    id,
                ],
            )
            .map_err(|e| AppError::Internal(format!("Failed to update manga: {}", e)))?;
        Ok(rows > 0)
    }

    /// Delete a manga and everything hanging off it.
    pub fn delete_manga(&self, id: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute("DELETE FROM manga WHERE id = ?1", params![id])
            .map_err(|e| AppError::Internal(format!("Failed to delete manga: {}", e)))?;
        Ok(rows > 0)
    }

    /// Increment the view counter.
    pub fn bump_view_count(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE manga SET view_count = view_count + 1 WHERE id = ?1",
            params![id],
        )
        .map_err(|e| AppError::Internal(format!("Failed to bump view count: {}", e)))?;
        Ok(())
    }

    /// Replace a manga's membership rows in a link table.
    fn set_links(&self, table: &str, col: &str, manga_id: i64, ids: &[i64]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| AppError::Internal(format!("Failed to start transaction: {}", e)))?;

        tx.execute(
            &format!("DELETE FROM {} WHERE manga_id = ?1", table),
            params![manga_id],
        )
        .map_err(|e| AppError::Internal(format!("Failed to clear {}: {}", table, e)))?;

        for id in ids {
            tx.execute(
                &format!(
                    "INSERT OR IGNORE INTO {} (manga_id, {}) VALUES (?1, ?2)",
                    table, col
                ),
                params![manga_id, id],
            )
            .map_err(|e| AppError::Internal(format!("Failed to insert into {}: {}", table, e)))?;
        }

        tx.commit()
            .map_err(|e| AppError::Internal(format!("Failed to commit: {}", e)))
    }

    /// Replace a manga's genres.
    pub fn set_manga_genres(&self, manga_id: i64, genre_ids: &[i64]) -> Result<()> {
        self.set_links("manga_genres", "genre_id", manga_id, genre_ids)
    }

    /// Replace a manga's tags.
    pub fn set_manga_tags(&self, manga_id: i64, tag_ids: &[i64]) -> Result<()> {
        self.set_links("manga_tags", "tag_id", manga_id, tag_ids)
    }

    /// Replace a manga's publishers.
    pub fn set_manga_publishers(&self, manga_id: i64, publisher_ids: &[i64]) -> Result<()> {
        self.set_links("manga_publishers", "publisher_id", manga_id, publisher_ids)
    }

    /// Replace a manga's outgoing related-manga edges.
    pub fn set_related_manga(&self, manga_id: i64, related_ids: &[i64]) -> Result<()> {
        self.set_links("related_manga", "related_id", manga_id, related_ids)
    }

    /// Genres of one manga, with usage counts.
    pub fn manga_genres(&self, manga_id: i64) -> Result<Vec<RefListEntry>> {
        self.manga_ref_entries("genres", "manga_genres", "genre_id", manga_id)
    }

    /// Tags of one manga, with usage counts.
    pub fn manga_tags(&self, manga_id: i64) -> Result<Vec<RefListEntry>> {
        self.manga_ref_entries("tags", "manga_tags", "tag_id", manga_id)
    }

    fn manga_ref_entries(
        &self,
        table: &str,
        link_table: &str,
        link_col: &str,
        manga_id: i64,
    ) -> Result<Vec<RefListEntry>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT t.id, t.name,
                    (SELECT COUNT(*) FROM {link} c WHERE c.{col} = t.id)
             FROM {table} t
             JOIN {link} l ON l.{col} = t.id
             WHERE l.manga_id = ?1
             ORDER BY t.id",
            link = link_table,
            col = link_col,
            table = table,
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let entries = stmt
            .query_map(params![manga_id], |row| {
                Ok(RefListEntry {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    total_manga: row.get(2)?,
                })
            })
            .map_err(|e| AppError::Internal(format!("Failed to get {}: {}", table, e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect {}: {}", table, e)))?;

        Ok(entries)
    }

    /// Publishers of one manga.
    pub fn manga_publishers(&self, manga_id: i64) -> Result<Vec<Named>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT p.id, p.name FROM publishers p
                 JOIN manga_publishers mp ON mp.publisher_id = p.id
                 WHERE mp.manga_id = ?1 ORDER BY p.id",
            )
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let publishers = stmt
            .query_map(params![manga_id], |row| {
                Ok(Named {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })
            .map_err(|e| AppError::Internal(format!("Failed to get publishers: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect publishers: {}", e)))?;

        Ok(publishers)
    }

    /// Related manga, resolved as the union of outgoing and incoming edges.
    pub fn related_manga(&self, manga_id: i64) -> Result<Vec<Manga>> {
        let conn = self.conn.lock();
        let sql = format!(
            "{} WHERE id IN (
                SELECT related_id FROM related_manga WHERE manga_id = ?1
                UNION
                SELECT manga_id FROM related_manga WHERE related_id = ?1
             ) ORDER BY id",
            MANGA_SELECT
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let manga = stmt
            .query_map(params![manga_id], Self::row_to_manga)
            .map_err(|e| AppError::Internal(format!("Failed to get related manga: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect related manga: {}", e)))?;

        Ok(manga)
    }

    /// Snapshot of the whole catalog with per-manga computed aggregates,
    /// ready for filtering and sorting.
    pub fn catalog_rows(&self) -> Result<Vec<CatalogRow>> {
        let conn = self.conn.lock();
        let sql = "SELECT m.id, m.slug, m.title, m.subtitle, m.description, m.kind, m.age_rating,
                    m.status, m.release_year, m.view_count, m.poster, m.background,
                    m.author_id, m.painter_id, m.created_at, m.updated_at,
                    (SELECT AVG(star) FROM ratings r WHERE r.manga_id = m.id),
                    (SELECT COUNT(*) FROM ratings r WHERE r.manga_id = m.id),
                    (SELECT COUNT(*) FROM chapters c WHERE c.manga_id = m.id),
                    (SELECT MAX(created_at) FROM chapters c WHERE c.manga_id = m.id)
             FROM manga m ORDER BY m.id";

        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let mut rows = stmt
            .query_map([], |row| {
                Ok(CatalogRow {
                    manga: Self::row_to_manga(row)?,
                    avg_rating: row.get(16)?,
                    ratings_count: row.get(17)?,
                    chapters_count: row.get(18)?,
                    latest_chapter_at: row.get(19)?,
                    genre_ids: Vec::new(),
                    tag_ids: Vec::new(),
                })
            })
            .map_err(|e| AppError::Internal(format!("Failed to get catalog: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect catalog: {}", e)))?;

        drop(stmt);
        let genres = Self::link_map(&conn, "manga_genres", "genre_id")?;
        let tags = Self::link_map(&conn, "manga_tags", "tag_id")?;
        drop(conn);

        for row in &mut rows {
            if let Some(ids) = genres.get(&row.manga.id) {
                row.genre_ids = ids.clone();
            }
            if let Some(ids) = tags.get(&row.manga.id) {
                row.tag_ids = ids.clone();
            }
        }

        Ok(rows)
    }

    fn link_map(conn: &Connection, table: &str, col: &str) -> Result<HashMap<i64, Vec<i64>>> {
        let mut stmt = conn
            .prepare(&format!("SELECT manga_id, {} FROM {}", col, table))
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let pairs = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))
            .map_err(|e| AppError::Internal(format!("Failed to read {}: {}", table, e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect {}: {}", table, e)))?;

        let mut map: HashMap<i64, Vec<i64>> = HashMap::new();
        for (manga_id, id) in pairs {
            map.entry(manga_id).or_default().push(id);
        }
        Ok(map)
    }

    fn row_to_manga(row: &rusqlite::Row<'_>) -> rusqlite::Result<Manga> {
        let kind: String = row.get(5)?;
        let age_rating: String = row.get(6)?;
        let status: String = row.get(7)?;

        Ok(Manga {
            id: row.get(0)?,
            slug: row.get(1)?,
            title: row.get(2)?,
            subtitle: row.get(3)?,
            description: row.get(4)?,
            kind: MangaKind::parse(&kind).ok_or_else(|| invalid_text(5, &kind))?,
            age_rating: AgeRating::parse(&age_rating).ok_or_else(|| invalid_text(6, &age_rating))?,
            status: MangaStatus::parse(&status).ok_or_else(|| invalid_text(7, &status))?,
            release_year: row.get(8)?,
            view_count: row.get(9)?,
            poster: row.get(10)?,
            background: row.get(11)?,
            author_id: row.get(12)?,
            painter_id: row.get(13)?,
            created_at: row.get(14)?,
            updated_at: row.get(15)?,
        })
    }

    // ========== VOLUME / CHAPTER / PAGE OPERATIONS ==========

    /// Create a volume for a manga.
    pub fn create_volume(&self, manga_id: i64, volume_number: i64) -> Result<Volume> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO volumes (manga_id, volume_number) VALUES (?1, ?2)",
            params![manga_id, volume_number],
        )
        .map_err(|e| AppError::Internal(format!("Failed to create volume: {}", e)))?;

        Ok(Volume {
            id: conn.last_insert_rowid(),
            manga_id,
            volume_number,
        })
    }

    /// Create a chapter under a volume. The manga reference is denormalized
    /// from the volume.
    pub fn create_chapter(
        &self,
        volume_id: i64,
        chapter_number: &str,
        title: Option<&str>,
    ) -> Result<Chapter> {
        let conn = self.conn.lock();
        let manga_id: i64 = conn
            .query_row(
                "SELECT manga_id FROM volumes WHERE id = ?1",
                params![volume_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| AppError::Internal(format!("Failed to look up volume: {}", e)))?
            .ok_or_else(|| AppError::NotFound(format!("Volume not found: {}", volume_id)))?;

        let slug = title.map(slugify);
        let now = now_timestamp();
        conn.execute(
            "INSERT INTO chapters
             (volume_id, manga_id, chapter_number, title, slug, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![volume_id, manga_id, chapter_number, title, slug, now, now],
        )
        .map_err(|e| AppError::Internal(format!("Failed to create chapter: {}", e)))?;

        Ok(Chapter {
            id: conn.last_insert_rowid(),
            volume_id,
            manga_id,
            chapter_number: chapter_number.to_string(),
            title: title.map(|t| t.to_string()),
            slug,
            created_at: now,
            updated_at: now,
        })
    }

    /// Create a page in a chapter. The manga reference is denormalized
    /// from the chapter.
    pub fn create_page(&self, chapter_id: i64, page_number: i64, image: &str) -> Result<Page> {
        let conn = self.conn.lock();
        let manga_id: i64 = conn
            .query_row(
                "SELECT manga_id FROM chapters WHERE id = ?1",
                params![chapter_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| AppError::Internal(format!("Failed to look up chapter: {}", e)))?
            .ok_or_else(|| AppError::NotFound(format!("Chapter not found: {}", chapter_id)))?;

        conn.execute(
            "INSERT INTO pages (chapter_id, manga_id, page_number, image)
             VALUES (?1, ?2, ?3, ?4)",
            params![chapter_id, manga_id, page_number, image],
        )
        .map_err(|e| AppError::Internal(format!("Failed to create page: {}", e)))?;

        Ok(Page {
            id: conn.last_insert_rowid(),
            chapter_id,
            manga_id,
            page_number,
            image: image.to_string(),
        })
    }

    /// Get a chapter by ID.
    pub fn get_chapter(&self, id: i64) -> Result<Option<Chapter>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, volume_id, manga_id, chapter_number, title, slug, created_at, updated_at
             FROM chapters WHERE id = ?1",
            params![id],
            Self::row_to_chapter,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get chapter: {}", e)))
    }

    /// Get a page by ID.
    pub fn get_page(&self, id: i64) -> Result<Option<Page>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, chapter_id, manga_id, page_number, image FROM pages WHERE id = ?1",
            params![id],
            Self::row_to_page,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get page: {}", e)))
    }

    /// Chapter listing row for one chapter, with volume and page counts.
    pub fn chapter_info(&self, id: i64) -> Result<Option<ChapterInfo>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("{} WHERE c.id = ?1", CHAPTER_INFO_SELECT),
            params![id],
            Self::row_to_chapter_info,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get chapter info: {}", e)))
    }

    /// All chapters of one manga, in volume/insertion order.
    pub fn manga_chapters(&self, manga_id: i64) -> Result<Vec<ChapterInfo>> {
        let conn = self.conn.lock();
        let sql = format!(
            "{} WHERE c.manga_id = ?1 ORDER BY v.volume_number, c.id",
            CHAPTER_INFO_SELECT
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let chapters = stmt
            .query_map(params![manga_id], Self::row_to_chapter_info)
            .map_err(|e| AppError::Internal(format!("Failed to get chapters: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect chapters: {}", e)))?;

        Ok(chapters)
    }

    /// All chapters across the catalog.
    pub fn list_chapters(&self) -> Result<Vec<ChapterInfo>> {
        let conn = self.conn.lock();
        let sql = format!("{} ORDER BY c.id", CHAPTER_INFO_SELECT);
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let chapters = stmt
            .query_map([], Self::row_to_chapter_info)
            .map_err(|e| AppError::Internal(format!("Failed to list chapters: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect chapters: {}", e)))?;

        Ok(chapters)
    }

    /// Most recently created chapter of one manga.
    pub fn last_chapter(&self, manga_id: i64) -> Result<Option<ChapterInfo>> {
        let conn = self.conn.lock();
        let sql = format!(
            "{} WHERE c.manga_id = ?1 ORDER BY c.created_at DESC, c.id DESC LIMIT 1",
            CHAPTER_INFO_SELECT
        );
        conn.query_row(&sql, params![manga_id], Self::row_to_chapter_info)
            .optional()
            .map_err(|e| AppError::Internal(format!("Failed to get last chapter: {}", e)))
    }

    /// Most recent chapters across all manga.
    pub fn latest_chapters(&self, limit: i64) -> Result<Vec<LatestChapter>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT c.id, v.volume_number, c.chapter_number, c.title,
                        (SELECT COUNT(*) FROM pages p WHERE p.chapter_id = c.id),
                        c.created_at, m.title, m.subtitle
                 FROM chapters c
                 JOIN volumes v ON v.id = c.volume_id
                 JOIN manga m ON m.id = c.manga_id
                 ORDER BY c.created_at DESC, c.id DESC LIMIT ?1",
            )
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let chapters = stmt
            .query_map(params![limit], |row| {
                Ok(LatestChapter {
                    id: row.get(0)?,
                    volume_number: row.get(1)?,
                    chapter_number: row.get(2)?,
                    title: row.get(3)?,
                    total_pages: row.get(4)?,
                    created_at: row.get(5)?,
                    manga_title: row.get(6)?,
                    manga_subtitle: row.get(7)?,
                })
            })
            .map_err(|e| AppError::Internal(format!("Failed to get latest chapters: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect latest chapters: {}", e)))?;

        Ok(chapters)
    }

    /// Pages of a chapter, ordered by page number.
    pub fn chapter_pages(&self, chapter_id: i64) -> Result<Vec<Page>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, chapter_id, manga_id, page_number, image
                 FROM pages WHERE chapter_id = ?1 ORDER BY page_number",
            )
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let pages = stmt
            .query_map(params![chapter_id], Self::row_to_page)
            .map_err(|e| AppError::Internal(format!("Failed to get pages: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect pages: {}", e)))?;

        Ok(pages)
    }

    /// Total chapters of a manga, summed across its volumes. Computed on read.
    pub fn total_chapter_count(&self, manga_id: i64) -> Result<i64> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT COUNT(*) FROM chapters c
             JOIN volumes v ON v.id = c.volume_id
             WHERE v.manga_id = ?1",
            params![manga_id],
            |row| row.get(0),
        )
        .map_err(|e| AppError::Internal(format!("Failed to count chapters: {}", e)))
    }

    fn row_to_chapter(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chapter> {
        Ok(Chapter {
            id: row.get(0)?,
            volume_id: row.get(1)?,
            manga_id: row.get(2)?,
            chapter_number: row.get(3)?,
            title: row.get(4)?,
            slug: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    fn row_to_page(row: &rusqlite::Row<'_>) -> rusqlite::Result<Page> {
        Ok(Page {
            id: row.get(0)?,
            chapter_id: row.get(1)?,
            manga_id: row.get(2)?,
            page_number: row.get(3)?,
            image: row.get(4)?,
        })
    }

    fn row_to_chapter_info(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChapterInfo> {
        Ok(ChapterInfo {
            id: row.get(0)?,
            volume_number: row.get(1)?,
            chapter_number: row.get(2)?,
            title: row.get(3)?,
            total_pages: row.get(4)?,
        })
    }

    // ========== RATING OPERATIONS ==========

    /// Create a rating. Fails with Conflict when the user already rated
    /// this manga; the UNIQUE constraint makes the check race-safe.
    pub fn create_rating(&self, user_id: &str, manga_id: i64, star: i64) -> Result<Rating> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO ratings (user_id, manga_id, star) VALUES (?1, ?2, ?3)",
            params![user_id, manga_id, star],
        )
        .map_err(|e| {
            if e.to_string().contains("UNIQUE constraint") {
                AppError::Conflict("Rating for this manga already exists".to_string())
            } else {
                AppError::Internal(format!("Failed to create rating: {}", e))
            }
        })?;

        Ok(Rating {
            id: conn.last_insert_rowid(),
            user_id: user_id.to_string(),
            manga_id,
            star,
        })
    }

    /// Get a rating by ID.
    pub fn get_rating(&self, id: i64) -> Result<Option<Rating>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, user_id, manga_id, star FROM ratings WHERE id = ?1",
            params![id],
            Self::row_to_rating,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get rating: {}", e)))
    }

    /// Update a rating's star value.
    pub fn update_rating(&self, id: i64, star: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "UPDATE ratings SET star = ?1 WHERE id = ?2",
                params![star, id],
            )
            .map_err(|e| AppError::Internal(format!("Failed to update rating: {}", e)))?;
        Ok(rows > 0)
    }

    /// Delete a rating.
    pub fn delete_rating(&self, id: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute("DELETE FROM ratings WHERE id = ?1", params![id])
            .map_err(|e| AppError::Internal(format!("Failed to delete rating: {}", e)))?;
        Ok(rows > 0)
    }

    /// A user's rating for a manga, if any.
    pub fn user_rating(&self, user_id: &str, manga_id: i64) -> Result<Option<Rating>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, user_id, manga_id, star FROM ratings
             WHERE user_id = ?1 AND manga_id = ?2",
            params![user_id, manga_id],
            Self::row_to_rating,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get user rating: {}", e)))
    }

    /// All star values given to a manga.
    pub fn manga_rating_stars(&self, manga_id: i64) -> Result<Vec<i64>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT star FROM ratings WHERE manga_id = ?1")
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let stars = stmt
            .query_map(params![manga_id], |row| row.get(0))
            .map_err(|e| AppError::Internal(format!("Failed to get stars: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect stars: {}", e)))?;

        Ok(stars)
    }

    fn row_to_rating(row: &rusqlite::Row<'_>) -> rusqlite::Result<Rating> {
        Ok(Rating {
            id: row.get(0)?,
            user_id: row.get(1)?,
            manga_id: row.get(2)?,
            star: row.get(3)?,
        })
    }

    // ========== COMMENT OPERATIONS ==========

    /// Insert a comment row. Flag/relationship rules live in the comments
    /// service; this is the raw write.
    pub fn insert_comment(
        &self,
        author_id: &str,
        manga_id: i64,
        page_id: Option<i64>,
        content: &str,
        is_page_comment: bool,
        parent_id: Option<i64>,
    ) -> Result<Comment> {
        let conn = self.conn.lock();
        let now = now_timestamp();
        conn.execute(
            "INSERT INTO comments
             (author_id, manga_id, page_id, content, is_page_comment, parent_id,
              is_parent, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?8)",
            params![
                author_id,
                manga_id,
                page_id,
                content,
                is_page_comment,
                parent_id,
                now,
                now,
            ],
        )
        .map_err(|e| AppError::Internal(format!("Failed to create comment: {}", e)))?;

        Ok(Comment {
            id: conn.last_insert_rowid(),
            author_id: author_id.to_string(),
            manga_id,
            page_id,
            content: content.to_string(),
            is_page_comment,
            parent_id,
            is_parent: false,
            created_at: now,
            updated_at: now,
        })
    }

    /// Mark a comment as having at least one reply.
    pub fn mark_comment_parent(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE comments SET is_parent = 1 WHERE id = ?1",
            params![id],
        )
        .map_err(|e| AppError::Internal(format!("Failed to mark comment: {}", e)))?;
        Ok(())
    }

    /// Get a comment by ID.
    pub fn get_comment(&self, id: i64) -> Result<Option<Comment>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("{} WHERE id = ?1", COMMENT_SELECT),
            params![id],
            Self::row_to_comment,
        )
        .optional()
        .map_err(|e| AppError::Internal(format!("Failed to get comment: {}", e)))
    }

    /// Update a comment's content only.
    pub fn update_comment_content(&self, id: i64, content: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "UPDATE comments SET content = ?1, updated_at = ?2 WHERE id = ?3",
                params![content, now_timestamp(), id],
            )
            .map_err(|e| AppError::Internal(format!("Failed to update comment: {}", e)))?;
        Ok(rows > 0)
    }

    /// Delete a comment; replies and votes cascade.
    pub fn delete_comment(&self, id: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute("DELETE FROM comments WHERE id = ?1", params![id])
            .map_err(|e| AppError::Internal(format!("Failed to delete comment: {}", e)))?;
        Ok(rows > 0)
    }

    /// Top-level comments: excludes comments that are themselves replies.
    /// With a manga slug alone, page comments are filtered out; with chapter
    /// and page numbers, only that page's comments are returned.
    pub fn top_level_comments(
        &self,
        manga_slug: Option<&str>,
        chapter_number: Option<&str>,
        page_number: Option<i64>,
    ) -> Result<Vec<Comment>> {
        let conn = self.conn.lock();

        let (sql, bind): (String, Vec<Box<dyn rusqlite::ToSql>>) =
            match (manga_slug, chapter_number, page_number) {
                (Some(slug), Some(chapter), Some(page)) => (
                    "SELECT cm.id, cm.author_id, cm.manga_id, cm.page_id, cm.content,
                            cm.is_page_comment, cm.parent_id, cm.is_parent,
                            cm.created_at, cm.updated_at
                     FROM comments cm
                     JOIN manga m ON m.id = cm.manga_id
                     JOIN pages p ON p.id = cm.page_id
                     JOIN chapters c ON c.id = p.chapter_id
                     WHERE cm.parent_id IS NULL
                       AND m.slug = ?1 AND p.page_number = ?2 AND c.chapter_number = ?3
                     ORDER BY cm.created_at, cm.id"
                        .to_string(),
                    vec![
                        Box::new(slug.to_string()),
                        Box::new(page),
                        Box::new(chapter.to_string()),
                    ],
                ),
                (Some(slug), _, _) => (
                    "SELECT cm.id, cm.author_id, cm.manga_id, cm.page_id, cm.content,
                            cm.is_page_comment, cm.parent_id, cm.is_parent,
                            cm.created_at, cm.updated_at
                     FROM comments cm
                     JOIN manga m ON m.id = cm.manga_id
                     WHERE cm.parent_id IS NULL
                       AND m.slug = ?1 AND cm.is_page_comment = 0
                     ORDER BY cm.created_at, cm.id"
                        .to_string(),
                    vec![Box::new(slug.to_string())],
                ),
                _ => (
                    format!(
                        "{} WHERE parent_id IS NULL ORDER BY created_at, id",
                        COMMENT_SELECT
                    ),
                    Vec::new(),
                ),
            };

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let comments = stmt
            .query_map(
                rusqlite::params_from_iter(bind.iter().map(|b| b.as_ref())),
                Self::row_to_comment,
            )
            .map_err(|e| AppError::Internal(format!("Failed to get comments: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect comments: {}", e)))?;

        Ok(comments)
    }

    /// Direct replies to a comment, oldest first.
    pub fn comment_replies(&self, parent_id: i64) -> Result<Vec<Comment>> {
        let conn = self.conn.lock();
        let sql = format!(
            "{} WHERE parent_id = ?1 ORDER BY created_at, id",
            COMMENT_SELECT
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let comments = stmt
            .query_map(params![parent_id], Self::row_to_comment)
            .map_err(|e| AppError::Internal(format!("Failed to get replies: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect replies: {}", e)))?;

        Ok(comments)
    }

    /// Sum of vote values on a comment. May be negative.
    pub fn comment_score(&self, comment_id: i64) -> Result<i64> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT COALESCE(SUM(vote), 0) FROM comment_votes WHERE comment_id = ?1",
            params![comment_id],
            |row| row.get(0),
        )
        .map_err(|e| AppError::Internal(format!("Failed to get score: {}", e)))
    }

    /// Cast a vote on a comment, with toggle/flip semantics, as one
    /// transaction: absent -> insert, same value -> delete, different
    /// value -> update. UNIQUE (user_id, comment_id) keeps concurrent
    /// duplicate casts from creating two rows.
    pub fn cast_vote(&self, user_id: &str, comment_id: i64, vote: i64) -> Result<VoteOutcome> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| AppError::Internal(format!("Failed to start transaction: {}", e)))?;

        let existing: Option<(i64, i64)> = tx
            .query_row(
                "SELECT id, vote FROM comment_votes
                 WHERE user_id = ?1 AND comment_id = ?2",
                params![user_id, comment_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|e| AppError::Internal(format!("Failed to look up vote: {}", e)))?;

        let outcome = match existing {
            None => {
                tx.execute(
                    "INSERT INTO comment_votes (user_id, comment_id, vote) VALUES (?1, ?2, ?3)",
                    params![user_id, comment_id, vote],
                )
                .map_err(|e| {
                    if e.to_string().contains("UNIQUE constraint") {
                        AppError::Conflict("Vote already recorded".to_string())
                    } else {
                        AppError::Internal(format!("Failed to insert vote: {}", e))
                    }
                })?;
                VoteOutcome::Added
            }
            Some((id, current)) if current == vote => {
                tx.execute("DELETE FROM comment_votes WHERE id = ?1", params![id])
                    .map_err(|e| AppError::Internal(format!("Failed to delete vote: {}", e)))?;
                VoteOutcome::Removed
            }
            Some((id, _)) => {
                tx.execute(
                    "UPDATE comment_votes SET vote = ?1 WHERE id = ?2",
                    params![vote, id],
                )
                .map_err(|e| AppError::Internal(format!("Failed to update vote: {}", e)))?;
                VoteOutcome::Updated
            }
        };

        tx.commit()
            .map_err(|e| AppError::Internal(format!("Failed to commit vote: {}", e)))?;

        Ok(outcome)
    }

    fn row_to_comment(row: &rusqlite::Row<'_>) -> rusqlite::Result<Comment> {
        Ok(Comment {
            id: row.get(0)?,
            author_id: row.get(1)?,
            manga_id: row.get(2)?,
            page_id: row.get(3)?,
            content: row.get(4)?,
            is_page_comment: row.get(5)?,
            parent_id: row.get(6)?,
            is_parent: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    // ========== SHELF OPERATIONS ==========

    /// Put a manga on one of the user's shelves, updating the note when the
    /// entry already exists.
    pub fn set_shelf(
        &self,
        user_id: &str,
        manga_id: i64,
        shelf: Shelf,
        note: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO shelf_entries (user_id, manga_id, shelf, note, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (user_id, manga_id, shelf) DO UPDATE SET
                note = excluded.note",
            params![user_id, manga_id, shelf.as_str(), note, now_timestamp()],
        )
        .map_err(|e| AppError::Internal(format!("Failed to set shelf entry: {}", e)))?;
        Ok(())
    }

    /// Remove a manga from one of the user's shelves.
    pub fn remove_shelf(&self, user_id: &str, manga_id: i64, shelf: Shelf) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "DELETE FROM shelf_entries
                 WHERE user_id = ?1 AND manga_id = ?2 AND shelf = ?3",
                params![user_id, manga_id, shelf.as_str()],
            )
            .map_err(|e| AppError::Internal(format!("Failed to remove shelf entry: {}", e)))?;
        Ok(rows > 0)
    }

    /// A user's shelf entries across all manga.
    pub fn user_shelf(&self, user_id: &str) -> Result<Vec<ShelfEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT user_id, manga_id, shelf, note, created_at
                 FROM shelf_entries WHERE user_id = ?1
                 ORDER BY created_at, manga_id",
            )
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let entries = stmt
            .query_map(params![user_id], |row| {
                let shelf: String = row.get(2)?;
                Ok(ShelfEntry {
                    user_id: row.get(0)?,
                    manga_id: row.get(1)?,
                    shelf: Shelf::parse(&shelf).ok_or_else(|| invalid_text(2, &shelf))?,
                    note: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })
            .map_err(|e| AppError::Internal(format!("Failed to get shelf: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect shelf: {}", e)))?;

        Ok(entries)
    }

    /// Per-shelf user counts for a manga, in the fixed shelf order.
    pub fn shelf_counts(&self, manga_id: i64) -> Result<Vec<(Shelf, i64)>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT shelf, COUNT(*) FROM shelf_entries
                 WHERE manga_id = ?1 GROUP BY shelf",
            )
            .map_err(|e| AppError::Internal(format!("Failed to prepare query: {}", e)))?;

        let raw = stmt
            .query_map(params![manga_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(|e| AppError::Internal(format!("Failed to get shelf counts: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Internal(format!("Failed to collect shelf counts: {}", e)))?;

        let mut counts: HashMap<&str, i64> = HashMap::new();
        for (shelf, total) in &raw {
            counts.insert(shelf.as_str(), *total);
        }

        Ok(Shelf::all()
            .into_iter()
            .map(|s| (s, counts.get(s.as_str()).copied().unwrap_or(0)))
            .collect())
    }

    // ========== STATS OPERATIONS ==========

    /// Catalog-wide row counts.
    pub fn catalog_stats(&self) -> Result<CatalogStats> {
        let conn = self.conn.lock();
        let count = |table: &str| -> Result<i64> {
            conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                row.get(0)
            })
            .map_err(|e| AppError::Internal(format!("Failed to count {}: {}", table, e)))
        };

        Ok(CatalogStats {
            total_manga: count("manga")?,
            total_chapters: count("chapters")?,
            total_comments: count("comments")?,
            total_ratings: count("ratings")?,
            total_users: count("users")?,
        })
    }
}

/// Catalog-wide row counts for the stats endpoint.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CatalogStats {
    /// Number of manga.
    pub total_manga: i64,
    /// Number of chapters.
    pub total_chapters: i64,
    /// Number of comments.
    pub total_comments: i64,
    /// Number of ratings.
    pub total_ratings: i64,
    /// Number of users.
    pub total_users: i64,
}

const MANGA_SELECT: &str = "SELECT id, slug, title, subtitle, description, kind, age_rating, \
     status, release_year, view_count, poster, background, author_id, painter_id, \
     created_at, updated_at FROM manga";

const CHAPTER_INFO_SELECT: &str = "SELECT c.id, v.volume_number, c.chapter_number, c.title, \
     (SELECT COUNT(*) FROM pages p WHERE p.chapter_id = c.id) \
     FROM chapters c JOIN volumes v ON v.id = c.volume_id";

const COMMENT_SELECT: &str = "SELECT id, author_id, manga_id, page_id, content, is_page_comment, \
     parent_id, is_parent, created_at, updated_at FROM comments";

fn invalid_text(idx: usize, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        format!("unexpected value: {}", value).into(),
    )
}
