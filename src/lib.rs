//! mangalib-rs: a manga-catalog backend with ratings, threaded comments
//! and per-user reading lists.
//!
//! This crate serves a relational manga catalog (titles, genres, authors,
//! volumes, chapters, pages) over an HTTP API and handles the end-user
//! interactions around it: star ratings with read-side aggregation,
//! threaded comments with toggle votes, and shelf membership.
//!
//! # Features
//!
//! - Catalog CRUD with slug-addressed titles
//! - Filterable, sortable, searchable, paginated listings
//! - Rating histograms and shelf distributions computed on read
//! - Threaded comments with one-vote-per-user toggle/flip voting
//! - Popular / newest / latest-chapter derived lists
//!
//! Authentication, image storage and admin tooling are external
//! collaborators; the server consumes a user identity and stores image
//! references only.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Catalog filtering, sorting and pagination.
pub mod catalog;
/// Threaded comments and votes.
pub mod comments;
/// Configuration and CLI.
pub mod config;
/// Database operations.
pub mod db;
/// Error types.
pub mod error;
/// HTTP server.
pub mod server;
/// Rating and shelf aggregation.
pub mod stats;

#[cfg(test)]
mod tests;

pub use config::{Cli, Command, Config};
pub use db::Database;
pub use error::{AppError, Result};
pub use server::AppState;
