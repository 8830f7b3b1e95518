//! Threaded comments and per-user comment votes.

use crate::db::{Comment, Database};
use crate::error::{AppError, Result};
use serde::Serialize;

/// What a vote cast did, per the toggle/flip state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteOutcome {
    /// No prior vote; the vote was recorded.
    Added,
    /// A prior vote with the opposite value was flipped.
    Updated,
    /// A prior vote with the same value was removed.
    Removed,
}

impl VoteOutcome {
    /// Response message for this outcome.
    pub fn detail(&self) -> &'static str {
        match self {
            VoteOutcome::Added => "Vote added.",
            VoteOutcome::Updated => "Vote updated.",
            VoteOutcome::Removed => "Vote removed.",
        }
    }
}

/// Fields for creating a comment.
#[derive(Debug, Clone)]
pub struct NewComment {
    /// Comment author.
    pub author_id: String,
    /// Target manga.
    pub manga_id: i64,
    /// Comment body.
    pub content: String,
    /// Target page, for page comments.
    pub page_id: Option<i64>,
    /// Parent comment, for replies.
    pub parent_id: Option<i64>,
}

/// A comment with its author, score and nested replies resolved.
#[derive(Debug, Clone, Serialize)]
pub struct CommentNode {
    /// Comment row ID.
    pub id: i64,
    /// Comment body.
    pub content: String,
    /// Author username.
    pub author: String,
    /// Author avatar reference.
    pub author_image: Option<String>,
    /// Creation timestamp.
    pub created_at: i64,
    /// Sum of votes; may be negative.
    pub rating: i64,
    /// Nested replies, oldest first.
    pub replies: Vec<CommentNode>,
}

/// Create a comment, enforcing target rules:
/// a page must belong to the stated manga; a reply to a page comment
/// inherits the parent's page target; the parent is marked as having
/// replies.
pub fn create_comment(db: &Database, new: &NewComment) -> Result<Comment> {
    let manga = db
        .get_manga(new.manga_id)?
        .ok_or_else(|| AppError::NotFound(format!("Manga not found: {}", new.manga_id)))?;

    let mut page_id = new.page_id;

    if let Some(id) = page_id {
        let page = db
            .get_page(id)?
            .ok_or_else(|| AppError::NotFound(format!("Page not found: {}", id)))?;
        if page.manga_id != manga.id {
            return Err(AppError::Validation {
                field: "page",
                message: "Manga page cannot refer to this manga".to_string(),
            });
        }
    }

    let parent = match new.parent_id {
        Some(id) => Some(
            db.get_comment(id)?
                .ok_or_else(|| AppError::NotFound(format!("Comment not found: {}", id)))?,
        ),
        None => None,
    };

    if let Some(parent) = &parent {
        // A reply under a page comment lands on the same page.
        if parent.is_page_comment {
            page_id = parent.page_id;
        }
    }

    let comment = db.insert_comment(
        &new.author_id,
        manga.id,
        page_id,
        &new.content,
        page_id.is_some(),
        new.parent_id,
    )?;

    if let Some(parent) = &parent {
        db.mark_comment_parent(parent.id)?;
    }

    Ok(comment)
}

/// Cast a vote on a comment. Valid values are +1 and -1; anything else is
/// rejected before touching storage.
pub fn cast_vote(db: &Database, user_id: &str, comment_id: i64, vote: i64) -> Result<VoteOutcome> {
    if vote != 1 && vote != -1 {
        return Err(AppError::Validation {
            field: "vote",
            message: "Invalid vote value. Must be -1 or 1.".to_string(),
        });
    }

    if db.get_comment(comment_id)?.is_none() {
        return Err(AppError::NotFound("Comment not found.".to_string()));
    }

    db.cast_vote(user_id, comment_id, vote)
}

/// Resolve a comment into a node with author, score and the full reply
/// tree. Depth is unbounded; cycles cannot occur because the parent link
/// is set once at creation.
pub fn comment_tree(db: &Database, comment: &Comment) -> Result<CommentNode> {
    let author = db.get_user(&comment.author_id)?.ok_or_else(|| {
        AppError::Internal(format!("Comment author missing: {}", comment.author_id))
    })?;

    let replies = db
        .comment_replies(comment.id)?
        .iter()
        .map(|reply| comment_tree(db, reply))
        .collect::<Result<Vec<_>>>()?;

    Ok(CommentNode {
        id: comment.id,
        content: comment.content.clone(),
        author: author.username,
        author_image: author.avatar,
        created_at: comment.created_at,
        rating: db.comment_score(comment.id)?,
        replies,
    })
}
