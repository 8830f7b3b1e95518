use crate::catalog::{self, MangaFilter, SortDir, SortKey};
use crate::comments::{self, NewComment, VoteOutcome};
use crate::config::Config;
use crate::db::{
    AgeRating, Database, Manga, MangaKind, MangaStatus, NewManga, Shelf, User, now_timestamp,
    slugify,
};
use crate::error::AppError;
use crate::stats;

fn test_db() -> Database {
    Database::open_memory().unwrap()
}

fn create_user(db: &Database, id: &str, username: &str) {
    let user = User {
        id: id.to_string(),
        username: username.to_string(),
        avatar: None,
        created_at: now_timestamp(),
    };
    db.create_user(&user).unwrap();
}

fn create_manga(db: &Database, title: &str) -> Manga {
    let author_id = db.get_or_create_author("Test Author").unwrap();
    let painter_id = db.get_or_create_painter("Test Painter").unwrap();

    db.create_manga(&NewManga {
        slug: slugify(title),
        title: title.to_string(),
        subtitle: format!("{} Original", title),
        description: "A test title".to_string(),
        kind: MangaKind::Manga,
        age_rating: AgeRating::Absent,
        status: MangaStatus::Ongoing,
        release_year: 2020,
        poster: None,
        background: None,
        author_id,
        painter_id,
    })
    .unwrap()
}

fn create_chapter(db: &Database, manga_id: i64, number: &str) -> i64 {
    let volume = db.create_volume(manga_id, 1).unwrap();
    db.create_chapter(volume.id, number, Some("Chapter")).unwrap().id
}

#[test]
fn db_create_and_get_user() {
    let db = test_db();
    let user = User {
        id: "user-1".to_string(),
        username: "alice".to_string(),
        avatar: Some("avatars/alice.jpg".to_string()),
        created_at: now_timestamp(),
    };

    db.create_user(&user).unwrap();

    let found = db.get_user("user-1").unwrap().unwrap();
    assert_eq!(found.username, "alice");
    assert_eq!(found.avatar, Some("avatars/alice.jpg".to_string()));

    let by_name = db.get_user_by_username("alice").unwrap().unwrap();
    assert_eq!(by_name.id, "user-1");
}

#[test]
fn db_duplicate_username_fails() {
    let db = test_db();
    create_user(&db, "user-1", "alice");

    let dup = User {
        id: "user-2".to_string(),
        username: "alice".to_string(),
        avatar: None,
        created_at: now_timestamp(),
    };
    assert!(matches!(
        db.create_user(&dup),
        Err(AppError::Conflict(_))
    ));
}

#[test]
fn db_delete_user() {
    let db = test_db();
    create_user(&db, "user-1", "bob");

    assert!(db.delete_user("bob").unwrap());
    assert!(db.get_user("user-1").unwrap().is_none());
}

#[test]
fn slugify_titles() {
    assert_eq!(slugify("One Piece"), "one-piece");
    assert_eq!(slugify("Dr. STONE!!"), "dr-stone");
    assert_eq!(slugify("  Tower of God  "), "tower-of-god");
}

#[test]
fn db_create_and_get_manga() {
    let db = test_db();
    let manga = create_manga(&db, "One Piece");

    let found = db.get_manga_by_slug("one-piece").unwrap().unwrap();
    assert_eq!(found.id, manga.id);
    assert_eq!(found.title, "One Piece");
    assert_eq!(found.kind, MangaKind::Manga);
    assert_eq!(found.status, MangaStatus::Ongoing);
}

#[test]
fn db_duplicate_slug_fails() {
    let db = test_db();
    create_manga(&db, "Berserk");

    let author_id = db.get_or_create_author("Other").unwrap();
    let painter_id = db.get_or_create_painter("Other").unwrap();
    let result = db.create_manga(&NewManga {
        slug: "berserk".to_string(),
        title: "Berserk".to_string(),
        subtitle: "Copy".to_string(),
        description: String::new(),
        kind: MangaKind::Manga,
        age_rating: AgeRating::EighteenPlus,
        status: MangaStatus::Suspended,
        release_year: 1989,
        poster: None,
        background: None,
        author_id,
        painter_id,
    });

    assert!(matches!(result, Err(AppError::Conflict(_))));
}

#[test]
fn db_update_manga_keeps_slug() {
    let db = test_db();
    let manga = create_manga(&db, "Vinland Saga");

    let new = NewManga {
        slug: "renamed".to_string(),
        title: "Vinland Saga II".to_string(),
        subtitle: "Original".to_string(),
        description: "Updated".to_string(),
        kind: MangaKind::Manga,
        age_rating: AgeRating::SixteenPlus,
        status: MangaStatus::Released,
        release_year: 2005,
        poster: Some("posters/vs.jpg".to_string()),
        background: None,
        author_id: manga.author_id,
        painter_id: manga.painter_id,
    };

    assert!(db.update_manga(manga.id, &new).unwrap());

    let updated = db.get_manga(manga.id).unwrap().unwrap();
    assert_eq!(updated.slug, "vinland-saga");
    assert_eq!(updated.title, "Vinland Saga II");
    assert_eq!(updated.status, MangaStatus::Released);
    assert_eq!(updated.poster, Some("posters/vs.jpg".to_string()));
}

#[test]
fn db_delete_manga() {
    let db = test_db();
    let manga = create_manga(&db, "Dropped Title");

    assert!(db.delete_manga(manga.id).unwrap());
    assert!(db.get_manga(manga.id).unwrap().is_none());
}

#[test]
fn db_genres_and_tags_with_counts() {
    let db = test_db();
    let m1 = create_manga(&db, "Title A");
    let m2 = create_manga(&db, "Title B");

    let action = db.get_or_create_genre("Action").unwrap();
    let drama = db.get_or_create_genre("Drama").unwrap();
    // Same name resolves to the same row
    assert_eq!(db.get_or_create_genre("Action").unwrap(), action);

    db.set_manga_genres(m1.id, &[action, drama]).unwrap();
    db.set_manga_genres(m2.id, &[action]).unwrap();

    let genres = db.list_genres(None).unwrap();
    assert_eq!(genres.len(), 2);
    assert_eq!(genres[0].name, "Action");
    assert_eq!(genres[0].total_manga, 2);
    assert_eq!(genres[1].total_manga, 1);

    let limited = db.list_genres(Some(1)).unwrap();
    assert_eq!(limited.len(), 1);

    let of_m1 = db.manga_genres(m1.id).unwrap();
    assert_eq!(of_m1.len(), 2);
}

#[test]
fn db_related_manga_union() {
    let db = test_db();
    let m1 = create_manga(&db, "Main Story");
    let m2 = create_manga(&db, "Side Story");

    // One-directional edge only
    db.set_related_manga(m1.id, &[m2.id]).unwrap();

    let from_m1 = db.related_manga(m1.id).unwrap();
    assert_eq!(from_m1.len(), 1);
    assert_eq!(from_m1[0].id, m2.id);

    // The reverse direction is resolved at read time
    let from_m2 = db.related_manga(m2.id).unwrap();
    assert_eq!(from_m2.len(), 1);
    assert_eq!(from_m2[0].id, m1.id);
}

#[test]
fn db_chapter_numbers_are_strings() {
    let db = test_db();
    let manga = create_manga(&db, "Fractional");
    let volume = db.create_volume(manga.id, 1).unwrap();

    let chapter = db.create_chapter(volume.id, "10.5", Some("Interlude")).unwrap();
    let found = db.get_chapter(chapter.id).unwrap().unwrap();
    assert_eq!(found.chapter_number, "10.5");
    assert_eq!(found.manga_id, manga.id);
}

#[test]
fn db_create_chapter_missing_volume() {
    let db = test_db();
    assert!(matches!(
        db.create_chapter(999, "1", None),
        Err(AppError::NotFound(_))
    ));
}

#[test]
fn db_total_chapter_count_spans_volumes() {
    let db = test_db();
    let manga = create_manga(&db, "Long Runner");

    let v1 = db.create_volume(manga.id, 1).unwrap();
    let v2 = db.create_volume(manga.id, 2).unwrap();
    db.create_chapter(v1.id, "1", None).unwrap();
    db.create_chapter(v1.id, "2", None).unwrap();
    db.create_chapter(v2.id, "3", None).unwrap();

    assert_eq!(db.total_chapter_count(manga.id).unwrap(), 3);

    let listing = db.manga_chapters(manga.id).unwrap();
    assert_eq!(listing.len(), 3);
    assert_eq!(listing[0].volume_number, 1);
    assert_eq!(listing[2].volume_number, 2);
}

#[test]
fn db_chapter_pages_ordered() {
    let db = test_db();
    let manga = create_manga(&db, "Paged");
    let chapter_id = create_chapter(&db, manga.id, "1");

    db.create_page(chapter_id, 3, "p3.jpg").unwrap();
    db.create_page(chapter_id, 1, "p1.jpg").unwrap();
    db.create_page(chapter_id, 2, "p2.jpg").unwrap();

    let pages = db.chapter_pages(chapter_id).unwrap();
    let numbers: Vec<i64> = pages.iter().map(|p| p.page_number).collect();
    assert_eq!(numbers, vec![1, 2, 3]);

    let info = db.chapter_info(chapter_id).unwrap().unwrap();
    assert_eq!(info.total_pages, 3);
}

#[test]
fn db_latest_chapters() {
    let db = test_db();
    let manga = create_manga(&db, "Fresh");
    let volume = db.create_volume(manga.id, 1).unwrap();

    for i in 1..=3 {
        db.create_chapter(volume.id, &i.to_string(), None).unwrap();
    }

    let latest = db.latest_chapters(2).unwrap();
    assert_eq!(latest.len(), 2);
    // Newest chapter first; equal timestamps fall back to row id
    assert_eq!(latest[0].chapter_number, "3");
    assert_eq!(latest[0].manga_title, "Fresh");
    assert_eq!(latest[0].manga_subtitle, "Fresh Original");
}

#[test]
fn db_rating_roundtrip() {
    let db = test_db();
    create_user(&db, "user-1", "alice");
    let manga = create_manga(&db, "Rated");

    let rating = db.create_rating("user-1", manga.id, 8).unwrap();
    assert_eq!(rating.star, 8);

    let found = db.user_rating("user-1", manga.id).unwrap().unwrap();
    assert_eq!(found.id, rating.id);

    assert!(db.update_rating(rating.id, 9).unwrap());
    assert_eq!(db.get_rating(rating.id).unwrap().unwrap().star, 9);

    assert!(db.delete_rating(rating.id).unwrap());
    assert!(db.user_rating("user-1", manga.id).unwrap().is_none());
}

#[test]
fn db_duplicate_rating_fails_without_second_row() {
    let db = test_db();
    create_user(&db, "user-1", "alice");
    let manga = create_manga(&db, "Once Only");

    db.create_rating("user-1", manga.id, 7).unwrap();
    let result = db.create_rating("user-1", manga.id, 3);
    assert!(matches!(result, Err(AppError::Conflict(_))));

    // The original rating is untouched and remains the only row
    let stars = db.manga_rating_stars(manga.id).unwrap();
    assert_eq!(stars, vec![7]);
}

#[test]
fn stats_average_empty_is_zero() {
    assert_eq!(stats::average(&[]), 0.0);
}

#[test]
fn stats_average_of_ratings() {
    let avg = stats::average(&[10, 10, 8]);
    assert!((avg - 9.333333).abs() < 1e-4);
}

#[test]
fn stats_histogram_empty() {
    let histogram = stats::histogram(&[]);
    assert_eq!(histogram.total_rated, 0);
    assert_eq!(histogram.ratings.len(), 10);
    for (i, bucket) in histogram.ratings.iter().enumerate() {
        assert_eq!(bucket.star, i as i64 + 1);
        assert_eq!(bucket.total, 0);
        assert_eq!(bucket.percent, 0.0);
    }
}

#[test]
fn stats_histogram_counts_and_percents() {
    let histogram = stats::histogram(&[10, 10, 8]);
    assert_eq!(histogram.total_rated, 3);

    let ten = &histogram.ratings[9];
    assert_eq!(ten.star, 10);
    assert_eq!(ten.total, 2);
    assert!((ten.percent - 66.6667).abs() < 1e-3);

    let eight = &histogram.ratings[7];
    assert_eq!(eight.star, 8);
    assert_eq!(eight.total, 1);
    assert!((eight.percent - 33.3333).abs() < 1e-3);

    let unused = &histogram.ratings[0];
    assert_eq!(unused.total, 0);
    assert_eq!(unused.percent, 0.0);
}

#[test]
fn db_shelf_counts_and_distribution() {
    let db = test_db();
    create_user(&db, "user-1", "alice");
    create_user(&db, "user-2", "bob");
    let manga = create_manga(&db, "Shelved");

    db.set_shelf("user-1", manga.id, Shelf::Reading, None).unwrap();
    // A user on several shelves is counted once per shelf
    db.set_shelf("user-1", manga.id, Shelf::Favorite, None).unwrap();
    db.set_shelf("user-2", manga.id, Shelf::Reading, Some("great"))
        .unwrap();
    // Re-setting the same shelf updates instead of duplicating
    db.set_shelf("user-2", manga.id, Shelf::Reading, Some("still great"))
        .unwrap();

    let counts = db.shelf_counts(manga.id).unwrap();
    assert_eq!(counts.len(), 5);
    assert_eq!(counts[0], (Shelf::Reading, 2));
    assert_eq!(counts[4], (Shelf::Favorite, 1));

    let distribution = stats::shelf_distribution(&counts);
    assert_eq!(distribution.total_users, 3);
    assert!((distribution.user_list[0].percent - 66.6667).abs() < 1e-3);
    assert!((distribution.user_list[4].percent - 33.3333).abs() < 1e-3);
    assert_eq!(distribution.user_list[1].percent, 0.0);
}

#[test]
fn stats_shelf_distribution_empty() {
    let db = test_db();
    let manga = create_manga(&db, "Unshelved");

    let distribution = stats::shelf_distribution(&db.shelf_counts(manga.id).unwrap());
    assert_eq!(distribution.total_users, 0);
    assert_eq!(distribution.user_list.len(), 5);
    assert!(distribution.user_list.iter().all(|s| s.percent == 0.0));
}

#[test]
fn db_remove_shelf_entry() {
    let db = test_db();
    create_user(&db, "user-1", "alice");
    let manga = create_manga(&db, "Temporary");

    db.set_shelf("user-1", manga.id, Shelf::Planned, None).unwrap();
    assert!(db.remove_shelf("user-1", manga.id, Shelf::Planned).unwrap());
    assert!(!db.remove_shelf("user-1", manga.id, Shelf::Planned).unwrap());
    assert!(db.user_shelf("user-1").unwrap().is_empty());
}

#[test]
fn comments_create_top_level() {
    let db = test_db();
    create_user(&db, "user-1", "alice");
    let manga = create_manga(&db, "Discussed");

    let comment = comments::create_comment(
        &db,
        &NewComment {
            author_id: "user-1".to_string(),
            manga_id: manga.id,
            content: "First!".to_string(),
            page_id: None,
            parent_id: None,
        },
    )
    .unwrap();

    assert!(!comment.is_page_comment);
    assert!(!comment.is_parent);
    assert!(comment.parent_id.is_none());
}

#[test]
fn comments_reply_marks_parent_and_inherits_page() {
    let db = test_db();
    create_user(&db, "user-1", "alice");
    create_user(&db, "user-2", "bob");
    let manga = create_manga(&db, "Page Talk");
    let chapter_id = create_chapter(&db, manga.id, "1");
    let page = db.create_page(chapter_id, 1, "p1.jpg").unwrap();

    let parent = comments::create_comment(
        &db,
        &NewComment {
            author_id: "user-1".to_string(),
            manga_id: manga.id,
            content: "Look at this panel".to_string(),
            page_id: Some(page.id),
            parent_id: None,
        },
    )
    .unwrap();
    assert!(parent.is_page_comment);

    let reply = comments::create_comment(
        &db,
        &NewComment {
            author_id: "user-2".to_string(),
            manga_id: manga.id,
            content: "Agreed".to_string(),
            page_id: None,
            parent_id: Some(parent.id),
        },
    )
    .unwrap();

    // The reply inherits the parent's page target
    assert_eq!(reply.page_id, Some(page.id));
    assert!(reply.is_page_comment);

    // The parent is now marked as having replies
    let parent = db.get_comment(parent.id).unwrap().unwrap();
    assert!(parent.is_parent);
}

#[test]
fn comments_page_must_belong_to_manga() {
    let db = test_db();
    create_user(&db, "user-1", "alice");
    let manga = create_manga(&db, "Here");
    let other = create_manga(&db, "Elsewhere");
    let chapter_id = create_chapter(&db, other.id, "1");
    let foreign_page = db.create_page(chapter_id, 1, "p1.jpg").unwrap();

    let result = comments::create_comment(
        &db,
        &NewComment {
            author_id: "user-1".to_string(),
            manga_id: manga.id,
            content: "Wrong page".to_string(),
            page_id: Some(foreign_page.id),
            parent_id: None,
        },
    );

    assert!(matches!(
        result,
        Err(AppError::Validation { field: "page", .. })
    ));
}

#[test]
fn comments_top_level_excludes_replies_not_parents() {
    let db = test_db();
    create_user(&db, "user-1", "alice");
    create_user(&db, "user-2", "bob");
    let manga = create_manga(&db, "Threaded");

    let parent = comments::create_comment(
        &db,
        &NewComment {
            author_id: "user-1".to_string(),
            manga_id: manga.id,
            content: "Root".to_string(),
            page_id: None,
            parent_id: None,
        },
    )
    .unwrap();

    comments::create_comment(
        &db,
        &NewComment {
            author_id: "user-2".to_string(),
            manga_id: manga.id,
            content: "Reply".to_string(),
            page_id: None,
            parent_id: Some(parent.id),
        },
    )
    .unwrap();

    // The commented-on root stays in the top-level listing; the reply
    // itself is excluded
    let top = db
        .top_level_comments(Some(&manga.slug), None, None)
        .unwrap();
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].id, parent.id);
}

#[test]
fn comments_tree_resolves_nested_replies() {
    let db = test_db();
    create_user(&db, "user-1", "alice");
    let manga = create_manga(&db, "Deep Thread");

    let root = comments::create_comment(
        &db,
        &NewComment {
            author_id: "user-1".to_string(),
            manga_id: manga.id,
            content: "Root".to_string(),
            page_id: None,
            parent_id: None,
        },
    )
    .unwrap();

    let child = comments::create_comment(
        &db,
        &NewComment {
            author_id: "user-1".to_string(),
            manga_id: manga.id,
            content: "Child".to_string(),
            page_id: None,
            parent_id: Some(root.id),
        },
    )
    .unwrap();

    comments::create_comment(
        &db,
        &NewComment {
            author_id: "user-1".to_string(),
            manga_id: manga.id,
            content: "Grandchild".to_string(),
            page_id: None,
            parent_id: Some(child.id),
        },
    )
    .unwrap();

    let root = db.get_comment(root.id).unwrap().unwrap();
    let tree = comments::comment_tree(&db, &root).unwrap();
    assert_eq!(tree.author, "alice");
    assert_eq!(tree.replies.len(), 1);
    assert_eq!(tree.replies[0].content, "Child");
    assert_eq!(tree.replies[0].replies.len(), 1);
    assert_eq!(tree.replies[0].replies[0].content, "Grandchild");
}

#[test]
fn comments_delete_cascades_to_replies() {
    let db = test_db();
    create_user(&db, "user-1", "alice");
    let manga = create_manga(&db, "Gone");

    let root = comments::create_comment(
        &db,
        &NewComment {
            author_id: "user-1".to_string(),
            manga_id: manga.id,
            content: "Root".to_string(),
            page_id: None,
            parent_id: None,
        },
    )
    .unwrap();

    let reply = comments::create_comment(
        &db,
        &NewComment {
            author_id: "user-1".to_string(),
            manga_id: manga.id,
            content: "Reply".to_string(),
            page_id: None,
            parent_id: Some(root.id),
        },
    )
    .unwrap();

    assert!(db.delete_comment(root.id).unwrap());
    assert!(db.get_comment(reply.id).unwrap().is_none());
}

#[test]
fn comments_page_filter_listing() {
    let db = test_db();
    create_user(&db, "user-1", "alice");
    let manga = create_manga(&db, "Split Discussion");
    let chapter_id = create_chapter(&db, manga.id, "4");
    let page = db.create_page(chapter_id, 2, "p2.jpg").unwrap();

    comments::create_comment(
        &db,
        &NewComment {
            author_id: "user-1".to_string(),
            manga_id: manga.id,
            content: "About the manga".to_string(),
            page_id: None,
            parent_id: None,
        },
    )
    .unwrap();

    comments::create_comment(
        &db,
        &NewComment {
            author_id: "user-1".to_string(),
            manga_id: manga.id,
            content: "About the page".to_string(),
            page_id: Some(page.id),
            parent_id: None,
        },
    )
    .unwrap();

    // Slug alone lists manga comments, hiding page comments
    let manga_level = db
        .top_level_comments(Some(&manga.slug), None, None)
        .unwrap();
    assert_eq!(manga_level.len(), 1);
    assert_eq!(manga_level[0].content, "About the manga");

    // Slug + chapter + page narrows to that page
    let page_level = db
        .top_level_comments(Some(&manga.slug), Some("4"), Some(2))
        .unwrap();
    assert_eq!(page_level.len(), 1);
    assert_eq!(page_level[0].content, "About the page");
}

#[test]
fn votes_toggle_state_machine() {
    let db = test_db();
    create_user(&db, "user-1", "alice");
    let manga = create_manga(&db, "Voted");

    let comment = comments::create_comment(
        &db,
        &NewComment {
            author_id: "user-1".to_string(),
            manga_id: manga.id,
            content: "Hot take".to_string(),
            page_id: None,
            parent_id: None,
        },
    )
    .unwrap();

    // Fresh cast adds
    let outcome = comments::cast_vote(&db, "user-1", comment.id, 1).unwrap();
    assert_eq!(outcome, VoteOutcome::Added);
    assert_eq!(db.comment_score(comment.id).unwrap(), 1);

    // Same value again removes
    let outcome = comments::cast_vote(&db, "user-1", comment.id, 1).unwrap();
    assert_eq!(outcome, VoteOutcome::Removed);
    assert_eq!(db.comment_score(comment.id).unwrap(), 0);

    // Add, then opposite value flips
    comments::cast_vote(&db, "user-1", comment.id, 1).unwrap();
    let outcome = comments::cast_vote(&db, "user-1", comment.id, -1).unwrap();
    assert_eq!(outcome, VoteOutcome::Updated);
    assert_eq!(db.comment_score(comment.id).unwrap(), -1);
}

#[test]
fn votes_score_sums_across_users() {
    let db = test_db();
    create_user(&db, "user-1", "alice");
    create_user(&db, "user-2", "bob");
    create_user(&db, "user-3", "carol");
    let manga = create_manga(&db, "Controversial");

    let comment = comments::create_comment(
        &db,
        &NewComment {
            author_id: "user-1".to_string(),
            manga_id: manga.id,
            content: "Divisive".to_string(),
            page_id: None,
            parent_id: None,
        },
    )
    .unwrap();

    comments::cast_vote(&db, "user-1", comment.id, -1).unwrap();
    comments::cast_vote(&db, "user-2", comment.id, -1).unwrap();
    comments::cast_vote(&db, "user-3", comment.id, 1).unwrap();

    assert_eq!(db.comment_score(comment.id).unwrap(), -1);
}

#[test]
fn votes_invalid_value_rejected() {
    let db = test_db();
    create_user(&db, "user-1", "alice");
    let manga = create_manga(&db, "Strict");

    let comment = comments::create_comment(
        &db,
        &NewComment {
            author_id: "user-1".to_string(),
            manga_id: manga.id,
            content: "Rules".to_string(),
            page_id: None,
            parent_id: None,
        },
    )
    .unwrap();

    assert!(matches!(
        comments::cast_vote(&db, "user-1", comment.id, 5),
        Err(AppError::Validation { field: "vote", .. })
    ));
}

#[test]
fn votes_missing_comment_not_found() {
    let db = test_db();
    create_user(&db, "user-1", "alice");

    assert!(matches!(
        comments::cast_vote(&db, "user-1", 999, 1),
        Err(AppError::NotFound(_))
    ));
}

#[test]
fn catalog_rating_filter_includes_unrated_at_zero_bound() {
    let db = test_db();
    create_user(&db, "user-1", "alice");
    let rated = create_manga(&db, "Rated Title");
    create_manga(&db, "Unrated Title");

    db.create_rating("user-1", rated.id, 7).unwrap();

    let rows = db.catalog_rows().unwrap();

    let open = MangaFilter {
        rating_min: Some(0.0),
        rating_max: Some(10.0),
        ..Default::default()
    };
    let both: Vec<_> = rows.iter().filter(|r| open.matches(r)).collect();
    assert_eq!(both.len(), 2);

    let strict = MangaFilter {
        rating_min: Some(5.0),
        rating_max: Some(10.0),
        ..Default::default()
    };
    let only_rated: Vec<_> = rows.iter().filter(|r| strict.matches(r)).collect();
    assert_eq!(only_rated.len(), 1);
    assert_eq!(only_rated[0].manga.id, rated.id);
}

#[test]
fn catalog_combined_filters() {
    let db = test_db();
    let hit = create_manga(&db, "Hit");
    let miss = create_manga(&db, "Miss");

    let action = db.get_or_create_genre("Action").unwrap();
    let romance = db.get_or_create_genre("Romance").unwrap();
    db.set_manga_genres(hit.id, &[action]).unwrap();
    db.set_manga_genres(miss.id, &[romance]).unwrap();

    let volume = db.create_volume(hit.id, 1).unwrap();
    db.create_chapter(volume.id, "1", None).unwrap();
    db.create_chapter(volume.id, "2", None).unwrap();

    let filter = MangaFilter {
        chapters_min: Some(1),
        genres: vec![action],
        status: Some(MangaStatus::Ongoing),
        ..Default::default()
    };

    let rows = db.catalog_rows().unwrap();
    let matched: Vec<_> = rows.iter().filter(|r| filter.matches(r)).collect();
    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0].manga.id, hit.id);
}

#[test]
fn catalog_search_is_case_insensitive() {
    let db = test_db();
    create_manga(&db, "Attack on Titan");
    create_manga(&db, "Blue Lock");

    let rows = db.catalog_rows().unwrap();
    let hits: Vec<_> = rows
        .iter()
        .filter(|r| catalog::search_matches(r, "TITAN"))
        .collect();
    assert_eq!(hits.len(), 1);

    // Subtitle matches too
    let sub_hits: Vec<_> = rows
        .iter()
        .filter(|r| catalog::search_matches(r, "lock original"))
        .collect();
    assert_eq!(sub_hits.len(), 1);
}

#[test]
fn catalog_sort_by_view_count() {
    let db = test_db();
    let low = create_manga(&db, "Low Views");
    let high = create_manga(&db, "High Views");

    for _ in 0..5 {
        db.bump_view_count(high.id).unwrap();
    }
    db.bump_view_count(low.id).unwrap();

    let mut rows = db.catalog_rows().unwrap();
    let (key, dir) = SortKey::parse("-view_count").unwrap();
    assert_eq!(key, SortKey::ViewCount);
    assert_eq!(dir, SortDir::Desc);

    catalog::sort_rows(&mut rows, key, dir);
    assert_eq!(rows[0].manga.id, high.id);
}

#[test]
fn catalog_sort_unrated_below_rated() {
    let db = test_db();
    create_user(&db, "user-1", "alice");
    let rated = create_manga(&db, "Rated");
    let unrated = create_manga(&db, "Unrated");

    db.create_rating("user-1", rated.id, 3).unwrap();

    let mut rows = db.catalog_rows().unwrap();
    catalog::sort_rows(&mut rows, SortKey::Rating, SortDir::Desc);
    assert_eq!(rows[0].manga.id, rated.id);
    assert_eq!(rows[1].manga.id, unrated.id);
}

#[test]
fn catalog_pagination() {
    let paged = catalog::paginate((1..=25).collect::<Vec<i64>>(), 2, 10);
    assert_eq!(paged.results, (11..=20).collect::<Vec<i64>>());
    assert_eq!(paged.total, 25);
    assert_eq!(paged.page, 2);
    assert_eq!(paged.total_pages, 3);

    let past_end = catalog::paginate((1..=25).collect::<Vec<i64>>(), 9, 10);
    assert!(past_end.results.is_empty());
    assert_eq!(past_end.total_pages, 3);

    let empty = catalog::paginate(Vec::<i64>::new(), 1, 10);
    assert!(empty.results.is_empty());
    assert_eq!(empty.total_pages, 0);
}

#[test]
fn catalog_popular_and_newest_limits() {
    let db = test_db();
    for i in 0..12 {
        let manga = create_manga(&db, &format!("Title {}", i));
        for _ in 0..i {
            db.bump_view_count(manga.id).unwrap();
        }
    }

    let rows = db.catalog_rows().unwrap();

    let popular = catalog::popular(rows.clone(), 10);
    assert_eq!(popular.len(), 10);
    assert_eq!(popular[0].manga.title, "Title 11");
    assert!(popular[0].manga.view_count >= popular[9].manga.view_count);

    let newest = catalog::newest(rows.clone(), 10);
    assert_eq!(newest.len(), 10);

    let with_chapters = catalog::popular_with_latest(rows, 6);
    assert_eq!(with_chapters.len(), 6);
    assert_eq!(with_chapters[0].manga.title, "Title 11");
}

#[test]
fn catalog_unknown_ordering_ignored() {
    assert!(SortKey::parse("nonsense").is_none());
    assert!(SortKey::parse("-created_at").is_some());
}

#[test]
fn db_open_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("catalog.db");

    let db = Database::open(&path).unwrap();
    create_user(&db, "user-1", "alice");
    assert!(path.exists());

    // Re-opening sees the same data
    drop(db);
    let db = Database::open(&path).unwrap();
    assert!(db.get_user("user-1").unwrap().is_some());
}

#[test]
fn config_parse_toml() {
    let toml = r#"
[server]
bind = "127.0.0.1:9090"
title = "Test Catalog"

[database]
path = "/tmp/test.db"

[catalog]
page_size = 5
"#;
    let config: Config = toml::from_str(toml).unwrap();
    assert_eq!(config.server.bind.port(), 9090);
    assert_eq!(config.server.title, "Test Catalog");
    assert_eq!(config.catalog.page_size, 5);
}

#[test]
fn config_default_values() {
    let config = Config::default();
    assert_eq!(config.server.bind.port(), 8080);
    assert_eq!(config.catalog.page_size, 20);
    assert_eq!(config.server.title, "Manga Library");
}
