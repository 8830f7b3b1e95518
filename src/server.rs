//! HTTP server and routes.

mod handlers;
mod state;

pub use state::AppState;

use axum::{
    Router,
    routing::{delete, get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let manga_routes = Router::new()
        .route("/", get(handlers::manga_list))
        .route("/", post(handlers::manga_create))
        .route("/popular", get(handlers::popular_manga))
        .route("/new", get(handlers::new_manga))
        .route("/popular-chapters", get(handlers::popular_manga_chapters))
        .route("/{slug}", get(handlers::manga_detail))
        .route("/{slug}", put(handlers::manga_update))
        .route("/{slug}", delete(handlers::manga_delete))
        .route("/{slug}/chapters", get(handlers::manga_chapters))
        .route("/{slug}/short-info", get(handlers::manga_short_info))
        .route("/{slug}/shelf", put(handlers::shelf_set))
        .route("/{slug}/shelf/{shelf}", delete(handlers::shelf_remove));

    let chapter_routes = Router::new()
        .route("/", get(handlers::chapter_list))
        .route("/latest", get(handlers::chapter_latest))
        .route("/{id}", get(handlers::chapter_detail))
        .route("/{id}/pages", get(handlers::chapter_pages));

    let comment_routes = Router::new()
        .route("/", get(handlers::comment_list))
        .route("/", post(handlers::comment_create))
        .route("/{id}", put(handlers::comment_update))
        .route("/{id}", delete(handlers::comment_delete))
        .route("/{id}/vote", post(handlers::comment_vote));

    let rating_routes = Router::new()
        .route("/", post(handlers::rating_create))
        .route("/{id}", put(handlers::rating_update))
        .route("/{id}", delete(handlers::rating_delete))
        .route("/user/{manga_id}", get(handlers::user_rating));

    let api_routes = Router::new()
        .route("/genres", get(handlers::genre_list))
        .route("/tags", get(handlers::tag_list))
        .route("/types", get(handlers::manga_types))
        .route("/lists", get(handlers::my_lists))
        .route("/stats", get(handlers::api_stats));

    Router::new()
        .route("/", get(handlers::index))
        .nest("/api/manga", manga_routes)
        .nest("/api/chapters", chapter_routes)
        .nest("/api/comments", comment_routes)
        .nest("/api/ratings", rating_routes)
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
