use axum::routing::{delete, get, post};
use axum::Router;

use crate::http::handlers;
use crate::AppState;

pub fn health() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health))
}

pub fn listings(upload_max_bytes: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/listings",
            get(handlers::list_listings)
                .post(handlers::submit_listing)
                .layer(handlers::upload_body_limit(upload_max_bytes)),
        )
        .route("/listings/reload", post(handlers::reload_listings))
        .route("/listings/stream", get(handlers::listings_stream))
        .route("/listings/:id", get(handlers::get_listing))
        .route("/listings/:id/ratings", post(handlers::rate_listing))
        .route("/listings/:id/vote", post(handlers::vote_listing))
}

pub fn comments() -> Router<AppState> {
    Router::new()
        .route(
            "/listings/:id/comments",
            get(handlers::list_comments).post(handlers::post_comment),
        )
        .route("/listings/:id/comments/stream", get(handlers::comments_stream))
}

pub fn map() -> Router<AppState> {
    Router::new().route("/map/markers", get(handlers::map_markers))
}

pub fn preferences() -> Router<AppState> {
    Router::new()
        .route("/i18n/:lang", get(handlers::translations))
        .route(
            "/preferences",
            get(handlers::get_preferences).put(handlers::update_preferences),
        )
}

pub fn toasts() -> Router<AppState> {
    Router::new()
        .route("/toasts", get(handlers::list_toasts))
        .route("/toasts/:id", delete(handlers::dismiss_toast))
}
