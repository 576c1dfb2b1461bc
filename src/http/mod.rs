use axum::Router;

use crate::AppState;

mod client;
mod error;
mod handlers;
mod routes;

pub use client::Client;
pub use error::AppError;

pub fn router(state: AppState) -> Router {
    let upload_max_bytes = state.upload_max_bytes;
    Router::new()
        .merge(routes::health())
        .merge(routes::listings(upload_max_bytes))
        .merge(routes::comments())
        .merge(routes::map())
        .merge(routes::preferences())
        .merge(routes::toasts())
        .with_state(state)
}
