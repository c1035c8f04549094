pub mod assets;
pub mod auth;
pub mod dashboard;
pub mod export;
pub mod home;
pub mod measurements;
pub mod photos;

use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// The full application router.
pub fn router(state: AppState) -> Router {
    let body_limit = state.config.storage.max_upload_bytes;

    Router::new()
        .route("/", get(home::index))
        .route("/assets/{*path}", get(assets::serve))
        .route("/photos/{name}", get(photos::serve))
        .route("/export", get(export::download))
        .merge(auth::router())
        .merge(measurements::router())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
