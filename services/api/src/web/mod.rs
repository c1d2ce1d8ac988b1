pub mod live_task;
pub mod middleware;
pub mod protocol;
pub mod rest;
pub mod state;
pub mod ws_handler;

use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use state::AppState;
use std::sync::Arc;
use tower_http::services::ServeDir;

// Re-export the handlers so the binary and tests can build the router.
pub use middleware::require_user;
pub use rest::{
    change_language_handler, create_space_handler, delete_space_handler, generate_handler,
    get_profile_handler, get_space_handler, list_spaces_handler, save_profile_handler,
};
pub use ws_handler::ws_handler;

/// Builds the API routes. Everything except `/files` requires a user id.
pub fn router(app_state: Arc<AppState>) -> Router {
    let protected_routes = Router::new()
        .route("/spaces", get(list_spaces_handler).post(create_space_handler))
        .route("/spaces/{id}", get(get_space_handler).delete(delete_space_handler))
        .route("/spaces/{id}/generate/{kind}", post(generate_handler))
        .route("/spaces/{id}/language", put(change_language_handler))
        .route("/profile", get(get_profile_handler).put(save_profile_handler))
        .route("/ws", get(ws_handler))
        .layer(axum_middleware::from_fn(require_user));

    Router::new()
        .merge(protected_routes)
        .nest_service("/files", ServeDir::new(&app_state.config.storage_root))
        // Leave room for the multipart framing around a maximum-size upload.
        .layer(DefaultBodyLimit::max(app_state.config.max_upload_bytes + 64 * 1024))
        .with_state(app_state)
}
