use super::{handlers, state::AppState};
use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

/// Creates the Axum router with all the application routes.
pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/tags", get(handlers::tags_handler))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
}
