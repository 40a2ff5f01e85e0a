//! API layer -- axum routes, handlers, and middleware.

mod error;
mod routes;
pub mod state;
pub mod types;

use self::state::AppState;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the application router with all API routes.
///
/// CORS is wide open: the expected callers are local presentation clients
/// and tooling, and the API carries no credentials.
pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api", routes::api_routes())
        .fallback(fallback)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn fallback() -> (axum::http::StatusCode, &'static str) {
    (axum::http::StatusCode::NOT_FOUND, "not found")
}
