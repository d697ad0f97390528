//! API route definitions

use axum::routing::get;
use axum::Router;

use super::handlers;
use super::server::AppState;

/// Create the router with all routes
///
/// `GET /proxy` also answers `HEAD`; `OPTIONS` preflights are answered by
/// the CORS layer.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route(
            "/proxy",
            get(handlers::proxy::proxy)
                .post(handlers::proxy::proxy)
                .put(handlers::proxy::proxy)
                .patch(handlers::proxy::proxy)
                .delete(handlers::proxy::proxy),
        )
        .with_state(state)
}
