use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::handlers;
use super::AppState;
use crate::middleware::{make_span_with_request_id, request_id_middleware};

/// Creates the application router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/api/v1", api_routes())
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(request_id_middleware))
                .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// API routes under /api/v1
fn api_routes() -> Router<AppState> {
    Router::new()
        // Sessions
        .route("/sessions", post(handlers::create_session))
        .route("/sessions/rehydrate", post(handlers::rehydrate_session))
        .route(
            "/sessions/:id",
            get(handlers::get_session).delete(handlers::delete_session),
        )
        .route("/sessions/:id/answer", post(handlers::answer))
        .route("/sessions/:id/free-text", post(handlers::free_text))
        .route("/sessions/:id/undo", post(handlers::undo))
        .route("/sessions/:id/finish", post(handlers::finish))
        // Shared results
        .route("/shares", post(handlers::create_share))
        .route("/shares/:id", get(handlers::get_share))
        // Feedback on recommendations
        .route("/ratings", post(handlers::submit_rating))
        .route("/flags", post(handlers::submit_flag))
}
