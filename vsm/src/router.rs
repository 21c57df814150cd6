//! HTTP router for VSM

use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use vsm_secrets::{handlers, SecretManager, SecretsState};

/// Create the main application router
pub fn create_router(manager: Arc<SecretManager>) -> Router {
    let state = Arc::new(SecretsState::new(manager));

    Router::new()
        .route("/health", get(health_check))
        .route("/secrets", post(handlers::handle_create_secret))
        .route(
            "/secrets/:id",
            get(handlers::handle_get_secret).delete(handlers::handle_delete_secret),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "application/json")],
        r#"{"status": "running"}"#,
    )
}
