//! HTTP router assembly.

use axum::{Json, Router, routing::get};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::auth::{self, AppState};

/// Builds the API router with authentication applied to every route.
pub fn router(state: Arc<AppState>) -> Router {
    let routes = Router::new()
        .route("/api/v0/status", get(status))
        .route("/api/v0/version", get(version))
        .route("/api/v0/auth", get(auth::login))
        .route("/api/v0/auth/callback", get(auth::callback))
        .route("/api/v0/auth/logout", get(auth::logout))
        .route("/api/v0/auth/me", get(auth::me));

    auth::authenticated(routes, state.clone())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Liveness probe.
async fn status() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn version() -> Json<Value> {
    Json(json!({ "version": env!("CARGO_PKG_VERSION") }))
}
