use crate::inbound;
use crate::state::AppState;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};

/// Webhook ingress and health routes. CRUD, auth and the UI live in a
/// separate deployment and are not part of this surface.
pub fn build_http_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(health))
        .route(
            "/api/v1/inbound/prometheus",
            post(inbound::prometheus::inbound_prometheus),
        )
        .route(
            "/api/v1/inbound/victoriametrics",
            post(inbound::prometheus::inbound_victoriametrics),
        )
        .route(
            "/api/v1/inbound/elasticsearch",
            post(inbound::generic::inbound_elasticsearch),
        )
        .route("/api/v1/inbound/doris", post(inbound::generic::inbound_doris))
        .with_state(state)
        .layer(cors)
}

async fn health() -> Json<Value> {
    Json(json!({"ok": true}))
}
