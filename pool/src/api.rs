/// HTTP surface: Prometheus scrape plus a small JSON status.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;

use crate::metrics::prometheus as metrics;
use crate::stratum::SessionRegistry;
use crate::work::WorkSource;

#[derive(Clone)]
pub struct ApiState {
    pub registry: Arc<SessionRegistry>,
    pub work: Arc<dyn WorkSource>,
    pub started: Instant,
    pub listen: String,
}

async fn api_health(State(state): State<ApiState>) -> Json<Value> {
    Json(json!({"status": "ok", "sick": state.work.is_sick()}))
}

async fn api_metrics() -> impl IntoResponse {
    let body = metrics::render();
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

async fn api_stats(State(state): State<ApiState>) -> Json<Value> {
    let template = state.work.current_block_template();
    Json(json!({
        "stratum": state.listen,
        "uptime_secs": state.started.elapsed().as_secs(),
        "sessions": state.registry.len().await,
        "authorized": state.registry.authorized_count().await,
        "template": template.as_ref().map(|t| json!({
            "height": t.height,
            "job_id": t.last_job_id,
            "prev_hash": t.prev_hash,
        })),
        "sick": state.work.is_sick(),
        "shares_accepted": metrics::accepted_total(),
    }))
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(api_health))
        .route("/metrics", get(api_metrics))
        .route("/stats", get(api_stats))
        .with_state(state)
}
