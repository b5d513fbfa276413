use crate::metrics::Metrics;
use crate::state::{CycleSummary, State as RelayState};
use axum::body::Body;
use axum::extract::State;
use axum::http::{header::CONTENT_TYPE, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Json, Router};
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};
use tokio::sync::RwLock;

#[derive(Clone)]
pub struct HttpAppState {
    pub metrics: Arc<Metrics>,
    pub state: Arc<RwLock<RelayState>>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ApiState {
    pub started_at: String,
    pub cycles_completed: u64,
    pub cycles_failed: u64,
    pub last_cycle_finished_at: Option<String>,
    pub last_cycle: Option<CycleSummary>,
}

impl From<&RelayState> for ApiState {
    fn from(value: &RelayState) -> Self {
        Self {
            started_at: rfc3339(value.started_at_unix),
            cycles_completed: value.cycles_completed,
            cycles_failed: value.cycles_failed,
            last_cycle_finished_at: value
                .last_cycle
                .as_ref()
                .map(|c| rfc3339(c.finished_at_unix)),
            last_cycle: value.last_cycle.clone(),
        }
    }
}

fn rfc3339(unix: i64) -> String {
    let st = UNIX_EPOCH + Duration::from_secs(unix.max(0) as u64);
    humantime::format_rfc3339_seconds(st).to_string()
}

pub fn build_router(metrics: Arc<Metrics>, state: Arc<RwLock<RelayState>>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_handler))
        .route("/api/state", get(state_handler))
        .with_state(HttpAppState { metrics, state })
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn metrics_handler(State(state): State<HttpAppState>) -> Response {
    state.metrics.inc_scrape_count();
    {
        let guard = state.state.read().await;
        state.metrics.update_from_state(&guard);
    }
    match state.metrics.encode_metrics() {
        Ok(encoded) => {
            let mut response = Response::new(Body::from(encoded));
            response.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            response
        }
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to encode metrics: {err}"),
        )
            .into_response(),
    }
}

async fn state_handler(State(state): State<HttpAppState>) -> impl IntoResponse {
    let guard = state.state.read().await;
    Json(ApiState::from(&*guard))
}
