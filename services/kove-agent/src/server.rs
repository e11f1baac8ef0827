//! HTTP surface

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use kove_core::endpoints;
use kove_metrics::{Registry, ViolationMetrics};
use kove_reconciler::TaskGroup;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::limit::ConcurrencyLimitLayer;
use tracing::instrument;

/// Prometheus text exposition format.
pub const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Bound on concurrently served scrapes.
const MAX_CONCURRENT_REQUESTS: usize = 64;

#[derive(Clone)]
pub struct AgentState {
    registry: Arc<Registry>,
    tasks: TaskGroup,
    watched_kinds: usize,
}

impl AgentState {
    pub fn new(metrics: &ViolationMetrics, tasks: TaskGroup, watched_kinds: usize) -> Self {
        Self {
            registry: Arc::new(metrics.registry()),
            tasks,
            watched_kinds,
        }
    }
}

pub fn router(state: AgentState) -> Router {
    Router::new()
        .route(endpoints::HEALTHZ, get(healthz))
        .route(endpoints::METRICS, get(metrics))
        .layer(ConcurrencyLimitLayer::new(MAX_CONCURRENT_REQUESTS))
        .with_state(state)
}

#[instrument(skip(state))]
async fn healthz(State(state): State<AgentState>) -> Result<Json<Value>, StatusCode> {
    Ok(Json(json!({
        "status": "healthy",
        "service": "kove-agent",
        "version": kove_core::VERSION,
        "watched_kinds": state.watched_kinds,
        "outstanding_evaluations": state.tasks.outstanding(),
    })))
}

async fn metrics(State(state): State<AgentState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)],
        state.registry.render(),
    )
}
