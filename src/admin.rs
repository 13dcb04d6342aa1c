//! The admin HTTP adapter: a thin surface over the VQ engine and the
//! session registry. Every handler here is a direct call into one of
//! those two components — no business logic lives in this module.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{delete, get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::agent::AgentCache;
use crate::metrics::Metrics;
use crate::session::SessionRegistry;
use crate::snapshot::VqSummary;
use crate::types::{AgentId, AgentState, Department};
use crate::vq::VqEngine;

#[derive(Clone)]
struct AdminState {
    vq: Arc<VqEngine>,
    registry: Arc<SessionRegistry>,
    cache: Arc<AgentCache>,
    metrics: Arc<Metrics>,
}

pub fn router(
    vq: Arc<VqEngine>,
    registry: Arc<SessionRegistry>,
    cache: Arc<AgentCache>,
    metrics: Arc<Metrics>,
) -> Router {
    let state = AdminState { vq, registry, cache, metrics };
    Router::new()
        .route("/internal/call/enqueue", post(enqueue_call))
        .route("/internal/calls/all", delete(wipe_all_calls))
        .route("/internal/calls/stats", get(call_stats))
        .route("/internal/call/:id/abandon", post(abandon_call))
        .route("/internal/agent/:id/force-disconnect", post(force_disconnect))
        .route("/internal/call/:id/force-end", post(force_end_call))
        .with_state(state)
}

#[derive(Deserialize)]
struct EnqueueRequest {
    vq: String,
    #[serde(rename = "call-id", alias = "call_id", default)]
    call_id: Option<String>,
}

async fn enqueue_call(
    State(state): State<AdminState>,
    Json(req): Json<EnqueueRequest>,
) -> impl IntoResponse {
    match state.vq.enqueue(&req.vq, req.call_id) {
        Ok(call) => (
            StatusCode::OK,
            Json(json!({ "call-id": call.call_id, "vq": call.vq, "status": "waiting" })),
        )
            .into_response(),
        Err(e) => (StatusCode::NOT_FOUND, Json(json!({ "error": e.to_string() }))).into_response(),
    }
}

async fn wipe_all_calls(State(state): State<AdminState>) -> impl IntoResponse {
    let cleared = state.vq.wipe_all();
    Json(json!({ "cleared": cleared }))
}

#[derive(Serialize)]
struct VqStatsResponse {
    queues: Vec<VqSummary>,
}

async fn call_stats(State(state): State<AdminState>) -> impl IntoResponse {
    let vq_snapshots = state.vq.snapshot();
    let available_by_dept: std::collections::HashMap<Department, usize> = Department::ALL
        .iter()
        .map(|&d| {
            let n = state
                .cache
                .connected_by_department(d)
                .iter()
                .filter(|(_, r)| r.state == AgentState::Available)
                .count();
            (d, n)
        })
        .collect();
    let queues = vq_snapshots
        .iter()
        .map(|q| VqSummary::from_vq(q, available_by_dept.get(&q.department).copied().unwrap_or(0)))
        .collect();
    Json(VqStatsResponse { queues })
}

/// Thin surface over the VQ engine's `Abandon(call-id)`, otherwise
/// unreachable from outside the core.
async fn abandon_call(State(state): State<AdminState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.vq.abandon(&id) {
        Ok(call) => {
            Metrics::inc(&state.metrics.calls_abandoned_total);
            (StatusCode::OK, Json(json!({ "call-id": call.call_id, "status": "abandoned" }))).into_response()
        }
        Err(e) => (StatusCode::NOT_FOUND, Json(json!({ "error": e.to_string() }))).into_response(),
    }
}

async fn force_disconnect(State(state): State<AdminState>, Path(id): Path<String>) -> impl IntoResponse {
    let agent_id = AgentId::from(id);
    let closed = state.registry.force_disconnect(&agent_id, &state.metrics);
    (StatusCode::OK, Json(json!({ "agent-id": agent_id.as_str(), "disconnected": closed })))
}

async fn force_end_call(State(state): State<AdminState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.vq.force_end(&id) {
        Ok(call) => {
            if let Some(agent_id) = &call.agent_id {
                state.registry.force_end_call(agent_id, call.call_id.clone(), &state.metrics);
            }
            (StatusCode::OK, Json(json!({ "call-id": call.call_id, "status": "completed" }))).into_response()
        }
        Err(e) => (StatusCode::NOT_FOUND, Json(json!({ "error": e.to_string() }))).into_response(),
    }
}
