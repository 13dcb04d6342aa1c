//! Top-level wiring: the axum `Router`, the WebSocket upgrade handlers
//! for both agent endpoints and the dashboard endpoint, and the
//! background tasks (message processor, stale sweep, routing +
//! aggregation ticker) that run for the lifetime of the process.

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tracing::{debug, info, warn};

use crate::agent::AgentCache;
use crate::config::MontiConfig;
use crate::dashboard::{run_dashboard_session, DashboardHub};
use crate::identity::extract_claims;
use crate::metrics::Metrics;
use crate::persistence::PersistenceSink;
use crate::processor::{MessageProcessor, ProcessorHandle};
use crate::session::{run_agent_session, SessionRegistry};
use crate::snapshot::SnapshotAggregator;
use crate::admin;
use crate::vq::VqEngine;

/// Every shared component the live process needs a handle to. Cloned
/// cheaply (every field is an `Arc`) into each connection task.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<MontiConfig>,
    pub cache: Arc<AgentCache>,
    pub vq: Arc<VqEngine>,
    pub registry: Arc<SessionRegistry>,
    pub dashboard: Arc<DashboardHub>,
    pub metrics: Arc<Metrics>,
    pub processor_handle: ProcessorHandle,
}

impl AppState {
    /// Builds every shared component and spawns the message processor.
    /// The routing/aggregation ticker and the stale sweep are started
    /// separately via [`spawn_background_tasks`] once the caller has a
    /// fully formed `AppState` (and, in tests, a chance to swap in a
    /// different persistence sink first).
    pub fn bootstrap(config: MontiConfig, persistence: Arc<dyn PersistenceSink>) -> Self {
        let metrics = Arc::new(Metrics::new());
        let cache = Arc::new(AgentCache::new(&config.general));
        let vq = Arc::new(VqEngine::new(&config.routing));
        let registry = Arc::new(SessionRegistry::new());
        let dashboard = Arc::new(DashboardHub::new(
            metrics.clone(),
            config.dashboard.history_capacity,
            config.dashboard.outbound_capacity,
        ));

        let (processor, processor_handle) = MessageProcessor::new(
            cache.clone(),
            vq.clone(),
            persistence,
            metrics.clone(),
            &config.queue,
        );
        tokio::spawn(processor.run());

        Self {
            config: Arc::new(config),
            cache,
            vq,
            registry,
            dashboard,
            metrics,
            processor_handle,
        }
    }
}

/// Starts the stale-sweep timer and the combined routing/aggregation
/// ticker. Both run for the lifetime of the process.
pub fn spawn_background_tasks(state: AppState) {
    tokio::spawn(stale_sweep_loop(state.clone()));
    tokio::spawn(tick_loop(state));
}

async fn stale_sweep_loop(state: AppState) {
    let mut interval = tokio::time::interval(state.config.general.stale_sweep_period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        let swept = state.cache.sweep_stale();
        if swept > 0 {
            debug!(swept, "stale sweep transitioned agents");
        }
    }
}

/// The shared 1 Hz ticker: routing, then aggregation. A tick that
/// overruns its budget is skipped, never coalesced — `Skip` is exactly
/// that policy.
async fn tick_loop(state: AppState) {
    let aggregator = SnapshotAggregator::new(
        state.cache.clone(),
        state.vq.clone(),
        state.dashboard.clone(),
        state.metrics.clone(),
        &state.config.dashboard,
    );
    let mut interval = tokio::time::interval(state.config.routing.tick_period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        interval.tick().await;

        let assignments = state.vq.route_tick(&state.cache);
        for assignment in assignments {
            if !state.registry.dispatch_call_assign(&assignment, &state.metrics) {
                warn!(
                    agent_id = %assignment.agent_id,
                    call_id = %assignment.call_id,
                    "routing assignment undeliverable, unwinding"
                );
                Metrics::inc(&state.metrics.routing_unwinds_total);
                state.cache.unmark_assigned(&assignment.agent_id);
                if let Err(e) = state.vq.unwind(&assignment.vq, &assignment.call_id) {
                    warn!(error = %e, "failed to unwind routing assignment");
                }
            }
        }

        aggregator.tick().await;
    }
}

async fn agent_ws_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let processor_handle = state.processor_handle.clone();
    let registry = state.registry.clone();
    let metrics = state.metrics.clone();
    let general = state.config.general.clone();
    ws.on_upgrade(move |socket| {
        run_agent_session(socket, false, registry, processor_handle, metrics, general)
    })
}

async fn agent_multiplexed_ws_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let processor_handle = state.processor_handle.clone();
    let registry = state.registry.clone();
    let metrics = state.metrics.clone();
    let general = state.config.general.clone();
    ws.on_upgrade(move |socket| {
        run_agent_session(socket, true, registry, processor_handle, metrics, general)
    })
}

async fn dashboard_ws_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let claims = extract_claims(&headers);
    let dashboard = state.dashboard.clone();
    ws.on_upgrade(move |socket| run_dashboard_session(socket, claims, dashboard))
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws/agent", get(agent_ws_handler))
        .route("/ws/agent/multiplexed", get(agent_multiplexed_ws_handler))
        .route("/ws/dashboard", get(dashboard_ws_handler))
        .merge(admin::router(
            state.vq.clone(),
            state.registry.clone(),
            state.cache.clone(),
            state.metrics.clone(),
        ))
        .with_state(state)
}

/// Installs logging, builds the app, starts the background tasks and
/// serves forever. A bind failure is a configuration-time fault and is
/// fatal, per the error-handling design.
pub async fn run(config: MontiConfig, persistence: Arc<dyn PersistenceSink>) -> crate::error::Result<()> {
    let bind_addr = config.general.bind_addr.clone();
    let state = AppState::bootstrap(config, persistence);
    spawn_background_tasks(state.clone());
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| crate::error::MontiError::configuration(format!("failed to bind {bind_addr}: {e}")))?;
    info!(%bind_addr, "monti-core listening");
    axum::serve(listener, app)
        .await
        .map_err(|e| crate::error::MontiError::internal(e.to_string()))?;
    Ok(())
}
