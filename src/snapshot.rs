//! The 1 Hz snapshot aggregator.
//!
//! One ticker drives both the VQ engine's routing tick and this
//! aggregation step — they share a cadence but not a lock. Aggregation
//! never blocks on a slow dashboard client: it hands one Snapshot to the
//! dashboard hub and moves on; a tick that overruns its budget is
//! skipped rather than coalesced (`MissedTickBehavior::Skip`).

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::agent::{AgentCache, AgentRecord, Kpis};
use crate::config::DashboardConfig;
use crate::dashboard::hub::DashboardHub;
use crate::metrics::{AgentGauges, Metrics};
use crate::types::{AgentId, AgentState, ConnectionStatus, Department, Location};
use crate::vq::{VqEngine, VqSnapshot};

#[derive(Debug, Clone, Serialize, Default)]
pub struct KpiSnapshot {
    pub total_calls: u64,
    pub avg_call_duration: f64,
    pub avg_handle_time: f64,
    pub acw_count: u64,
    pub acw_time: f64,
    pub hold_count: u64,
    pub hold_time: f64,
    pub transfer_count: u64,
    pub conference_count: u64,
    pub break_time: f64,
    pub login_time: f64,
    pub occupancy: f64,
    pub adherence: f64,
    pub fcr: f64,
    pub csat: f64,
}

impl From<&Kpis> for KpiSnapshot {
    fn from(k: &Kpis) -> Self {
        Self {
            total_calls: k.total_calls,
            avg_call_duration: k.avg_call_duration,
            avg_handle_time: k.avg_handle_time,
            acw_count: k.acw_count,
            acw_time: k.acw_time,
            hold_count: k.hold_count,
            hold_time: k.hold_time,
            transfer_count: k.transfer_count,
            conference_count: k.conference_count,
            break_time: k.break_time,
            login_time: k.login_time,
            occupancy: k.occupancy,
            adherence: k.adherence,
            fcr: k.fcr,
            csat: k.csat,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentSnapshot {
    pub agent_id: String,
    pub location: Location,
    pub team: String,
    pub state: AgentState,
    pub state_duration_secs: f64,
    pub connection_status: ConnectionStatus,
    pub current_call_id: Option<String>,
    pub kpis: KpiSnapshot,
}

#[derive(Debug, Clone, Serialize)]
pub struct SlSnapshot {
    pub target: f64,
    pub threshold_secs: f64,
    pub answered_in_sl: u64,
    pub total_answered: u64,
    pub sl: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct VqSummary {
    pub name: String,
    pub waiting: usize,
    pub active: usize,
    pub completed: u64,
    pub abandoned: u64,
    pub longest_wait_secs: f64,
    pub available_agents: usize,
    pub sl: SlSnapshot,
}

impl VqSummary {
    pub fn from_vq(vq: &VqSnapshot, available_agents: usize) -> Self {
        Self {
            name: vq.name.clone(),
            waiting: vq.waiting,
            active: vq.active,
            completed: vq.completed,
            abandoned: vq.abandoned,
            longest_wait_secs: vq.longest_wait_secs,
            available_agents,
            sl: SlSnapshot {
                target: vq.sl_target,
                threshold_secs: vq.sl_threshold_secs,
                answered_in_sl: vq.answered_in_sl,
                total_answered: vq.total_answered,
                sl: vq.sl,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct DepartmentSummary {
    pub state_breakdown: BTreeMap<AgentState, u32>,
    pub location_breakdown: BTreeMap<Location, u32>,
}

impl DepartmentSummary {
    pub fn from_agents(agents: &[AgentSnapshot]) -> Self {
        let mut summary = Self::default();
        for a in agents {
            *summary.state_breakdown.entry(a.state).or_insert(0) += 1;
            *summary.location_breakdown.entry(a.location).or_insert(0) += 1;
        }
        summary
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DepartmentSnapshot {
    pub agents: Vec<AgentSnapshot>,
    pub queues: Vec<VqSummary>,
    pub summary: DepartmentSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub timestamp: DateTime<Utc>,
    pub departments: BTreeMap<Department, DepartmentSnapshot>,
}

fn agent_snapshot(id: &AgentId, record: &AgentRecord) -> AgentSnapshot {
    AgentSnapshot {
        agent_id: id.to_string(),
        location: record.location,
        team: record.team.clone(),
        state: record.state,
        state_duration_secs: record.state_start.elapsed().as_secs_f64(),
        connection_status: record.connection_status,
        current_call_id: record.current_call_id.clone(),
        kpis: KpiSnapshot::from(&record.kpis),
    }
}

/// Builds one immutable [`Snapshot`] from the cache and VQ engine. Only
/// `connected` agents appear in the per-department lists; stale and
/// disconnected/offline records are excluded by default.
pub fn build_snapshot(
    cache: &crate::agent::AgentCache,
    vq: &VqEngine,
    thresholds: &AlertThresholds,
) -> Snapshot {
    let vq_snapshots = vq.snapshot();
    let mut departments = BTreeMap::new();

    for dept in Department::ALL {
        let connected = cache.connected_by_department(dept);
        let available_agents = connected
            .iter()
            .filter(|(_, r)| r.state == AgentState::Available)
            .count();

        let agents: Vec<AgentSnapshot> = connected
            .iter()
            .map(|(id, r)| agent_snapshot(id, r))
            .collect();

        for agent in &agents {
            evaluate_alerts(agent, thresholds);
        }

        let queues: Vec<VqSummary> = vq_snapshots
            .iter()
            .filter(|q| q.department == dept)
            .map(|q| VqSummary::from_vq(q, available_agents))
            .collect();

        let summary = DepartmentSummary::from_agents(&agents);
        departments.insert(dept, DepartmentSnapshot { agents, queues, summary });
    }

    Snapshot {
        kind: "snapshot",
        timestamp: Utc::now(),
        departments,
    }
}

/// Tallies connected agents by state/department/location for the
/// metrics shim. A wholesale rebuild each tick, not an incremental
/// counter — the cache is the source of truth, so there is nothing to
/// drift out of sync with.
fn agent_gauges(cache: &AgentCache) -> AgentGauges {
    let mut gauges = AgentGauges::default();
    for (_, record) in cache.connected_agents() {
        *gauges.by_state.entry(record.state).or_insert(0) += 1;
        *gauges.by_department.entry(record.department).or_insert(0) += 1;
        *gauges.by_location.entry(record.location).or_insert(0) += 1;
    }
    gauges
}

/// ACW/break alert thresholds. Not part of the external wire protocol —
/// the core logs when an agent overstays one of these states; a real
/// alerting pipeline is an external collaborator, same as metrics.
#[derive(Debug, Clone, Copy)]
pub struct AlertThresholds {
    pub acw_secs: f64,
    pub break_secs: f64,
}

impl From<&DashboardConfig> for AlertThresholds {
    fn from(cfg: &DashboardConfig) -> Self {
        Self {
            acw_secs: cfg.acw_alert_threshold.as_secs_f64(),
            break_secs: cfg.break_alert_threshold.as_secs_f64(),
        }
    }
}

fn evaluate_alerts(agent: &AgentSnapshot, thresholds: &AlertThresholds) {
    match agent.state {
        AgentState::AfterCallWork if agent.state_duration_secs > thresholds.acw_secs => {
            warn!(agent_id = %agent.agent_id, secs = agent.state_duration_secs, "agent exceeded ACW alert threshold");
        }
        AgentState::Break if agent.state_duration_secs > thresholds.break_secs => {
            warn!(agent_id = %agent.agent_id, secs = agent.state_duration_secs, "agent exceeded break alert threshold");
        }
        _ => {}
    }
}

/// Drives the 1 Hz aggregation ticker. Routing and aggregation share a
/// cadence (`tick_period`) but run as two independent steps within the
/// same tick — see [`crate::server`] for how they're sequenced against
/// the VQ engine's routing tick.
pub struct SnapshotAggregator {
    cache: Arc<crate::agent::AgentCache>,
    vq: Arc<VqEngine>,
    dashboard: Arc<DashboardHub>,
    metrics: Arc<Metrics>,
    thresholds: AlertThresholds,
}

impl SnapshotAggregator {
    pub fn new(
        cache: Arc<crate::agent::AgentCache>,
        vq: Arc<VqEngine>,
        dashboard: Arc<DashboardHub>,
        metrics: Arc<Metrics>,
        dashboard_config: &DashboardConfig,
    ) -> Self {
        Self {
            cache,
            vq,
            dashboard,
            metrics,
            thresholds: AlertThresholds::from(dashboard_config),
        }
    }

    /// Builds and broadcasts exactly one snapshot. Called once per tick
    /// by the server's ticker loop.
    pub async fn tick(&self) {
        let snapshot = build_snapshot(&self.cache, &self.vq, &self.thresholds);
        Metrics::inc(&self.metrics.snapshot_ticks_total);
        self.metrics.set_agent_gauges(agent_gauges(&self.cache));
        self.metrics
            .dashboard_clients_active
            .store(self.dashboard.client_count() as u64, std::sync::atomic::Ordering::Relaxed);
        self.dashboard.broadcast(snapshot).await;
    }
}
