//! In-process metrics shim.
//!
//! The real Prometheus scrape endpoint is an external collaborator;
//! this is the contract the core calls into. A single [`Metrics`]
//! instance is created once at startup and shared by `Arc` through every
//! component that reports into it — nothing synchronizes on a
//! package-level static, per the "global mutable state" design note.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use crate::types::{AgentState, Department, Location};

#[derive(Debug, Default)]
pub struct Metrics {
    /// Distinct transports currently open (one per session, multiplexed or not).
    pub sessions_active: AtomicU64,
    /// Distinct agent-ids currently bound to a session.
    pub agents_connected: AtomicU64,
    pub agents_registered_total: AtomicU64,
    pub heartbeats_dropped_total: AtomicU64,
    /// Outbound session pushes (ack/call_assign/force_* ) dropped because
    /// the per-session outbound queue was full.
    pub outbound_pushes_dropped_total: AtomicU64,
    pub messages_decode_failed_total: AtomicU64,
    pub unknown_entity_total: AtomicU64,
    pub routing_unwinds_total: AtomicU64,
    pub calls_abandoned_total: AtomicU64,
    pub calls_completed_total: AtomicU64,
    pub dashboard_clients_active: AtomicU64,
    pub dashboard_slow_client_cuts_total: AtomicU64,
    pub snapshot_ticks_total: AtomicU64,
    pub snapshot_ticks_skipped_total: AtomicU64,
    /// Agent counts by state/department/location, refreshed wholesale on
    /// every aggregation tick from `build_snapshot`'s own pass over the
    /// cache — not incremented/decremented per-event, since a gauge
    /// rebuilt from the authoritative cache can't drift.
    agent_gauges: RwLock<AgentGauges>,
}

#[derive(Debug, Default, Clone)]
pub struct AgentGauges {
    pub by_state: HashMap<AgentState, u64>,
    pub by_department: HashMap<Department, u64>,
    pub by_location: HashMap<Location, u64>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(counter: &AtomicU64) {
        counter.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    /// Replaces the agents-by-state/department/location gauges wholesale.
    /// Called once per aggregation tick with a fresh tally over the cache.
    pub fn set_agent_gauges(&self, gauges: AgentGauges) {
        *self.agent_gauges.write().unwrap() = gauges;
    }

    pub fn agent_gauges(&self) -> AgentGauges {
        self.agent_gauges.read().unwrap().clone()
    }
}
