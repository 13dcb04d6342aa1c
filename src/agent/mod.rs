//! The authoritative agent-state cache.
//!
//! A [`dashmap::DashMap`] keyed by [`AgentId`] — sharded internally, so
//! reads and writes for different agents rarely contend. The processor,
//! the stale sweep and session register/unregister are the only writers;
//! `BuildSnapshot` and the VQ engine's availability queries are the only
//! readers, and both complete within a single map traversal, never
//! calling back into a writer while holding a shard lock.

use std::time::Instant;

use dashmap::DashMap;
use tracing::debug;

use crate::config::GeneralConfig;
use crate::types::{AgentId, AgentState, ConnectionStatus, Department, Location};

/// Rolling KPI bundle. Every field here is a counter or a derived
/// average — nothing is received directly from an agent message without
/// passing through the recomputation rules in [`crate::processor`].
#[derive(Debug, Clone, Default)]
pub struct Kpis {
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

/// One agent's authoritative state, as owned by the cache.
#[derive(Debug, Clone)]
pub struct AgentRecord {
    pub department: Department,
    pub location: Location,
    pub team: String,
    pub state: AgentState,
    pub state_start: Instant,
    pub last_update: Instant,
    pub last_heartbeat: Instant,
    pub connection_status: ConnectionStatus,
    pub current_call_id: Option<String>,
    pub kpis: Kpis,
}

impl AgentRecord {
    fn new(department: Department, location: Location, team: String, state: AgentState, login_time: f64) -> Self {
        let now = Instant::now();
        let mut kpis = Kpis::default();
        kpis.login_time = login_time;
        Self {
            department,
            location,
            team,
            state,
            state_start: now,
            last_update: now,
            last_heartbeat: now,
            connection_status: ConnectionStatus::Connected,
            current_call_id: None,
            kpis,
        }
    }

    /// Resets `state_start` only if `new_state` actually differs —
    /// callers must not call this unconditionally.
    fn transition(&mut self, new_state: AgentState, now: Instant) {
        if self.state != new_state {
            self.state = new_state;
            self.state_start = now;
        }
        self.last_update = now;
    }
}

/// Thread-safe map of `agent-id -> AgentRecord`.
pub struct AgentCache {
    records: DashMap<AgentId, AgentRecord>,
    heartbeat_period_secs: f64,
    stale_threshold: std::time::Duration,
}

impl AgentCache {
    pub fn new(general: &GeneralConfig) -> Self {
        Self {
            records: DashMap::new(),
            heartbeat_period_secs: general.heartbeat_period.as_secs_f64(),
            stale_threshold: general.stale_threshold(),
        }
    }

    /// `Upsert`. Preserves prior identity fields (department/location/team)
    /// when the agent is already known, per the register contract
    /// ("preserve prior identity if already known"). `state`/`login_time`
    /// are applied on every register, known agent or not — a reconnect
    /// mid-shift carries its real state and KPIs, not a fresh default.
    pub fn upsert(
        &self,
        agent_id: AgentId,
        department: Department,
        location: Location,
        team: String,
        state: AgentState,
        login_time: f64,
    ) {
        let now = Instant::now();
        self.records
            .entry(agent_id)
            .and_modify(|r| {
                r.connection_status = ConnectionStatus::Connected;
                r.last_heartbeat = now;
                r.last_update = now;
                r.kpis.login_time = login_time;
                r.transition(state, now);
            })
            .or_insert_with(|| AgentRecord::new(department, location, team, state, login_time));
    }

    /// `UpdateFromHeartbeat`. Unknown agents are ignored. A carried state
    /// that differs from the cached one is treated as an implicit state
    /// change. Only `login_time` is refreshed directly from the wire —
    /// every other KPI field is server-derived and must never be
    /// overwritten wholesale from a client-carried bundle.
    pub fn update_from_heartbeat(&self, agent_id: &AgentId, state: AgentState, login_time: f64) {
        let Some(mut record) = self.records.get_mut(agent_id) else {
            debug!(%agent_id, "heartbeat for unknown agent, ignoring");
            return;
        };
        let now = Instant::now();
        record.last_heartbeat = now;
        record.kpis.login_time = login_time;
        record.transition(state, now);
    }

    /// `UpdateFromStateChange`. `mutate` is handed the record's *current*
    /// KPI bundle to recompute in place (the rules in
    /// [`crate::processor`] run against the accumulated totals, never a
    /// fresh-zeroed bundle) before the new state commits.
    pub fn update_from_state_change(
        &self,
        agent_id: &AgentId,
        new_state: AgentState,
        login_time: f64,
        mutate: impl FnOnce(&mut Kpis),
    ) {
        let Some(mut record) = self.records.get_mut(agent_id) else {
            debug!(%agent_id, "state_change for unknown agent, ignoring");
            return;
        };
        let now = Instant::now();
        record.kpis.login_time = login_time;
        mutate(&mut record.kpis);
        record.transition(new_state, now);
    }

    pub fn mark_connected(&self, agent_id: &AgentId) {
        if let Some(mut record) = self.records.get_mut(agent_id) {
            record.connection_status = ConnectionStatus::Connected;
            record.last_update = Instant::now();
        }
    }

    /// `MarkDisconnected`: sets `state = offline`. Never removes the
    /// record — a disconnection is a status transition, not an eviction.
    pub fn mark_disconnected(&self, agent_id: &AgentId) {
        if let Some(mut record) = self.records.get_mut(agent_id) {
            let now = Instant::now();
            record.connection_status = ConnectionStatus::Disconnected;
            record.transition(AgentState::Offline, now);
        }
    }

    /// Called by the VQ engine at the moment a routing-tick assignment is
    /// made, before the directive is dispatched to any session.
    pub fn mark_assigned(&self, agent_id: &AgentId, call_id: &str) {
        if let Some(mut record) = self.records.get_mut(agent_id) {
            let now = Instant::now();
            record.current_call_id = Some(call_id.to_string());
            record.transition(AgentState::OnCall, now);
        }
    }

    /// Rolls back [`Self::mark_assigned`] when the session hub could not
    /// deliver the `call_assign` directive.
    pub fn unmark_assigned(&self, agent_id: &AgentId) {
        if let Some(mut record) = self.records.get_mut(agent_id) {
            record.current_call_id = None;
        }
    }

    /// `SweepStale()`: every `connected` record whose `last_heartbeat` is
    /// older than `3 * heartbeat_period` transitions to `stale`. Returns
    /// the number of agents swept, for logging.
    pub fn sweep_stale(&self) -> usize {
        let mut swept = 0;
        for mut entry in self.records.iter_mut() {
            let record = entry.value_mut();
            if record.connection_status == ConnectionStatus::Connected
                && record.last_heartbeat.elapsed() > self.stale_threshold
            {
                record.connection_status = ConnectionStatus::Stale;
                swept += 1;
            }
        }
        swept
    }

    /// `AvailableByDepartment(dept)`: agents in `dept` with `state ==
    /// available && connection_status == connected`, sorted by the
    /// LongestIdleFirst policy — oldest `state_start` first, ties broken
    /// by agent-id for a stable, deterministic order.
    pub fn available_by_department(&self, dept: Department) -> Vec<AgentId> {
        let mut available: Vec<(AgentId, Instant)> = self
            .records
            .iter()
            .filter(|e| {
                e.value().department == dept
                    && e.value().state == AgentState::Available
                    && e.value().connection_status == ConnectionStatus::Connected
            })
            .map(|e| (e.key().clone(), e.value().state_start))
            .collect();
        available.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        available.into_iter().map(|(id, _)| id).collect()
    }

    /// `ByDepartment(dept)`: every record in `dept`, connected or not.
    pub fn by_department(&self, dept: Department) -> Vec<(AgentId, AgentRecord)> {
        self.records
            .iter()
            .filter(|e| e.value().department == dept)
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// Only **connected** records, for the snapshot aggregator — `stale`
    /// and `disconnected`/`offline` agents are excluded from the default
    /// per-department presentation.
    pub fn connected_by_department(&self, dept: Department) -> Vec<(AgentId, AgentRecord)> {
        self.records
            .iter()
            .filter(|e| e.value().department == dept && e.value().connection_status == ConnectionStatus::Connected)
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// The flat list of every connected agent, for metrics and alerting.
    pub fn connected_agents(&self) -> Vec<(AgentId, AgentRecord)> {
        self.records
            .iter()
            .filter(|e| e.value().connection_status == ConnectionStatus::Connected)
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn cache() -> AgentCache {
        AgentCache::new(&GeneralConfig::default())
    }

    #[test]
    fn upsert_then_unknown_heartbeat_is_ignored() {
        let cache = cache();
        cache.update_from_heartbeat(&"ghost".into(), AgentState::Available, 10.0);
        assert!(cache.by_department(Department::Sales).is_empty());
    }

    #[test]
    fn register_sets_available_and_connected() {
        let cache = cache();
        cache.upsert("a1".into(), Department::Support, Location::Berlin, "t1".into(), AgentState::Available, 0.0);
        let agents = cache.by_department(Department::Support);
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].1.state, AgentState::Available);
        assert_eq!(agents[0].1.connection_status, ConnectionStatus::Connected);
    }

    #[test]
    fn disconnect_never_removes_the_record() {
        let cache = cache();
        cache.upsert("a1".into(), Department::Support, Location::Berlin, "t1".into(), AgentState::Available, 0.0);
        cache.mark_disconnected(&"a1".into());
        let agents = cache.by_department(Department::Support);
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].1.state, AgentState::Offline);
        assert_eq!(agents[0].1.connection_status, ConnectionStatus::Disconnected);
    }

    #[test]
    fn state_start_unchanged_when_state_does_not_change() {
        let cache = cache();
        cache.upsert("a1".into(), Department::Support, Location::Berlin, "t1".into(), AgentState::Available, 0.0);
        let before = cache.by_department(Department::Support)[0].1.state_start;
        std::thread::sleep(Duration::from_millis(5));
        cache.update_from_heartbeat(&"a1".into(), AgentState::Available, 10.0);
        let after = cache.by_department(Department::Support)[0].1.state_start;
        assert_eq!(before, after);
    }

    #[test]
    fn available_by_department_orders_by_longest_idle_then_id() {
        let cache = cache();
        cache.upsert("b".into(), Department::Sales, Location::Berlin, "t1".into(), AgentState::Available, 0.0);
        std::thread::sleep(Duration::from_millis(5));
        cache.upsert("a".into(), Department::Sales, Location::Berlin, "t1".into(), AgentState::Available, 0.0);
        let order = cache.available_by_department(Department::Sales);
        assert_eq!(order[0].as_str(), "b");
        assert_eq!(order[1].as_str(), "a");
    }

    #[test]
    fn assigned_agent_no_longer_available() {
        let cache = cache();
        cache.upsert("a1".into(), Department::Sales, Location::Berlin, "t1".into(), AgentState::Available, 0.0);
        cache.mark_assigned(&"a1".into(), "call-1");
        let available = cache.available_by_department(Department::Sales);
        assert!(available.is_empty());
        let agents = cache.by_department(Department::Sales);
        assert_eq!(agents[0].1.state, AgentState::OnCall);
        assert_eq!(agents[0].1.current_call_id.as_deref(), Some("call-1"));
    }

    #[test]
    fn sweep_stale_transitions_after_threshold() {
        let mut general = GeneralConfig::default();
        general.heartbeat_period = Duration::from_millis(1);
        general.stale_multiplier = 1;
        let cache = AgentCache::new(&general);
        cache.upsert("a1".into(), Department::Sales, Location::Berlin, "t1".into(), AgentState::Available, 0.0);
        std::thread::sleep(Duration::from_millis(10));
        let swept = cache.sweep_stale();
        assert_eq!(swept, 1);
        let agents = cache.by_department(Department::Sales);
        assert_eq!(agents[0].1.connection_status, ConnectionStatus::Stale);
    }
}
