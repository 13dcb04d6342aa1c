//! The virtual-queue engine.
//!
//! Owns every [`Call`] and [`VirtualQueue`] in the system behind a single
//! [`parking_lot::Mutex`] — routing, enqueue, complete, abandon, wipe and
//! snapshot all run under it, a single-critical-section design matching
//! the call-routing engine it's modeled on. The routing tick is the
//! longest critical section; it is bounded by the calls routed plus the
//! agents considered this tick, never by total queue depth.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use tracing::warn;
use uuid::Uuid;

use crate::agent::AgentCache;
use crate::config::RoutingConfig;
use crate::error::{MontiError, Result};
use crate::types::{AgentId, Department};

/// Lifecycle status of a [`Call`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    Waiting,
    Active,
    Completed,
    Abandoned,
}

/// A single offered call. Lives in exactly one VQ's `waiting` list or
/// `active` map, never both — enforced by [`VqEngine`]'s API surface
/// rather than by the type itself.
#[derive(Debug, Clone)]
pub struct Call {
    pub call_id: String,
    pub vq: String,
    pub department: Department,
    pub status: CallStatus,
    pub enqueue_time: Instant,
    pub assign_time: Option<Instant>,
    pub complete_time: Option<Instant>,
    pub wait_time: Option<Duration>,
    pub talk_time: Option<Duration>,
    pub hold_time: Option<Duration>,
    pub wrap_time: Option<Duration>,
    pub agent_id: Option<AgentId>,
}

/// Running service-level counters for one VQ.
#[derive(Debug, Clone)]
pub struct SlTracker {
    pub target: f64,
    pub threshold_secs: f64,
    pub answered_in_sl: u64,
    pub total_answered: u64,
}

impl SlTracker {
    fn new(target: f64, threshold_secs: f64) -> Self {
        Self {
            target,
            threshold_secs,
            answered_in_sl: 0,
            total_answered: 0,
        }
    }

    /// `100` when nothing has been answered yet, otherwise the percentage
    /// answered within `threshold_secs`.
    pub fn sl(&self) -> f64 {
        if self.total_answered == 0 {
            100.0
        } else {
            100.0 * (self.answered_in_sl as f64) / (self.total_answered as f64)
        }
    }
}

struct VirtualQueue {
    name: String,
    department: Department,
    waiting: VecDeque<Call>,
    active: HashMap<String, Call>,
    completed: u64,
    abandoned: u64,
    sl: SlTracker,
}

impl VirtualQueue {
    fn new(name: &str, department: Department, routing: &RoutingConfig) -> Self {
        Self {
            name: name.to_string(),
            department,
            waiting: VecDeque::new(),
            active: HashMap::new(),
            completed: 0,
            abandoned: 0,
            sl: SlTracker::new(routing.sl_target, routing.sl_threshold_secs),
        }
    }

    fn longest_wait(&self) -> Duration {
        self.waiting
            .front()
            .map(|c| c.enqueue_time.elapsed())
            .unwrap_or_default()
    }
}

/// A routing-tick directive: the agent to notify and the call to deliver.
#[derive(Debug, Clone)]
pub struct Assignment {
    pub agent_id: AgentId,
    pub call_id: String,
    pub vq: String,
    pub department: Department,
    pub timestamp: Instant,
}

/// Read-only view of one VQ, as handed to the snapshot aggregator and the
/// admin stats endpoint.
#[derive(Debug, Clone)]
pub struct VqSnapshot {
    pub name: String,
    pub department: Department,
    pub waiting: usize,
    pub active: usize,
    pub completed: u64,
    pub abandoned: u64,
    pub longest_wait_secs: f64,
    pub sl_target: f64,
    pub sl_threshold_secs: f64,
    pub answered_in_sl: u64,
    pub total_answered: u64,
    pub sl: f64,
}

/// The fixed 16-VQ layout: four per department, never reshuffled at
/// runtime. Names are presentation-facing but otherwise arbitrary.
const VQ_NAMES: [(&str, Department); 16] = [
    ("sales_inbound", Department::Sales),
    ("sales_outbound", Department::Sales),
    ("sales_vip", Department::Sales),
    ("sales_renewals", Department::Sales),
    ("support_tier1", Department::Support),
    ("support_tier2", Department::Support),
    ("support_billing", Department::Support),
    ("support_general", Department::Support),
    ("technical_hardware", Department::Technical),
    ("technical_software", Department::Technical),
    ("technical_network", Department::Technical),
    ("technical_escalation", Department::Technical),
    ("retention_standard", Department::Retention),
    ("retention_vip", Department::Retention),
    ("retention_winback", Department::Retention),
    ("retention_loyalty", Department::Retention),
];

struct VqState {
    queues: Vec<VirtualQueue>,
}

impl VqState {
    fn find_mut(&mut self, vq_name: &str) -> Option<&mut VirtualQueue> {
        self.queues.iter_mut().find(|q| q.name == vq_name)
    }

    /// Locate a call's owning VQ by scanning every `active` map. Sixteen
    /// VQs, so a linear scan is cheaper than a second call-id index.
    fn find_active(&mut self, call_id: &str) -> Option<(&mut VirtualQueue, Call)> {
        for vq in &mut self.queues {
            if let Some(call) = vq.active.remove(call_id) {
                return Some((vq, call));
            }
        }
        None
    }
}

/// The VQ engine: single mutex, sixteen queues, one routing tick per
/// second.
pub struct VqEngine {
    state: parking_lot::Mutex<VqState>,
}

impl VqEngine {
    pub fn new(routing: &RoutingConfig) -> Self {
        let queues = VQ_NAMES
            .iter()
            .map(|(name, dept)| VirtualQueue::new(name, *dept, routing))
            .collect();
        Self {
            state: parking_lot::Mutex::new(VqState { queues }),
        }
    }

    /// `Enqueue(vq, call-id?) -> Call`. Generates a call-id when none is
    /// supplied.
    pub fn enqueue(&self, vq_name: &str, call_id: Option<String>) -> Result<Call> {
        let mut state = self.state.lock();
        let vq = state
            .find_mut(vq_name)
            .ok_or_else(|| MontiError::not_found(format!("no such VQ: {vq_name}")))?;
        let call = Call {
            call_id: call_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            vq: vq.name.clone(),
            department: vq.department,
            status: CallStatus::Waiting,
            enqueue_time: Instant::now(),
            assign_time: None,
            complete_time: None,
            wait_time: None,
            talk_time: None,
            hold_time: None,
            wrap_time: None,
            agent_id: None,
        };
        vq.waiting.push_back(call.clone());
        Ok(call)
    }

    /// `Abandon(call-id)`. No-op (returns `NotFound`) if the call has
    /// already left the `waiting` list.
    pub fn abandon(&self, call_id: &str) -> Result<Call> {
        let mut state = self.state.lock();
        for vq in &mut state.queues {
            if let Some(pos) = vq.waiting.iter().position(|c| c.call_id == call_id) {
                let mut call = vq.waiting.remove(pos).unwrap();
                let now = Instant::now();
                call.status = CallStatus::Abandoned;
                call.complete_time = Some(now);
                call.wait_time = Some(now.duration_since(call.enqueue_time));
                vq.abandoned += 1;
                return Ok(call);
            }
        }
        Err(MontiError::not_found(format!(
            "call not waiting: {call_id}"
        )))
    }

    /// The 1 Hz routing tick. Reads availability from `cache` once per
    /// department, then drains each department's VQs in fixed rotation
    /// against that snapshot — an agent assigned to one VQ is unavailable
    /// to the rest for the remainder of this tick. Assignments mark the
    /// agent `on_call` in the cache eagerly, before the directive is ever
    /// handed to a session: the `on_call ⇔ current_call_id` invariant
    /// must hold the instant a Snapshot could observe either side.
    pub fn route_tick(&self, cache: &AgentCache) -> Vec<Assignment> {
        let mut assignments = Vec::new();
        let mut state = self.state.lock();
        for dept in Department::ALL {
            let mut available: VecDeque<AgentId> = cache.available_by_department(dept).into();
            if available.is_empty() {
                continue;
            }
            for vq in state.queues.iter_mut().filter(|q| q.department == dept) {
                while !vq.waiting.is_empty() && !available.is_empty() {
                    let agent_id = available.pop_front().expect("checked non-empty");
                    let mut call = vq.waiting.pop_front().expect("checked non-empty");
                    let now = Instant::now();
                    let wait = now.duration_since(call.enqueue_time);
                    call.status = CallStatus::Active;
                    call.agent_id = Some(agent_id.clone());
                    call.assign_time = Some(now);
                    call.wait_time = Some(wait);

                    vq.sl.total_answered += 1;
                    if wait.as_secs_f64() <= vq.sl.threshold_secs {
                        vq.sl.answered_in_sl += 1;
                    }

                    let call_id = call.call_id.clone();
                    let vq_name = vq.name.clone();
                    vq.active.insert(call_id.clone(), call);
                    cache.mark_assigned(&agent_id, &call_id);

                    assignments.push(Assignment {
                        agent_id,
                        call_id,
                        vq: vq_name,
                        department: dept,
                        timestamp: now,
                    });
                }
            }
        }
        assignments
    }

    /// Rolls back a single assignment produced by [`Self::route_tick`]
    /// after the session hub failed to deliver it: the call returns to
    /// the head of its queue and the SL counters are reverted, as if the
    /// assignment never happened. Called outside the VQ lock by the
    /// ticker loop; the caller is responsible for unmarking the agent in
    /// the cache.
    pub fn unwind(&self, vq_name: &str, call_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        let vq = state
            .find_mut(vq_name)
            .ok_or_else(|| MontiError::not_found(format!("no such VQ: {vq_name}")))?;
        let mut call = vq
            .active
            .remove(call_id)
            .ok_or_else(|| MontiError::not_found(format!("call not active: {call_id}")))?;

        if let Some(wait) = call.wait_time {
            vq.sl.total_answered = vq.sl.total_answered.saturating_sub(1);
            if wait.as_secs_f64() <= vq.sl.threshold_secs {
                vq.sl.answered_in_sl = vq.sl.answered_in_sl.saturating_sub(1);
            }
        }

        call.status = CallStatus::Waiting;
        call.agent_id = None;
        call.assign_time = None;
        call.wait_time = None;
        vq.waiting.push_front(call);
        warn!(call_id, vq = vq_name, "routing assignment unwound");
        Ok(())
    }

    /// `Complete(call-id, talk, hold) -> Call`. The KPI side-effects of
    /// leaving `on_call` already happened when the agent's state change
    /// arrived at the processor; this only closes out the call record.
    pub fn complete(&self, call_id: &str, talk: Duration, hold: Duration) -> Result<Call> {
        let mut state = self.state.lock();
        let (vq, mut call) = state
            .find_active(call_id)
            .ok_or_else(|| MontiError::not_found(format!("call not active: {call_id}")))?;
        let now = Instant::now();
        call.status = CallStatus::Completed;
        call.complete_time = Some(now);
        call.talk_time = Some(talk);
        call.hold_time = Some(hold);
        vq.completed += 1;
        Ok(call)
    }

    /// `ForceEnd(call-id)`: completes the call as if `talk = now -
    /// assign_time` and `hold = 0`.
    pub fn force_end(&self, call_id: &str) -> Result<Call> {
        let mut state = self.state.lock();
        let (vq, mut call) = state
            .find_active(call_id)
            .ok_or_else(|| MontiError::not_found(format!("call not active: {call_id}")))?;
        let now = Instant::now();
        let talk = call
            .assign_time
            .map(|t| now.duration_since(t))
            .unwrap_or_default();
        call.status = CallStatus::Completed;
        call.complete_time = Some(now);
        call.talk_time = Some(talk);
        call.hold_time = Some(Duration::ZERO);
        vq.completed += 1;
        Ok(call)
    }

    /// Clears `waiting` and `active` across every VQ, returning the
    /// total number of calls discarded.
    pub fn wipe_all(&self) -> usize {
        let mut state = self.state.lock();
        let mut n = 0;
        for vq in &mut state.queues {
            n += vq.waiting.len() + vq.active.len();
            vq.waiting.clear();
            vq.active.clear();
        }
        n
    }

    /// All 16 VQ snapshots, in the fixed declaration order.
    pub fn snapshot(&self) -> Vec<VqSnapshot> {
        let state = self.state.lock();
        state
            .queues
            .iter()
            .map(|vq| VqSnapshot {
                name: vq.name.clone(),
                department: vq.department,
                waiting: vq.waiting.len(),
                active: vq.active.len(),
                completed: vq.completed,
                abandoned: vq.abandoned,
                longest_wait_secs: vq.longest_wait().as_secs_f64(),
                sl_target: vq.sl.target,
                sl_threshold_secs: vq.sl.threshold_secs,
                answered_in_sl: vq.sl.answered_in_sl,
                total_answered: vq.sl.total_answered,
                sl: vq.sl.sl(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentCache;
    use crate::config::{GeneralConfig, RoutingConfig};

    fn engine() -> VqEngine {
        VqEngine::new(&RoutingConfig::default())
    }

    #[test]
    fn enqueue_generates_call_id_and_marks_waiting() {
        let vq = engine();
        let call = vq.enqueue("sales_inbound", None).unwrap();
        assert!(!call.call_id.is_empty());
        assert_eq!(call.status, CallStatus::Waiting);
        assert_eq!(call.department, Department::Sales);
    }

    #[test]
    fn enqueue_unknown_vq_errors() {
        let vq = engine();
        assert!(vq.enqueue("does_not_exist", None).is_err());
    }

    #[test]
    fn abandon_removes_from_waiting_and_counts() {
        let vq = engine();
        let call = vq.enqueue("sales_inbound", Some("c1".into())).unwrap();
        let abandoned = vq.abandon(&call.call_id).unwrap();
        assert_eq!(abandoned.status, CallStatus::Abandoned);
        let snap = vq
            .snapshot()
            .into_iter()
            .find(|s| s.name == "sales_inbound")
            .unwrap();
        assert_eq!(snap.abandoned, 1);
        assert_eq!(snap.waiting, 0);
    }

    #[test]
    fn service_level_boundary_matches_spec_example() {
        let vq = engine();
        for (id, wait_ms) in [(1, 10), (2, 15), (3, 19), (4, 20), (5, 25)] {
            let call = vq.enqueue("sales_inbound", Some(id.to_string())).unwrap();
            let mut state = vq.state.lock();
            let q = state.find_mut("sales_inbound").unwrap();
            let pos = q.waiting.iter().position(|c| c.call_id == call.call_id).unwrap();
            let mut c = q.waiting.remove(pos).unwrap();
            c.status = CallStatus::Active;
            c.wait_time = Some(Duration::from_millis(wait_ms));
            q.sl.total_answered += 1;
            if (wait_ms as f64) / 1000.0 <= q.sl.threshold_secs {
                q.sl.answered_in_sl += 1;
            }
            q.active.insert(c.call_id.clone(), c);
        }
        let snap = vq
            .snapshot()
            .into_iter()
            .find(|s| s.name == "sales_inbound")
            .unwrap();
        assert_eq!(snap.answered_in_sl, 4);
        assert_eq!(snap.total_answered, 5);
        assert!((snap.sl - 80.0).abs() < f64::EPSILON);
    }

    #[test]
    fn sl_is_100_with_no_answers() {
        let vq = engine();
        let snap = vq
            .snapshot()
            .into_iter()
            .find(|s| s.name == "support_tier1")
            .unwrap();
        assert!((snap.sl - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn route_tick_assigns_longest_idle_agent_fifo() {
        let vq = engine();
        let general = GeneralConfig::default();
        let cache = AgentCache::new(&general);
        cache.upsert(
            "a1".into(),
            Department::Sales,
            crate::types::Location::Berlin,
            "team-a".into(),
            crate::types::AgentState::Available,
            0.0,
        );
        cache.upsert(
            "a2".into(),
            Department::Sales,
            crate::types::Location::Berlin,
            "team-a".into(),
            crate::types::AgentState::Available,
            0.0,
        );

        let c1 = vq.enqueue("sales_inbound", Some("call-1".into())).unwrap();
        let c2 = vq.enqueue("sales_inbound", Some("call-2".into())).unwrap();

        let assignments = vq.route_tick(&cache);
        assert_eq!(assignments.len(), 2);
        assert_eq!(assignments[0].call_id, c1.call_id);
        assert_eq!(assignments[1].call_id, c2.call_id);
    }

    #[test]
    fn wipe_all_counts_and_clears_everything() {
        let vq = engine();
        vq.enqueue("sales_inbound", None).unwrap();
        vq.enqueue("support_tier1", None).unwrap();
        assert_eq!(vq.wipe_all(), 2);
        let total_waiting: usize = vq.snapshot().iter().map(|s| s.waiting).sum();
        assert_eq!(total_waiting, 0);
    }
}
