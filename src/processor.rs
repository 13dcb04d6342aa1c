//! The message processor: a single sequential consumer over the five
//! channels fed by every agent session (register / heartbeat /
//! state_change / call_complete / disconnect). Sequential processing is
//! what makes per-agent effects linearizable without per-agent locks —
//! nothing here runs concurrently with anything else here.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::agent::{AgentCache, Kpis};
use crate::config::QueueConfig;
use crate::metrics::Metrics;
use crate::persistence::PersistenceSink;
use crate::types::{AgentId, AgentState, Department, Location};
use crate::vq::VqEngine;

const FCR_RANGE: (f64, f64) = (60.0, 100.0);
const CSAT_RANGE: (f64, f64) = (1.0, 5.0);
const ADHERENCE_RANGE: (f64, f64) = (70.0, 100.0);
const ADHERENCE_JITTER: f64 = 2.0;

/// `register`: identity plus initial state and initial KPIs.
#[derive(Debug, Clone)]
pub struct RegisterMsg {
    pub agent_id: AgentId,
    pub department: Department,
    pub location: Location,
    pub team: String,
    pub state: AgentState,
    pub login_time_secs: f64,
}

/// `heartbeat`: current state, sent every ~2 s.
#[derive(Debug, Clone)]
pub struct HeartbeatMsg {
    pub agent_id: AgentId,
    pub state: AgentState,
    pub login_time_secs: f64,
}

/// `state_change`: previous -> new, and how long the agent spent in the
/// previous state.
#[derive(Debug, Clone)]
pub struct StateChangeMsg {
    pub agent_id: AgentId,
    pub previous_state: AgentState,
    pub new_state: AgentState,
    pub duration: Duration,
    pub login_time_secs: f64,
}

/// `call_complete`: a call the agent finished handling.
#[derive(Debug, Clone)]
pub struct CallCompleteMsg {
    pub agent_id: AgentId,
    pub call_id: String,
    pub talk_time: Duration,
    pub hold_time: Duration,
}

/// Senders handed to the session hub; cloned once per session.
#[derive(Clone)]
pub struct ProcessorHandle {
    pub register_tx: mpsc::Sender<RegisterMsg>,
    pub heartbeat_tx: mpsc::Sender<HeartbeatMsg>,
    pub state_change_tx: mpsc::Sender<StateChangeMsg>,
    pub call_complete_tx: mpsc::Sender<CallCompleteMsg>,
    pub disconnect_tx: mpsc::Sender<AgentId>,
}

impl ProcessorHandle {
    /// Non-blocking sends with a drop+warn backpressure policy, matching
    /// the session writer's drop-newest overflow behaviour. A full
    /// processor channel means the system is overloaded; losing one
    /// heartbeat or state change is preferable to stalling a session
    /// reader.
    pub fn try_register(&self, msg: RegisterMsg, metrics: &Metrics) {
        if self.register_tx.try_send(msg).is_err() {
            warn!("register channel full, dropping message");
            Metrics::inc(&metrics.heartbeats_dropped_total);
        }
    }

    pub fn try_heartbeat(&self, msg: HeartbeatMsg, metrics: &Metrics) {
        if self.heartbeat_tx.try_send(msg).is_err() {
            warn!("heartbeat channel full, dropping message");
            Metrics::inc(&metrics.heartbeats_dropped_total);
        }
    }

    pub fn try_state_change(&self, msg: StateChangeMsg, metrics: &Metrics) {
        if self.state_change_tx.try_send(msg).is_err() {
            warn!("state_change channel full, dropping message");
            Metrics::inc(&metrics.heartbeats_dropped_total);
        }
    }

    pub fn try_call_complete(&self, msg: CallCompleteMsg, metrics: &Metrics) {
        if self.call_complete_tx.try_send(msg).is_err() {
            warn!("call_complete channel full, dropping message");
            Metrics::inc(&metrics.heartbeats_dropped_total);
        }
    }

    pub fn try_disconnect(&self, agent_id: AgentId, metrics: &Metrics) {
        if self.disconnect_tx.try_send(agent_id).is_err() {
            warn!("disconnect channel full, dropping notification");
            Metrics::inc(&metrics.heartbeats_dropped_total);
        }
    }
}

/// The processor itself. Owns the receive ends; `run` never returns
/// while any sender half is alive.
pub struct MessageProcessor {
    cache: Arc<AgentCache>,
    vq: Arc<VqEngine>,
    persistence: Arc<dyn PersistenceSink>,
    metrics: Arc<Metrics>,
    register_rx: mpsc::Receiver<RegisterMsg>,
    heartbeat_rx: mpsc::Receiver<HeartbeatMsg>,
    state_change_rx: mpsc::Receiver<StateChangeMsg>,
    call_complete_rx: mpsc::Receiver<CallCompleteMsg>,
    disconnect_rx: mpsc::Receiver<AgentId>,
}

impl MessageProcessor {
    pub fn new(
        cache: Arc<AgentCache>,
        vq: Arc<VqEngine>,
        persistence: Arc<dyn PersistenceSink>,
        metrics: Arc<Metrics>,
        queue: &QueueConfig,
    ) -> (Self, ProcessorHandle) {
        let (register_tx, register_rx) = mpsc::channel(queue.register_channel_capacity);
        let (heartbeat_tx, heartbeat_rx) = mpsc::channel(queue.heartbeat_channel_capacity);
        let (state_change_tx, state_change_rx) = mpsc::channel(queue.state_change_channel_capacity);
        let (call_complete_tx, call_complete_rx) = mpsc::channel(queue.call_complete_channel_capacity);
        let (disconnect_tx, disconnect_rx) = mpsc::channel(queue.disconnect_channel_capacity);

        let processor = Self {
            cache,
            vq,
            persistence,
            metrics,
            register_rx,
            heartbeat_rx,
            state_change_rx,
            call_complete_rx,
            disconnect_rx,
        };
        let handle = ProcessorHandle {
            register_tx,
            heartbeat_tx,
            state_change_tx,
            call_complete_tx,
            disconnect_tx,
        };
        (processor, handle)
    }

    /// Drains all five channels as a single sequential consumer until
    /// every sender has been dropped (i.e. the session hub has shut
    /// down).
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                msg = self.register_rx.recv() => {
                    match msg {
                        Some(m) => self.handle_register(m),
                        None => break,
                    }
                }
                msg = self.heartbeat_rx.recv() => {
                    match msg {
                        Some(m) => self.handle_heartbeat(m),
                        None => break,
                    }
                }
                msg = self.state_change_rx.recv() => {
                    match msg {
                        Some(m) => self.handle_state_change(m),
                        None => break,
                    }
                }
                msg = self.call_complete_rx.recv() => {
                    match msg {
                        Some(m) => self.handle_call_complete(m).await,
                        None => break,
                    }
                }
                msg = self.disconnect_rx.recv() => {
                    match msg {
                        Some(m) => self.handle_disconnect(m),
                        None => break,
                    }
                }
            }
        }
        debug!("message processor shutting down, all channels closed");
    }

    fn handle_register(&self, msg: RegisterMsg) {
        trace!(agent_id = %msg.agent_id, "register");
        self.cache.upsert(
            msg.agent_id,
            msg.department,
            msg.location,
            msg.team,
            msg.state,
            msg.login_time_secs,
        );
        Metrics::inc(&self.metrics.agents_registered_total);
        Metrics::inc(&self.metrics.agents_connected);
    }

    fn handle_heartbeat(&self, msg: HeartbeatMsg) {
        self.cache
            .update_from_heartbeat(&msg.agent_id, msg.state, msg.login_time_secs);
    }

    fn handle_state_change(&self, msg: StateChangeMsg) {
        let d = msg.duration.as_secs_f64();
        let previous = msg.previous_state;
        self.cache.update_from_state_change(
            &msg.agent_id,
            msg.new_state,
            msg.login_time_secs,
            move |kpis| apply_kpi_transition(kpis, previous, d),
        );
    }

    async fn handle_call_complete(&self, msg: CallCompleteMsg) {
        match self.vq.complete(&msg.call_id, msg.talk_time, msg.hold_time) {
            Ok(call) => {
                Metrics::inc(&self.metrics.calls_completed_total);
                self.persistence.record_call(&call).await;
            }
            Err(e) => {
                warn!(call_id = %msg.call_id, agent_id = %msg.agent_id, error = %e, "call_complete for unknown call");
                Metrics::inc(&self.metrics.unknown_entity_total);
            }
        }
    }

    fn handle_disconnect(&self, agent_id: AgentId) {
        trace!(%agent_id, "disconnect");
        self.cache.mark_disconnected(&agent_id);
        Metrics::dec(&self.metrics.agents_connected);
    }
}

/// Applies the KPI recomputation rules for leaving state `previous` after
/// spending `d` seconds in it. `kpis` starts from a carried baseline
/// (currently just `login_time`); counters specific to the state being
/// left are incremented here, then occupancy/adherence/FCR/CSAT are
/// derived.
fn apply_kpi_transition(kpis: &mut Kpis, previous: AgentState, d: f64) {
    let mut rng = rand::thread_rng();
    match previous {
        AgentState::OnCall => {
            let n = kpis.total_calls + 1;
            kpis.avg_call_duration = (kpis.avg_call_duration * (n - 1) as f64 + d) / n as f64;
            kpis.avg_handle_time = kpis.avg_call_duration;
            kpis.total_calls = n;
            kpis.fcr = rng.gen_range(FCR_RANGE.0..=FCR_RANGE.1);
            kpis.csat = rng.gen_range(CSAT_RANGE.0..=CSAT_RANGE.1);
        }
        AgentState::AfterCallWork => {
            kpis.acw_count += 1;
            kpis.acw_time += d;
        }
        AgentState::OnHold => {
            kpis.hold_count += 1;
            kpis.hold_time += d;
        }
        AgentState::Transferring => {
            kpis.transfer_count += 1;
        }
        AgentState::Conference => {
            kpis.conference_count += 1;
        }
        AgentState::Break | AgentState::Lunch => {
            kpis.break_time += d;
        }
        _ => {}
    }

    let productive_time = kpis.avg_call_duration * kpis.total_calls as f64 + kpis.acw_time;
    let denom = kpis.login_time - kpis.break_time;
    kpis.occupancy = if denom > 0.0 {
        (100.0 * productive_time / denom).clamp(0.0, 100.0)
    } else {
        0.0
    };

    let walk = rng.gen_range(-ADHERENCE_JITTER..=ADHERENCE_JITTER);
    let baseline = if kpis.adherence == 0.0 { 90.0 } else { kpis.adherence };
    kpis.adherence = (baseline + walk).clamp(ADHERENCE_RANGE.0, ADHERENCE_RANGE.1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GeneralConfig, RoutingConfig};
    use crate::persistence::NullSink;

    fn processor() -> (MessageProcessor, ProcessorHandle, Arc<AgentCache>, Arc<VqEngine>) {
        let cache = Arc::new(AgentCache::new(&GeneralConfig::default()));
        let vq = Arc::new(VqEngine::new(&RoutingConfig::default()));
        let metrics = Arc::new(Metrics::new());
        let persistence: Arc<dyn PersistenceSink> = Arc::new(NullSink);
        let (proc, handle) = MessageProcessor::new(
            cache.clone(),
            vq.clone(),
            persistence,
            metrics,
            &QueueConfig::default(),
        );
        (proc, handle, cache, vq)
    }

    #[test]
    fn on_call_transition_updates_totals_and_avg() {
        let mut kpis = Kpis::default();
        apply_kpi_transition(&mut kpis, AgentState::OnCall, 120.0);
        assert_eq!(kpis.total_calls, 1);
        assert!((kpis.avg_call_duration - 120.0).abs() < f64::EPSILON);
        assert!(kpis.fcr >= 60.0 && kpis.fcr <= 100.0);
        assert!(kpis.csat >= 1.0 && kpis.csat <= 5.0);
    }

    #[test]
    fn acw_transition_accumulates_time() {
        let mut kpis = Kpis::default();
        apply_kpi_transition(&mut kpis, AgentState::AfterCallWork, 30.0);
        assert_eq!(kpis.acw_count, 1);
        assert!((kpis.acw_time - 30.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn register_then_heartbeat_updates_cache() {
        let (proc, handle, cache, _vq) = processor();
        let metrics = Arc::new(Metrics::new());
        handle.try_register(
            RegisterMsg {
                agent_id: "a1".into(),
                department: Department::Sales,
                location: Location::Berlin,
                team: "t1".into(),
                state: AgentState::Available,
                login_time_secs: 0.0,
            },
            &metrics,
        );
        handle.try_heartbeat(
            HeartbeatMsg {
                agent_id: "a1".into(),
                state: AgentState::Available,
                login_time_secs: 10.0,
            },
            &metrics,
        );
        drop(handle);
        proc.run().await;
        assert_eq!(cache.by_department(Department::Sales).len(), 1);
    }
}
