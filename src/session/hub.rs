//! The agent session hub: one reader task and one writer task per
//! transport, a shared [`SessionRegistry`] mapping agent-id to transport,
//! and the eviction/force-disconnect rules from the session contract.
//!
//! A transport is "per-agent" (one agent-id ever binds to it) or
//! "multiplexed" (many agent-ids share the one outbound queue and
//! read loop). Both feed the same [`ProcessorHandle`] channels.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Notify};
use tracing::{debug, warn};

use crate::config::GeneralConfig;
use crate::metrics::Metrics;
use crate::processor::{CallCompleteMsg, HeartbeatMsg, ProcessorHandle, RegisterMsg, StateChangeMsg};
use crate::session::protocol::{AgentInbound, AgentOutbound};
use crate::types::AgentId;

/// One WebSocket connection. May carry one agent-id (per-agent endpoint)
/// or many (multiplexed endpoint); `owned` tracks which.
pub struct Transport {
    outbound_tx: mpsc::Sender<AgentOutbound>,
    multiplexed: bool,
    owned: DashMap<AgentId, ()>,
    close: Notify,
}

impl Transport {
    fn new(outbound_tx: mpsc::Sender<AgentOutbound>, multiplexed: bool) -> Self {
        Self {
            outbound_tx,
            multiplexed,
            owned: DashMap::new(),
            close: Notify::new(),
        }
    }

    fn bind(&self, agent_id: AgentId) {
        self.owned.insert(agent_id, ());
    }

    /// Removes `agent_id` from this transport's owned set; returns the
    /// number of agent-ids still bound afterwards.
    fn unbind(&self, agent_id: &AgentId) -> usize {
        self.owned.remove(agent_id);
        self.owned.len()
    }

    fn owned_agents(&self) -> Vec<AgentId> {
        self.owned.iter().map(|e| e.key().clone()).collect()
    }

    /// Pushes an outbound control message with a drop-newest policy: a
    /// full queue means the writer is backed up, so the newest frame is
    /// dropped rather than blocking the caller. Every drop is logged and
    /// counted, uniformly across every push site (ack, call_assign,
    /// force_end_call, force_disconnect).
    fn push(&self, msg: AgentOutbound, metrics: &Metrics) -> bool {
        if self.outbound_tx.try_send(msg).is_ok() {
            true
        } else {
            warn!("outbound session queue full, dropping push");
            Metrics::inc(&metrics.outbound_pushes_dropped_total);
            false
        }
    }

    fn request_close(&self) {
        self.close.notify_waiters();
    }

    async fn closed(&self) {
        self.close.notified().await;
    }
}

/// Maps agent-id to the transport currently bound to it.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<AgentId, Arc<Transport>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `agent_id` to `transport`. If a different transport was
    /// already bound to this agent-id, it is evicted: unbound, and
    /// force-closed if it no longer owns any agent-id (per-agent
    /// transports always qualify; multiplexed ones only once every agent
    /// they carried has moved on).
    fn register(&self, agent_id: AgentId, transport: &Arc<Transport>) {
        transport.bind(agent_id.clone());
        if let Some(prev) = self.sessions.insert(agent_id.clone(), transport.clone()) {
            if !Arc::ptr_eq(&prev, transport) {
                let remaining = prev.unbind(&agent_id);
                if remaining == 0 || !prev.multiplexed {
                    prev.request_close();
                }
            }
        }
    }

    pub fn push_to(&self, agent_id: &AgentId, msg: AgentOutbound, metrics: &Metrics) -> bool {
        match self.sessions.get(agent_id) {
            Some(t) => t.push(msg, metrics),
            None => false,
        }
    }

    /// `ForceDisconnect(agent-id)`: pushes the directive, then removes and
    /// closes the owning transport (the whole transport for a per-agent
    /// session; for a multiplexed one, closed only once it is left
    /// carrying nobody).
    pub fn force_disconnect(&self, agent_id: &AgentId, metrics: &Metrics) -> bool {
        let Some((_, transport)) = self.sessions.remove(agent_id) else {
            return false;
        };
        transport.push(
            AgentOutbound::ForceDisconnect { agent_id: agent_id.to_string() },
            metrics,
        );
        let remaining = transport.unbind(agent_id);
        if remaining == 0 || !transport.multiplexed {
            transport.request_close();
        }
        true
    }

    pub fn force_end_call(&self, agent_id: &AgentId, call_id: String, metrics: &Metrics) -> bool {
        self.push_to(
            agent_id,
            AgentOutbound::ForceEndCall { agent_id: agent_id.to_string(), call_id },
            metrics,
        )
    }

    /// Delivers a routing-tick assignment to the agent it was made for.
    /// Returns `false` if the agent has no live transport — the caller
    /// (the ticker loop) must then unwind the assignment.
    pub fn dispatch_call_assign(&self, assignment: &crate::vq::Assignment, metrics: &Metrics) -> bool {
        self.push_to(
            &assignment.agent_id,
            AgentOutbound::CallAssign {
                agent_id: assignment.agent_id.to_string(),
                call_id: assignment.call_id.clone(),
                vq: assignment.vq.clone(),
                timestamp: chrono::Utc::now(),
            },
            metrics,
        )
    }

    /// Removes `agent_id`'s mapping iff it still points at `transport` —
    /// guards the teardown path against a race with a newer `register()`
    /// for the same agent-id that already replaced it.
    fn remove_if_matches(&self, agent_id: &AgentId, transport: &Arc<Transport>) {
        self.sessions
            .remove_if(agent_id, |_, v| Arc::ptr_eq(v, transport));
    }
}

fn inbound_to_agent_id(id: &str) -> AgentId {
    AgentId::from(id)
}

/// Decodes and dispatches one inbound frame: registers/evicts transports
/// as needed and forwards to the processor. Registration additionally
/// acks.
fn handle_inbound(
    inbound: AgentInbound,
    registry: &SessionRegistry,
    transport: &Arc<Transport>,
    processor: &ProcessorHandle,
    metrics: &Metrics,
) {
    match inbound {
        AgentInbound::Register {
            agent_id,
            department,
            location,
            team,
            state,
            kpis,
        } => {
            let id = inbound_to_agent_id(&agent_id);
            registry.register(id.clone(), transport);
            processor.try_register(
                RegisterMsg {
                    agent_id: id,
                    department,
                    location,
                    team,
                    state,
                    login_time_secs: kpis.login_time_secs,
                },
                metrics,
            );
            transport.push(AgentOutbound::Ack { agent_id }, metrics);
        }
        AgentInbound::Heartbeat {
            agent_id,
            state,
            kpis,
            ..
        } => {
            processor.try_heartbeat(
                HeartbeatMsg {
                    agent_id: inbound_to_agent_id(&agent_id),
                    state,
                    login_time_secs: kpis.login_time_secs,
                },
                metrics,
            );
        }
        AgentInbound::StateChange {
            agent_id,
            previous_state,
            new_state,
            state_duration_secs,
            kpis,
            ..
        } => {
            processor.try_state_change(
                StateChangeMsg {
                    agent_id: inbound_to_agent_id(&agent_id),
                    previous_state,
                    new_state,
                    duration: Duration::from_secs_f64(state_duration_secs.max(0.0)),
                    login_time_secs: kpis.login_time_secs,
                },
                metrics,
            );
        }
        AgentInbound::CallComplete {
            agent_id,
            call_id,
            talk_time_secs,
            hold_time_secs,
            ..
        } => {
            processor.try_call_complete(
                CallCompleteMsg {
                    agent_id: inbound_to_agent_id(&agent_id),
                    call_id,
                    talk_time: Duration::from_secs_f64(talk_time_secs.max(0.0)),
                    hold_time: Duration::from_secs_f64(hold_time_secs.max(0.0)),
                },
                metrics,
            );
        }
    }
}

/// Drives one agent WebSocket end to end: spawns the writer subtask,
/// runs the reader loop until timeout/close/force-disconnect, then tears
/// down every agent-id this transport owned.
pub async fn run_agent_session(
    socket: WebSocket,
    multiplexed: bool,
    registry: Arc<SessionRegistry>,
    processor: ProcessorHandle,
    metrics: Arc<Metrics>,
    general: GeneralConfig,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<AgentOutbound>(general.agent_outbound_capacity);
    let transport = Arc::new(Transport::new(outbound_tx, multiplexed));
    Metrics::inc(&metrics.sessions_active);

    let ping_period = general.ping_period;
    let writer = tokio::spawn(async move {
        let mut ping_timer = tokio::time::interval(ping_period);
        ping_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                msg = outbound_rx.recv() => {
                    match msg {
                        Some(m) => {
                            let Ok(text) = serde_json::to_string(&m) else { continue };
                            if ws_tx.send(Message::Text(text)).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping_timer.tick() => {
                    if ws_tx.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
        let _ = ws_tx.close().await;
    });

    loop {
        tokio::select! {
            () = transport.closed() => break,
            frame = tokio::time::timeout(general.read_timeout, ws_rx.next()) => {
                match frame {
                    Err(_) => {
                        debug!("agent session read timeout, closing");
                        break;
                    }
                    Ok(None | Some(Err(_))) => break,
                    Ok(Some(Ok(Message::Close(_)))) => break,
                    Ok(Some(Ok(Message::Text(text)))) => {
                        match serde_json::from_str::<AgentInbound>(&text) {
                            Ok(inbound) => handle_inbound(inbound, &registry, &transport, &processor, &metrics),
                            Err(e) => {
                                warn!(error = %e, "failed to decode agent frame");
                                Metrics::inc(&metrics.messages_decode_failed_total);
                            }
                        }
                    }
                    Ok(Some(Ok(_))) => {}
                }
            }
        }
    }

    transport.request_close();
    writer.abort();
    for agent_id in transport.owned_agents() {
        registry.remove_if_matches(&agent_id, &transport);
        processor.try_disconnect(agent_id, &metrics);
    }
    Metrics::dec(&metrics.sessions_active);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport(multiplexed: bool) -> Arc<Transport> {
        let (tx, _rx) = mpsc::channel(8);
        Arc::new(Transport::new(tx, multiplexed))
    }

    #[test]
    fn register_evicts_prior_per_agent_transport() {
        let registry = SessionRegistry::new();
        let t1 = transport(false);
        let t2 = transport(false);
        registry.register("a1".into(), &t1);
        registry.register("a1".into(), &t2);
        assert_eq!(t1.owned.len(), 0);
        assert_eq!(t2.owned.len(), 1);
    }

    #[test]
    fn multiplexed_transport_stays_open_until_empty() {
        let registry = SessionRegistry::new();
        let t1 = transport(true);
        registry.register("a1".into(), &t1);
        registry.register("a2".into(), &t1);
        let t2 = transport(false);
        registry.register("a1".into(), &t2);
        // a2 still belongs to t1, so evicting a1 alone must not close t1.
        assert_eq!(t1.owned.len(), 1);
    }

    #[test]
    fn force_disconnect_removes_mapping() {
        let registry = SessionRegistry::new();
        let metrics = Metrics::new();
        let t1 = transport(false);
        registry.register("a1".into(), &t1);
        assert!(registry.force_disconnect(&"a1".into(), &metrics));
        assert!(!registry.push_to(&"a1".into(), AgentOutbound::Ack { agent_id: "a1".into() }, &metrics));
    }
}
