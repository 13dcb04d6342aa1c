//! End-to-end scenarios spanning the cache, the VQ engine and the
//! dashboard hub, exercised directly against the public API rather than
//! over real sockets.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use monti_core::agent::AgentCache;
use monti_core::config::{GeneralConfig, RoutingConfig};
use monti_core::dashboard::DashboardHub;
use monti_core::identity::AllowedLocations;
use monti_core::metrics::Metrics;
use monti_core::snapshot::{build_snapshot, AlertThresholds};
use monti_core::types::{AgentState, ConnectionStatus, Department, Location};
use monti_core::vq::VqEngine;

fn cache() -> AgentCache {
    AgentCache::new(&GeneralConfig::default())
}

fn engine() -> VqEngine {
    VqEngine::new(&RoutingConfig::default())
}

/// Scenario 1: FIFO routing. One available agent, three waiting calls;
/// a single tick assigns only the head of the queue.
#[test]
fn fifo_routing_assigns_only_the_head_call() {
    let cache = cache();
    let vq = engine();
    cache.upsert("a1".into(), Department::Sales, Location::Berlin, "t1".into(), AgentState::Available, 0.0);

    let c1 = vq.enqueue("sales_inbound", Some("c1".into())).unwrap();
    let _c2 = vq.enqueue("sales_inbound", Some("c2".into())).unwrap();
    let _c3 = vq.enqueue("sales_inbound", Some("c3".into())).unwrap();

    let assignments = vq.route_tick(&cache);
    assert_eq!(assignments.len(), 1);
    assert_eq!(assignments[0].call_id, c1.call_id);

    let remaining: usize = vq
        .snapshot()
        .into_iter()
        .find(|s| s.name == "sales_inbound")
        .unwrap()
        .waiting;
    assert_eq!(remaining, 2);
}

/// Scenario 2: longest-idle selection. Three available agents; routing
/// picks the one with the oldest `state_start`.
#[test]
fn longest_idle_agent_wins_the_assignment() {
    let cache = cache();
    let vq = engine();

    cache.upsert("oldest".into(), Department::Sales, Location::Berlin, "t1".into(), AgentState::Available, 0.0);
    std::thread::sleep(Duration::from_millis(5));
    cache.upsert("middle".into(), Department::Sales, Location::Berlin, "t1".into(), AgentState::Available, 0.0);
    std::thread::sleep(Duration::from_millis(5));
    cache.upsert("newest".into(), Department::Sales, Location::Berlin, "t1".into(), AgentState::Available, 0.0);

    vq.enqueue("sales_vip", Some("c1".into())).unwrap();
    let assignments = vq.route_tick(&cache);

    assert_eq!(assignments.len(), 1);
    assert_eq!(assignments[0].agent_id.as_str(), "oldest");

    let still_available = cache.available_by_department(Department::Sales);
    assert_eq!(still_available.len(), 2);
    assert!(still_available.iter().all(|id| id.as_str() != "oldest"));
}

/// Scenario 4: stale transition at exactly `3 * heartbeat_period`.
#[test]
fn stale_transition_fires_after_threshold_not_before() {
    let mut general = GeneralConfig::default();
    general.heartbeat_period = Duration::from_millis(20);
    general.stale_multiplier = 3;
    let cache = AgentCache::new(&general);
    cache.upsert("a1".into(), Department::Support, Location::Munich, "t1".into(), AgentState::Available, 0.0);

    std::thread::sleep(Duration::from_millis(30));
    cache.sweep_stale();
    let still_connected = cache.by_department(Department::Support)[0].1.connection_status;
    assert_eq!(still_connected, ConnectionStatus::Connected);

    std::thread::sleep(Duration::from_millis(40));
    cache.sweep_stale();
    let now_stale = cache.by_department(Department::Support)[0].1.connection_status;
    assert_eq!(now_stale, ConnectionStatus::Stale);
}

/// Routing-failure unwind: an assignment that can't be delivered returns
/// the call to the head of its queue and frees the agent.
#[test]
fn undeliverable_assignment_unwinds_cleanly() {
    let cache = cache();
    let vq = engine();
    cache.upsert("a1".into(), Department::Technical, Location::Hamburg, "t1".into(), AgentState::Available, 0.0);
    vq.enqueue("technical_hardware", Some("c1".into())).unwrap();

    let assignments = vq.route_tick(&cache);
    assert_eq!(assignments.len(), 1);
    let assignment = &assignments[0];

    // simulate the session hub failing to deliver it
    cache.unmark_assigned(&assignment.agent_id);
    vq.unwind(&assignment.vq, &assignment.call_id).unwrap();

    let snap = vq
        .snapshot()
        .into_iter()
        .find(|s| s.name == "technical_hardware")
        .unwrap();
    assert_eq!(snap.waiting, 1);
    assert_eq!(snap.active, 0);
    assert_eq!(snap.total_answered, 0);

    let agents = cache.by_department(Department::Technical);
    assert_eq!(agents[0].1.state, AgentState::Available);
    assert_eq!(agents[0].1.current_call_id, None);
}

/// Scenario 6 (adapted): a dashboard client with a full outbound queue
/// is cut on broadcast, while the snapshot itself still reflects live
/// cache/VQ state.
#[tokio::test]
async fn slow_dashboard_client_is_cut_others_unaffected() {
    let cache = Arc::new(cache());
    let vq = Arc::new(engine());
    cache.upsert("a1".into(), Department::Retention, Location::Frankfurt, "t1".into(), AgentState::Available, 0.0);
    vq.enqueue("retention_standard", Some("c1".into())).unwrap();

    let metrics = Arc::new(Metrics::new());
    let hub = DashboardHub::new(metrics, 300, 1);

    let (_slow_id, mut slow_rx) = hub.connect(AllowedLocations::All);
    let (_fast_id, mut fast_rx) = hub.connect(AllowedLocations::All);
    // drain the initial history envelopes so the next broadcast is what
    // fills (and overflows) the slow client's single-slot queue.
    let _ = slow_rx.recv().await;
    let _ = fast_rx.recv().await;

    let thresholds = AlertThresholds { acw_secs: 300.0, break_secs: 600.0 };
    let snap1 = build_snapshot(&cache, &vq, &thresholds);
    hub.broadcast(snap1).await;
    let snap2 = build_snapshot(&cache, &vq, &thresholds);
    hub.broadcast(snap2).await;

    assert_eq!(hub.client_count(), 1);
    assert!(fast_rx.recv().await.is_some());
}

/// Per-client filtering on a snapshot keeps every department present
/// even when the client's allowed-locations set matches nobody.
#[test]
fn filter_with_no_matching_locations_keeps_department_shape() {
    let cache = cache();
    let vq = engine();
    cache.upsert("a1".into(), Department::Sales, Location::Berlin, "t1".into(), AgentState::Available, 0.0);

    let thresholds = AlertThresholds { acw_secs: 300.0, break_secs: 600.0 };
    let snapshot = build_snapshot(&cache, &vq, &thresholds);

    let mut nobody = HashSet::new();
    nobody.insert(Location::Remote);
    let filtered = monti_core::dashboard::filter::filter_snapshot(&snapshot, &AllowedLocations::Set(nobody));

    let dept = &filtered.departments[&Department::Sales];
    assert!(dept.agents.is_empty());
    assert_eq!(*dept.summary.state_breakdown.get(&AgentState::Available).unwrap_or(&0), 0);
}
