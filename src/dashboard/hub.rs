//! The dashboard hub: owns the set of dashboard sessions, the replay
//! history, and the broadcast/cut logic.
//!
//! The client set is a `parking_lot::RwLock` — a read-lock over it
//! during broadcast (cloning out the small per-client handles, not
//! holding the lock across any send), a write-lock for connect/disconnect,
//! matching the concurrency discipline: no lock is ever held across an
//! I/O suspension point.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use crate::dashboard::filter::filter_snapshot;
use crate::dashboard::history::SnapshotHistory;
use crate::identity::AllowedLocations;
use crate::metrics::Metrics;
use crate::snapshot::Snapshot;

#[derive(Serialize)]
struct SnapshotHistoryEnvelope {
    #[serde(rename = "type")]
    kind: &'static str,
    snapshots: Vec<Snapshot>,
}

struct DashboardClient {
    outbound_tx: mpsc::Sender<String>,
    allowed_locations: AllowedLocations,
    last_activity: Instant,
}

/// Owns every connected dashboard session plus the bounded replay ring.
pub struct DashboardHub {
    clients: RwLock<HashMap<Uuid, DashboardClient>>,
    history: Mutex<SnapshotHistory>,
    metrics: Arc<Metrics>,
    outbound_capacity: usize,
}

impl DashboardHub {
    pub fn new(metrics: Arc<Metrics>, history_capacity: usize, outbound_capacity: usize) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            history: Mutex::new(SnapshotHistory::new(history_capacity)),
            metrics,
            outbound_capacity,
        }
    }

    /// Registers a new dashboard session and immediately enqueues its
    /// `snapshot_history` envelope, filtered for this client. Returns the
    /// client-id and the receiving half of its outbound queue, which the
    /// caller's writer task drains.
    pub fn connect(&self, allowed_locations: AllowedLocations) -> (Uuid, mpsc::Receiver<String>) {
        let (outbound_tx, outbound_rx) = mpsc::channel(self.outbound_capacity);
        let client_id = Uuid::new_v4();

        let filtered: Vec<Snapshot> = {
            let history = self.history.lock();
            history
                .snapshots()
                .iter()
                .map(|s| filter_snapshot(s, &allowed_locations))
                .collect()
        };
        if let Ok(json) = serde_json::to_string(&SnapshotHistoryEnvelope {
            kind: "snapshot_history",
            snapshots: filtered,
        }) {
            let _ = outbound_tx.try_send(json);
        }

        self.clients.write().insert(
            client_id,
            DashboardClient {
                outbound_tx,
                allowed_locations,
                last_activity: Instant::now(),
            },
        );
        Metrics::inc(&self.metrics.dashboard_clients_active);
        (client_id, outbound_rx)
    }

    pub fn disconnect(&self, client_id: Uuid) {
        if self.clients.write().remove(&client_id).is_some() {
            Metrics::dec(&self.metrics.dashboard_clients_active);
        }
    }

    pub fn touch(&self, client_id: Uuid) {
        if let Some(client) = self.clients.write().get_mut(&client_id) {
            client.last_activity = Instant::now();
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }

    /// Appends `snapshot` to the replay history, then pushes a filtered
    /// copy to every connected client. A client whose outbound queue is
    /// full is cut: removed from the set and its session closed by the
    /// dropped sender (the writer task's `recv()` returns `None`).
    pub async fn broadcast(&self, snapshot: Snapshot) {
        self.history.lock().push(snapshot.clone());

        let recipients: Vec<(Uuid, mpsc::Sender<String>, AllowedLocations)> = self
            .clients
            .read()
            .iter()
            .map(|(id, c)| (*id, c.outbound_tx.clone(), c.allowed_locations.clone()))
            .collect();

        let mut cut = Vec::new();
        for (client_id, outbound_tx, allowed) in recipients {
            let filtered = filter_snapshot(&snapshot, &allowed);
            let Ok(json) = serde_json::to_string(&filtered) else {
                continue;
            };
            if outbound_tx.try_send(json).is_err() {
                cut.push(client_id);
            }
        }

        if !cut.is_empty() {
            let mut clients = self.clients.write();
            for client_id in &cut {
                clients.remove(client_id);
                warn!(%client_id, "dashboard client outbound queue full, cutting session");
                Metrics::inc(&self.metrics.dashboard_slow_client_cuts_total);
                Metrics::dec(&self.metrics.dashboard_clients_active);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Location;
    use std::collections::BTreeMap;

    fn metrics() -> Arc<Metrics> {
        Arc::new(Metrics::new())
    }

    fn empty_snapshot() -> Snapshot {
        Snapshot {
            kind: "snapshot",
            timestamp: chrono::Utc::now(),
            departments: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn connect_receives_history_envelope_immediately() {
        let hub = DashboardHub::new(metrics(), 300, 8);
        hub.broadcast(empty_snapshot()).await;
        let (_, mut rx) = hub.connect(AllowedLocations::All);
        let first = rx.recv().await.unwrap();
        assert!(first.contains("snapshot_history"));
    }

    #[tokio::test]
    async fn slow_client_is_cut_on_full_queue() {
        let hub = DashboardHub::new(metrics(), 300, 1);
        let (client_id, mut rx) = hub.connect(AllowedLocations::All);
        // drain the initial history envelope so the queue is empty and
        // capacity 1 is entirely consumed by the next two broadcasts.
        let _ = rx.recv().await;
        hub.broadcast(empty_snapshot()).await;
        hub.broadcast(empty_snapshot()).await;
        assert_eq!(hub.client_count(), 0);
        let _ = client_id;
    }
}
