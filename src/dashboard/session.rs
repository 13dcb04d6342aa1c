//! The dashboard WebSocket endpoint. One reader task, one writer task;
//! the reader only exists to notice the socket closing (clients never
//! send application messages — the server tolerates and ignores
//! anything they do send) and to reset liveness bookkeeping.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tracing::debug;

use crate::dashboard::hub::DashboardHub;
use crate::identity::Claims;

pub async fn run_dashboard_session(socket: WebSocket, claims: Claims, hub: Arc<DashboardHub>) {
    let (client_id, mut outbound_rx) = hub.connect(claims.locations);
    let (mut ws_tx, mut ws_rx) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(json) = outbound_rx.recv().await {
            if ws_tx.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    while let Some(frame) = ws_rx.next().await {
        match frame {
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => hub.touch(client_id),
        }
    }

    debug!(principal = %claims.principal, "dashboard session closed");
    hub.disconnect(client_id);
    writer.abort();
}
