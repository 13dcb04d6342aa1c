//! Persistence shim.
//!
//! Completed/abandoned calls and daily aggregates are emitted to an
//! external store; the core never reloads them. This module is only the
//! seam — shaped after a `DatabaseManager`-style sink but without
//! `sqlx`, since the store itself is out of scope here.

use async_trait::async_trait;
use tracing::debug;

use crate::vq::Call;

/// Destination for terminal call records. Implementations live outside
/// this crate; [`NullSink`] is the default used when no external store
/// is wired up (e.g. in tests).
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    async fn record_call(&self, call: &Call);
}

/// Discards everything, at `debug` level. Safe default for in-memory
/// operation and for unit/integration tests that don't care about the
/// external store.
#[derive(Debug, Default)]
pub struct NullSink;

#[async_trait]
impl PersistenceSink for NullSink {
    async fn record_call(&self, call: &Call) {
        debug!(call_id = %call.call_id, status = ?call.status, "dropping completed call (no persistence sink configured)");
    }
}
