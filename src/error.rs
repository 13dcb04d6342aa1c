//! Error types for the MONTI core.
//!
//! Faults in agent or dashboard sessions are local: they are logged at
//! their origin and never propagate past the task that produced them
//! (see the recovery policy in the component design). `MontiError` exists
//! for the handful of call sites that do need a typed `Result` — admin
//! API handlers, engine construction, and the VQ engine's own fallible
//! operations (enqueue of an unknown VQ, completing an unknown call).

use thiserror::Error;

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum MontiError {
    /// The underlying transport for a session faulted (read/write error, timeout).
    #[error("transport error: {0}")]
    Transport(String),

    /// An inbound frame could not be decoded, or was missing a required field.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A message referenced an agent-id or call-id the core has no record of.
    #[error("not found: {0}")]
    NotFound(String),

    /// A bounded queue (processor channel, outbound queue) was full.
    #[error("capacity exceeded: {0}")]
    Capacity(String),

    /// An operation would have violated a data-model invariant.
    #[error("invariant violation: {0}")]
    Invariant(String),

    /// A routing tick could not complete an assignment.
    #[error("routing error: {0}")]
    Routing(String),

    /// A configuration value was invalid at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Anything else, with context.
    #[error("internal error: {0}")]
    Internal(String),
}

impl MontiError {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn capacity(msg: impl Into<String>) -> Self {
        Self::Capacity(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::Invariant(msg.into())
    }

    pub fn routing(msg: impl Into<String>) -> Self {
        Self::Routing(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, MontiError>;
