//! Configuration for the MONTI core.
//!
//! Grouped into general / routing / queue sub-structs, with every
//! numeric default matching the monitored call-center's operating
//! parameters. CLI parsing and on-disk config file loading are
//! external-collaborator concerns — this struct is built in code via
//! `Default` or struct-update syntax.

use std::time::Duration;

/// Top-level configuration bundle.
#[derive(Debug, Clone)]
pub struct MontiConfig {
    pub general: GeneralConfig,
    pub routing: RoutingConfig,
    pub queue: QueueConfig,
    pub dashboard: DashboardConfig,
}

impl Default for MontiConfig {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            routing: RoutingConfig::default(),
            queue: QueueConfig::default(),
            dashboard: DashboardConfig::default(),
        }
    }
}

/// Networking and liveness knobs.
#[derive(Debug, Clone)]
pub struct GeneralConfig {
    pub bind_addr: String,
    /// Interval at which agents are expected to heartbeat.
    pub heartbeat_period: Duration,
    /// Multiplier applied to `heartbeat_period` to decide staleness.
    pub stale_multiplier: u32,
    /// How often the stale-sweep runs over the agent cache.
    pub stale_sweep_period: Duration,
    /// Ping interval on agent session writers.
    pub ping_period: Duration,
    /// Read deadline on agent session readers.
    pub read_timeout: Duration,
    /// Bound on each per-session outbound queue (agent side).
    pub agent_outbound_capacity: usize,
}

impl GeneralConfig {
    pub fn stale_threshold(&self) -> Duration {
        self.heartbeat_period * self.stale_multiplier
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            heartbeat_period: Duration::from_secs(2),
            stale_multiplier: 3,
            stale_sweep_period: Duration::from_secs(2),
            ping_period: Duration::from_secs(20),
            read_timeout: Duration::from_secs(30),
            agent_outbound_capacity: 64,
        }
    }
}

/// Routing-tick and service-level knobs.
#[derive(Debug, Clone)]
pub struct RoutingConfig {
    /// Cadence for both the routing tick and the snapshot aggregation tick.
    pub tick_period: Duration,
    pub sl_target: f64,
    pub sl_threshold_secs: f64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            tick_period: Duration::from_secs(1),
            sl_target: 80.0,
            sl_threshold_secs: 20.0,
        }
    }
}

/// Processor channel and VQ sizing knobs.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub register_channel_capacity: usize,
    pub heartbeat_channel_capacity: usize,
    pub state_change_channel_capacity: usize,
    pub call_complete_channel_capacity: usize,
    pub disconnect_channel_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            register_channel_capacity: 100,
            heartbeat_channel_capacity: 1000,
            state_change_channel_capacity: 500,
            call_complete_channel_capacity: 500,
            disconnect_channel_capacity: 256,
        }
    }
}

/// Dashboard hub knobs.
#[derive(Debug, Clone)]
pub struct DashboardConfig {
    pub outbound_capacity: usize,
    pub history_capacity: usize,
    pub acw_alert_threshold: Duration,
    pub break_alert_threshold: Duration,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: 256,
            history_capacity: 300,
            acw_alert_threshold: Duration::from_secs(5 * 60),
            break_alert_threshold: Duration::from_secs(10 * 60),
        }
    }
}
