//! MONTI core: the live control plane between a fleet of agent sessions
//! and a set of dashboard clients. See [`server::run`] for the process
//! entry point; the modules below are the four subsystems plus the
//! external-collaborator adapters that bind them together.

pub mod admin;
pub mod agent;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod identity;
pub mod logging;
pub mod metrics;
pub mod persistence;
pub mod processor;
pub mod server;
pub mod session;
pub mod snapshot;
pub mod types;
pub mod vq;

pub use config::MontiConfig;
pub use error::{MontiError, Result};
pub use server::{AppState, run};
