pub mod hub;
pub mod protocol;

pub use hub::{run_agent_session, SessionRegistry};
pub use protocol::{AgentInbound, AgentOutbound};
