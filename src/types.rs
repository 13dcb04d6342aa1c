//! Shared wire-adjacent types: identity enums, the agent state machine,
//! and the small newtypes used as map keys throughout the crate.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An agent-id, as supplied by the agent simulator or real agent client.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for AgentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The four departments in the call center. Every [`crate::vq::VqEngine`]
/// queue belongs to exactly one of these, and every [`crate::snapshot::Snapshot`]
/// groups agents and queues by this key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Department {
    Sales,
    Support,
    Technical,
    Retention,
}

impl Department {
    /// Fixed department order used by the routing tick and by snapshot
    /// construction — deterministic, never reshuffled at runtime.
    pub const ALL: [Department; 4] = [
        Department::Sales,
        Department::Support,
        Department::Technical,
        Department::Retention,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Department::Sales => "sales",
            Department::Support => "support",
            Department::Technical => "technical",
            Department::Retention => "retention",
        }
    }
}

impl fmt::Display for Department {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Office locations an agent can be staffed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Location {
    Berlin,
    Munich,
    Hamburg,
    Frankfurt,
    Remote,
}

impl Location {
    pub const ALL: [Location; 5] = [
        Location::Berlin,
        Location::Munich,
        Location::Hamburg,
        Location::Frankfurt,
        Location::Remote,
    ];
}

/// The agent state machine. KPI recomputation rules (see
/// [`crate::processor`]) are keyed off *which* state an agent is leaving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Available,
    OnCall,
    AfterCallWork,
    OnHold,
    Transferring,
    Conference,
    Break,
    Lunch,
    Meeting,
    Training,
    Offline,
}

/// Liveness as tracked by the agent-state cache's stale sweep. Distinct
/// from `AgentState`: a `stale` agent can still be mid-call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connected,
    Stale,
    Disconnected,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn department_serializes_snake_case() {
        let v = serde_json::to_string(&Department::Technical).unwrap();
        assert_eq!(v, "\"technical\"");
    }

    #[test]
    fn agent_id_map_key_roundtrip() {
        use std::collections::BTreeMap;
        let mut m: BTreeMap<AgentId, u32> = BTreeMap::new();
        m.insert(AgentId::from("a1"), 1);
        assert_eq!(m.get(&AgentId::from("a1")), Some(&1));
    }
}
