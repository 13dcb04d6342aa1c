//! Wire-shaped agent messages. JSON objects tagged by `type`, matching
//! the table in the external-interfaces section: `register`, `heartbeat`,
//! `state_change`, `call_complete` inbound; `ack`, `call_assign`,
//! `force_end_call`, `force_disconnect` outbound.

use serde::{Deserialize, Serialize};

use crate::agent::Kpis;
use crate::types::{AgentState, Department, Location};

/// KPI fields as carried on the wire. Only `login_time_secs` is consumed
/// directly by the processor; the rest ride along for future
/// presentation use and are otherwise ignored (derived fields are never
/// trusted from the client, see the processor's recomputation rules).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WireKpis {
    #[serde(default)]
    pub login_time_secs: f64,
    #[serde(default)]
    pub total_calls: u64,
    #[serde(default)]
    pub avg_call_duration: f64,
}

impl From<WireKpis> for Kpis {
    fn from(w: WireKpis) -> Self {
        Kpis {
            login_time: w.login_time_secs,
            ..Kpis::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentInbound {
    Register {
        agent_id: String,
        department: Department,
        location: Location,
        team: String,
        state: AgentState,
        #[serde(default)]
        kpis: WireKpis,
    },
    Heartbeat {
        agent_id: String,
        state: AgentState,
        #[serde(default)]
        timestamp: Option<String>,
        #[serde(default)]
        kpis: WireKpis,
    },
    StateChange {
        agent_id: String,
        previous_state: AgentState,
        new_state: AgentState,
        #[serde(default)]
        timestamp: Option<String>,
        state_duration_secs: f64,
        #[serde(default)]
        kpis: WireKpis,
        #[serde(default)]
        department: Option<Department>,
        #[serde(default)]
        location: Option<Location>,
        #[serde(default)]
        team: Option<String>,
    },
    CallComplete {
        agent_id: String,
        call_id: String,
        talk_time_secs: f64,
        hold_time_secs: f64,
        #[serde(default)]
        timestamp: Option<String>,
    },
}

impl AgentInbound {
    pub fn agent_id(&self) -> &str {
        match self {
            AgentInbound::Register { agent_id, .. }
            | AgentInbound::Heartbeat { agent_id, .. }
            | AgentInbound::StateChange { agent_id, .. }
            | AgentInbound::CallComplete { agent_id, .. } => agent_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentOutbound {
    Ack {
        agent_id: String,
    },
    CallAssign {
        agent_id: String,
        call_id: String,
        vq: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    ForceEndCall {
        agent_id: String,
        call_id: String,
    },
    ForceDisconnect {
        agent_id: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_round_trips_through_json() {
        let msg = AgentInbound::Register {
            agent_id: "a1".into(),
            department: Department::Sales,
            location: Location::Berlin,
            team: "t1".into(),
            state: AgentState::Available,
            kpis: WireKpis::default(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"register\""));
        let back: AgentInbound = serde_json::from_str(&json).unwrap();
        assert_eq!(back.agent_id(), "a1");
    }

    #[test]
    fn call_assign_tags_correctly() {
        let msg = AgentOutbound::CallAssign {
            agent_id: "a1".into(),
            call_id: "c1".into(),
            vq: "sales_inbound".into(),
            timestamp: chrono::Utc::now(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"call_assign\""));
    }
}
