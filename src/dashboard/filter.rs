//! Per-client RBAC filtering, as a pure function of `(snapshot,
//! allowed-locations)`. Applied both to the live broadcast and to each
//! entry in the replay history sent on connect.

use crate::identity::AllowedLocations;
use crate::snapshot::{DepartmentSnapshot, DepartmentSummary, Snapshot};

/// Keeps only agents whose location is in `allowed`, recomputes the
/// department summary from the filtered list, and leaves VQ summaries
/// untouched (they're departmental aggregates, not agent-scoped). A
/// department whose filtered list is empty still appears, with empty
/// lists, so the UI-stable shape holds even for a client with no
/// matching locations.
pub fn filter_snapshot(snapshot: &Snapshot, allowed: &AllowedLocations) -> Snapshot {
    let departments = snapshot
        .departments
        .iter()
        .map(|(dept, dept_snapshot)| {
            let agents: Vec<_> = dept_snapshot
                .agents
                .iter()
                .filter(|a| allowed.contains(a.location))
                .cloned()
                .collect();
            let summary = DepartmentSummary::from_agents(&agents);
            (
                *dept,
                DepartmentSnapshot {
                    agents,
                    queues: dept_snapshot.queues.clone(),
                    summary,
                },
            )
        })
        .collect();

    Snapshot {
        kind: snapshot.kind,
        timestamp: snapshot.timestamp,
        departments,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{AgentSnapshot, KpiSnapshot, VqSummary};
    use crate::types::{AgentState, ConnectionStatus, Department, Location};
    use chrono::Utc;
    use std::collections::{BTreeMap, HashSet};

    fn sample() -> Snapshot {
        let mut departments = BTreeMap::new();
        let agents = vec![
            AgentSnapshot {
                agent_id: "a1".into(),
                location: Location::Berlin,
                team: "t1".into(),
                state: AgentState::Available,
                state_duration_secs: 0.0,
                connection_status: ConnectionStatus::Connected,
                current_call_id: None,
                kpis: KpiSnapshot::default(),
            },
            AgentSnapshot {
                agent_id: "a2".into(),
                location: Location::Munich,
                team: "t1".into(),
                state: AgentState::OnCall,
                state_duration_secs: 0.0,
                connection_status: ConnectionStatus::Connected,
                current_call_id: Some("c1".into()),
                kpis: KpiSnapshot::default(),
            },
        ];
        let summary = DepartmentSummary::from_agents(&agents);
        departments.insert(
            Department::Sales,
            DepartmentSnapshot {
                agents,
                queues: Vec::<VqSummary>::new(),
                summary,
            },
        );
        Snapshot {
            kind: "snapshot",
            timestamp: Utc::now(),
            departments,
        }
    }

    #[test]
    fn filters_by_allowed_location_and_recomputes_summary() {
        let snapshot = sample();
        let mut set = HashSet::new();
        set.insert(Location::Berlin);
        let filtered = filter_snapshot(&snapshot, &AllowedLocations::Set(set));
        let dept = &filtered.departments[&Department::Sales];
        assert_eq!(dept.agents.len(), 1);
        assert_eq!(dept.agents[0].agent_id, "a1");
        assert_eq!(dept.summary.location_breakdown.get(&Location::Berlin), Some(&1));
        assert_eq!(dept.summary.location_breakdown.get(&Location::Munich), None);
    }

    #[test]
    fn empty_allowed_set_keeps_department_with_empty_lists() {
        let snapshot = sample();
        let filtered = filter_snapshot(&snapshot, &AllowedLocations::Set(HashSet::new()));
        let dept = &filtered.departments[&Department::Sales];
        assert!(dept.agents.is_empty());
        assert!(filtered.departments.contains_key(&Department::Sales));
    }

    #[test]
    fn all_locations_keeps_everyone() {
        let snapshot = sample();
        let filtered = filter_snapshot(&snapshot, &AllowedLocations::All);
        assert_eq!(filtered.departments[&Department::Sales].agents.len(), 2);
    }
}
