//! `AgentGroup`: selector-based bundle of configs applied to matching
//! agents (`# 3 AgentGroup`, `# 4.2`).

use super::agent::Agent;
use super::common::{AttributeMap, Condition, StorageCommon};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selector {
    pub identifying_attributes: AttributeMap,
    pub non_identifying_attributes: AttributeMap,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentGroupMetadata {
    pub name: String,
    pub priority: i64,
    pub selector: Selector,
    pub attributes: AttributeMap,
}

/// Raw wire shape for a group's remote-config list entry, as received from
/// the Admin API before validation (`# 4.2` resolution rules #3/#4).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawAgentRemoteConfigEntry {
    pub reference: Option<String>,
    pub inline_name: Option<String>,
    pub inline_value: Option<Vec<u8>>,
    pub inline_content_type: Option<String>,
}

/// A tagged variant with exactly two cases, validated total
/// (`# 9 Design Notes`: dynamic dispatch over `Ref` vs `Inline`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentRemoteConfigEntry {
    Ref(String),
    Inline {
        name: String,
        value: Vec<u8>,
        content_type: String,
    },
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AgentRemoteConfigEntryError {
    #[error("remote config entry must set exactly one of `reference` or `inline`, got neither")]
    Neither,
    #[error("remote config entry must set exactly one of `reference` or `inline`, got both")]
    Both,
}

impl TryFrom<RawAgentRemoteConfigEntry> for AgentRemoteConfigEntry {
    type Error = AgentRemoteConfigEntryError;

    fn try_from(raw: RawAgentRemoteConfigEntry) -> Result<Self, Self::Error> {
        let has_ref = raw.reference.is_some();
        let has_inline = raw.inline_name.is_some() || raw.inline_value.is_some();
        match (has_ref, has_inline) {
            (true, true) => Err(AgentRemoteConfigEntryError::Both),
            (false, false) => Err(AgentRemoteConfigEntryError::Neither),
            (true, false) => Ok(AgentRemoteConfigEntry::Ref(raw.reference.unwrap())),
            (false, true) => Ok(AgentRemoteConfigEntry::Inline {
                name: raw.inline_name.unwrap_or_default(),
                value: raw.inline_value.unwrap_or_default(),
                content_type: raw.inline_content_type.unwrap_or_default(),
            }),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentGroupSpec {
    pub agent_remote_configs: Vec<AgentRemoteConfigEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentGroupStatus {
    pub conditions: Vec<Condition>,
}

/// Aggregate counts, computed on demand rather than stored
/// (`# 3 AgentGroup Status`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AgentGroupCounts {
    pub num_agents: u64,
    pub num_connected_agents: u64,
    pub num_healthy_agents: u64,
    pub num_unhealthy_agents: u64,
    pub num_not_connected_agents: u64,
}

impl AgentGroupCounts {
    /// Folds a group's matching agents into the five aggregate counts
    /// (`# 3 AgentGroup Status`). An agent with no reported
    /// `ComponentHealth` counts as unhealthy: the group view has no basis
    /// to call it healthy.
    pub fn compute<'a>(agents: impl IntoIterator<Item = &'a Agent>) -> Self {
        let mut counts = Self::default();
        for agent in agents {
            counts.num_agents += 1;
            if agent.status.connected {
                counts.num_connected_agents += 1;
            } else {
                counts.num_not_connected_agents += 1;
            }
            match &agent.status.component_health {
                Some(health) if health.healthy => counts.num_healthy_agents += 1,
                _ => counts.num_unhealthy_agents += 1,
            }
        }
        counts
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentGroup {
    pub metadata: AgentGroupMetadata,
    pub spec: AgentGroupSpec,
    pub status: AgentGroupStatus,
    pub deleted_at: Option<DateTime<Utc>>,
    pub common: StorageCommon,
}

impl AgentGroup {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Ordering used by `GroupsForAgent` (`# 4.2`): priority descending, then
/// name ascending to break ties.
pub fn group_ordering_key(group: &AgentGroup) -> (std::cmp::Reverse<i64>, String) {
    (
        std::cmp::Reverse(group.metadata.priority),
        group.metadata.name.clone(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::ComponentHealth;
    use crate::domain::InstanceUid;

    fn agent(connected: bool, healthy: Option<bool>) -> Agent {
        let mut agent = Agent::new(InstanceUid::new_random());
        agent.status.connected = connected;
        agent.status.component_health = healthy.map(|h| ComponentHealth {
            healthy: h,
            status: String::new(),
            status_time: None,
            error_message: None,
            components: Default::default(),
        });
        agent
    }

    #[test]
    fn counts_partition_connected_and_healthy_agents() {
        let agents = vec![
            agent(true, Some(true)),
            agent(true, Some(false)),
            agent(false, None),
        ];
        let counts = AgentGroupCounts::compute(&agents);
        assert_eq!(counts.num_agents, 3);
        assert_eq!(counts.num_connected_agents, 2);
        assert_eq!(counts.num_not_connected_agents, 1);
        assert_eq!(counts.num_healthy_agents, 1);
        assert_eq!(counts.num_unhealthy_agents, 2);
    }

    #[test]
    fn counts_of_no_agents_are_all_zero() {
        let counts = AgentGroupCounts::compute(&[]);
        assert_eq!(counts, AgentGroupCounts::default());
    }
}
