//! Persistence Port (`# 6 EXTERNAL INTERFACES`): CRUD on Agent / AgentGroup
//! / AgentRemoteConfig / Server, consumed by C1, C2, C4, C6.

use crate::domain::agent::Agent;
use crate::domain::common::{AttributeMap, ListOptions, Page};
use crate::domain::group::AgentGroup;
use crate::domain::remote_config::AgentRemoteConfig;
use crate::domain::server::Server;
use crate::domain::InstanceUid;
use crate::error::CommanderError;

/// A selector predicate pushed down to the store when identifying
/// attributes are present (`# 4.1 ListAgentsBySelector`); falls back to
/// fetch-and-filter otherwise.
#[derive(Debug, Clone, Default)]
pub struct SelectorQuery {
    pub identifying_attributes: AttributeMap,
    pub non_identifying_attributes: AttributeMap,
}

#[cfg_attr(test, mockall::automock)]
pub trait PersistencePort: Send + Sync {
    fn get_agent(&self, instance_uid: InstanceUid) -> Result<Option<Agent>, CommanderError>;
    fn put_agent(&self, agent: &Agent) -> Result<Agent, CommanderError>;
    fn list_agents(&self, options: ListOptions) -> Result<Page<Agent>, CommanderError>;
    fn list_agents_by_selector(
        &self,
        selector: SelectorQuery,
        options: ListOptions,
    ) -> Result<Page<Agent>, CommanderError>;
    fn search_agents(&self, query: &str, options: ListOptions) -> Result<Page<Agent>, CommanderError>;

    fn get_agent_group(&self, name: &str) -> Result<Option<AgentGroup>, CommanderError>;
    fn put_agent_group(&self, group: &AgentGroup) -> Result<AgentGroup, CommanderError>;
    fn list_agent_groups(&self, options: ListOptions) -> Result<Page<AgentGroup>, CommanderError>;

    fn get_agent_remote_config(
        &self,
        name: &str,
    ) -> Result<Option<AgentRemoteConfig>, CommanderError>;
    fn put_agent_remote_config(
        &self,
        config: &AgentRemoteConfig,
    ) -> Result<AgentRemoteConfig, CommanderError>;
    fn list_agent_remote_configs(
        &self,
        options: ListOptions,
    ) -> Result<Page<AgentRemoteConfig>, CommanderError>;

    fn get_server(&self, id: &str) -> Result<Option<Server>, CommanderError>;
    fn put_server(&self, server: &Server) -> Result<Server, CommanderError>;
    fn list_servers(&self, options: ListOptions) -> Result<Page<Server>, CommanderError>;
}
