//! In-memory reference adapter for [`PersistencePort`].
//!
//! Not a production backend — the real document store is an external
//! collaborator (`# 1 Non-goals`) — but it honors the same contract
//! (compare-and-set on `Version`, cursor pagination) so components and
//! scenario tests can run without one, mirroring the teacher's
//! `InMemoryConfigRepository` test double.

use super::mapper;
use super::port::{PersistencePort, SelectorQuery};
use crate::domain::agent::Agent;
use crate::domain::common::{is_subset, ListOptions, Page};
use crate::domain::group::AgentGroup;
use crate::domain::remote_config::AgentRemoteConfig;
use crate::domain::server::Server;
use crate::domain::InstanceUid;
use crate::error::CommanderError;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Round-trips a record through its document-store entity encoding before
/// it lands in the table, so the C6 mapper stays exercised even though the
/// table itself holds domain structs, not bytes (`# 4.6`).
fn through_agent_entity(agent: Agent) -> Result<Agent, CommanderError> {
    mapper::entity_to_agent(mapper::agent_to_entity(&agent))
}

fn through_group_entity(group: AgentGroup) -> Result<AgentGroup, CommanderError> {
    mapper::entity_to_group(mapper::group_to_entity(&group)?)
}

fn through_remote_config_entity(config: AgentRemoteConfig) -> AgentRemoteConfig {
    mapper::entity_to_remote_config(mapper::remote_config_to_entity(&config))
}

fn through_server_entity(server: Server) -> Server {
    mapper::entity_to_server(mapper::server_to_entity(&server))
}

fn next_id(counter: &AtomicU64) -> String {
    format!("{:020}", counter.fetch_add(1, Ordering::SeqCst))
}

fn paginate<T: Clone>(items: &BTreeMap<String, T>, options: ListOptions) -> Page<T> {
    let start = match &options.continue_token {
        Some(token) => items
            .range(token.clone()..)
            .next()
            .map(|(k, _)| k.clone())
            .unwrap_or_else(|| "\u{10ffff}".repeat(1)),
        None => items.keys().next().cloned().unwrap_or_default(),
    };
    let limit = options.limit.unwrap_or(i64::MAX).max(0) as usize;

    let mut iter = items.range(start..).peekable();
    let mut out = Vec::new();
    let mut last_key = None;
    while out.len() < limit {
        match iter.next() {
            Some((k, v)) => {
                out.push(v.clone());
                last_key = Some(k.clone());
            }
            None => break,
        }
    }
    let continue_token = if iter.peek().is_some() {
        last_key.map(|k| {
            let mut bytes = k.into_bytes();
            bytes.push(0);
            String::from_utf8_lossy(&bytes).to_string()
        })
    } else {
        None
    };
    Page {
        remaining_item_count: Some(iter.count() as i64),
        items: out,
        continue_token,
    }
}

#[derive(Default)]
struct Store {
    agents: BTreeMap<String, Agent>,
    agent_index: BTreeMap<InstanceUid, String>,
    groups: BTreeMap<String, AgentGroup>,
    remote_configs: BTreeMap<String, AgentRemoteConfig>,
    servers: BTreeMap<String, Server>,
    agent_ids: AtomicU64,
    group_ids: AtomicU64,
    config_ids: AtomicU64,
    server_ids: AtomicU64,
}

pub struct InMemoryStore {
    inner: Mutex<Store>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Store::default()),
        }
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PersistencePort for InMemoryStore {
    fn get_agent(&self, instance_uid: InstanceUid) -> Result<Option<Agent>, CommanderError> {
        let store = self.inner.lock().unwrap();
        Ok(store
            .agent_index
            .get(&instance_uid)
            .and_then(|id| store.agents.get(id))
            .cloned())
    }

    fn put_agent(&self, agent: &Agent) -> Result<Agent, CommanderError> {
        let mut store = self.inner.lock().unwrap();
        let uid = agent.metadata.instance_uid;
        let mut agent = agent.clone();

        if let Some(id) = store.agent_index.get(&uid).cloned() {
            let existing = store.agents.get(&id).expect("index/table desync");
            // A caller that never read the record (version 0) performs a
            // blind upsert; one that did read it must match the version it
            // saw, or the write is stale (`# 5` compare-and-set on Version).
            if agent.common.version != 0 && agent.common.version != existing.common.version {
                return Err(CommanderError::StaleVersion {
                    expected: agent.common.version,
                    found: existing.common.version,
                });
            }
            agent.common.id = Some(id.clone());
            agent.common.version = existing.common.version + 1;
            agent = through_agent_entity(agent)?;
            store.agents.insert(id, agent.clone());
        } else {
            let id = next_id(&store.agent_ids);
            agent.common.id = Some(id.clone());
            agent.common.version = 1;
            agent = through_agent_entity(agent)?;
            store.agent_index.insert(uid, id.clone());
            store.agents.insert(id, agent.clone());
        }
        Ok(agent)
    }

    fn list_agents(&self, options: ListOptions) -> Result<Page<Agent>, CommanderError> {
        let store = self.inner.lock().unwrap();
        Ok(paginate(&store.agents, options))
    }

    fn list_agents_by_selector(
        &self,
        selector: SelectorQuery,
        options: ListOptions,
    ) -> Result<Page<Agent>, CommanderError> {
        let store = self.inner.lock().unwrap();
        let filtered: BTreeMap<String, Agent> = store
            .agents
            .iter()
            .filter(|(_, a)| {
                is_subset(
                    &selector.identifying_attributes,
                    &a.metadata.description.identifying_attributes,
                ) && is_subset(
                    &selector.non_identifying_attributes,
                    &a.metadata.description.non_identifying_attributes,
                )
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(paginate(&filtered, options))
    }

    fn search_agents(&self, query: &str, options: ListOptions) -> Result<Page<Agent>, CommanderError> {
        let store = self.inner.lock().unwrap();
        let needle = query.to_lowercase();
        let filtered: BTreeMap<String, Agent> = store
            .agents
            .iter()
            .filter(|(_, a)| {
                a.metadata.instance_uid.to_string().to_lowercase().contains(&needle)
                    || a.metadata
                        .description
                        .identifying_attributes
                        .values()
                        .any(|v| v.to_lowercase().contains(&needle))
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(paginate(&filtered, options))
    }

    fn get_agent_group(&self, name: &str) -> Result<Option<AgentGroup>, CommanderError> {
        let store = self.inner.lock().unwrap();
        Ok(store.groups.values().find(|g| g.metadata.name == name).cloned())
    }

    fn put_agent_group(&self, group: &AgentGroup) -> Result<AgentGroup, CommanderError> {
        let mut store = self.inner.lock().unwrap();
        let mut group = group.clone();
        let existing_id = store
            .groups
            .iter()
            .find(|(_, g)| g.metadata.name == group.metadata.name)
            .map(|(id, _)| id.clone());
        match existing_id {
            Some(id) => {
                let existing = store.groups.get(&id).unwrap();
                if group.common.version != 0 && group.common.version != existing.common.version {
                    return Err(CommanderError::StaleVersion {
                        expected: group.common.version,
                        found: existing.common.version,
                    });
                }
                group.common.id = Some(id.clone());
                group.common.version = existing.common.version + 1;
                group = through_group_entity(group)?;
                store.groups.insert(id, group.clone());
            }
            None => {
                let id = next_id(&store.group_ids);
                group.common.id = Some(id.clone());
                group.common.version = 1;
                group = through_group_entity(group)?;
                store.groups.insert(id, group.clone());
            }
        }
        Ok(group)
    }

    fn list_agent_groups(&self, options: ListOptions) -> Result<Page<AgentGroup>, CommanderError> {
        let store = self.inner.lock().unwrap();
        Ok(paginate(&store.groups, options))
    }

    fn get_agent_remote_config(
        &self,
        name: &str,
    ) -> Result<Option<AgentRemoteConfig>, CommanderError> {
        let store = self.inner.lock().unwrap();
        Ok(store
            .remote_configs
            .values()
            .find(|c| c.name == name)
            .cloned())
    }

    fn put_agent_remote_config(
        &self,
        config: &AgentRemoteConfig,
    ) -> Result<AgentRemoteConfig, CommanderError> {
        let mut store = self.inner.lock().unwrap();
        let mut config = config.clone();
        let existing_id = store
            .remote_configs
            .iter()
            .find(|(_, c)| c.name == config.name)
            .map(|(id, _)| id.clone());
        match existing_id {
            Some(id) => {
                let existing = store.remote_configs.get(&id).unwrap();
                if config.common.version != 0 && config.common.version != existing.common.version {
                    return Err(CommanderError::StaleVersion {
                        expected: config.common.version,
                        found: existing.common.version,
                    });
                }
                config.common.id = Some(id.clone());
                config.common.version = existing.common.version + 1;
                config = through_remote_config_entity(config);
                store.remote_configs.insert(id, config.clone());
            }
            None => {
                let id = next_id(&store.config_ids);
                config.common.id = Some(id.clone());
                config.common.version = 1;
                config = through_remote_config_entity(config);
                store.remote_configs.insert(id, config.clone());
            }
        }
        Ok(config)
    }

    fn list_agent_remote_configs(
        &self,
        options: ListOptions,
    ) -> Result<Page<AgentRemoteConfig>, CommanderError> {
        let store = self.inner.lock().unwrap();
        Ok(paginate(&store.remote_configs, options))
    }

    fn get_server(&self, id: &str) -> Result<Option<Server>, CommanderError> {
        let store = self.inner.lock().unwrap();
        Ok(store.servers.values().find(|s| s.id == id).cloned())
    }

    fn put_server(&self, server: &Server) -> Result<Server, CommanderError> {
        let mut store = self.inner.lock().unwrap();
        let mut server = server.clone();
        let existing_id = store
            .servers
            .iter()
            .find(|(_, s)| s.id == server.id)
            .map(|(id, _)| id.clone());
        match existing_id {
            Some(id) => {
                let existing = store.servers.get(&id).unwrap();
                if server.common.version != 0 && server.common.version != existing.common.version {
                    return Err(CommanderError::StaleVersion {
                        expected: server.common.version,
                        found: existing.common.version,
                    });
                }
                server.common.id = Some(id.clone());
                server.common.version = existing.common.version + 1;
                server = through_server_entity(server);
                store.servers.insert(id, server.clone());
            }
            None => {
                let id = next_id(&store.server_ids);
                server.common.id = Some(id.clone());
                server.common.version = 1;
                server = through_server_entity(server);
                store.servers.insert(id, server.clone());
            }
        }
        Ok(server)
    }

    fn list_servers(&self, options: ListOptions) -> Result<Page<Server>, CommanderError> {
        let store = self.inner.lock().unwrap();
        Ok(paginate(&store.servers, options))
    }
}
