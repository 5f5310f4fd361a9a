//! AgentGroup Resolver (C2, `# 4.2`): resolves group-referenced configs
//! into concrete entries on matching agents.

use crate::domain::agent::Agent;
use crate::domain::common::{Condition, ConditionStatus, ListOptions, Page};
use crate::domain::group::{group_ordering_key, AgentGroup, AgentGroupCounts, AgentRemoteConfigEntry};
use crate::domain::common::AttributeMap;
use crate::error::CommanderError;
use crate::persistence::{PersistencePort, SelectorQuery};
use crate::reconciler::AgentReconciler;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::warn;

pub struct AgentGroupResolver {
    store: Arc<dyn PersistencePort>,
    reconciler: Arc<AgentReconciler>,
}

impl AgentGroupResolver {
    pub fn new(store: Arc<dyn PersistencePort>, reconciler: Arc<AgentReconciler>) -> Self {
        Self { store, reconciler }
    }

    pub fn get_agent_group(&self, name: &str) -> Result<Option<AgentGroup>, CommanderError> {
        self.store.get_agent_group(name)
    }

    pub fn list_agent_groups(&self, options: ListOptions) -> Result<Page<AgentGroup>, CommanderError> {
        self.store.list_agent_groups(options)
    }

    /// `Status.{NumAgents, NumConnectedAgents, NumHealthyAgents,
    /// NumUnhealthyAgents, NumNotConnectedAgents}`, computed on demand over
    /// every agent currently matching the group's selector (`# 3 AgentGroup
    /// Status`) rather than stored on the record.
    pub fn counts(&self, group: &AgentGroup) -> Result<AgentGroupCounts, CommanderError> {
        let mut agents = Vec::new();
        let mut continue_token = None;
        loop {
            let page = self.reconciler.list_agents_by_selector(
                Self::selector_query_for(group),
                ListOptions {
                    limit: None,
                    continue_token: continue_token.clone(),
                },
            )?;
            continue_token = page.continue_token.clone();
            agents.extend(page.items);
            if continue_token.is_none() {
                break;
            }
        }
        Ok(AgentGroupCounts::compute(&agents))
    }

    /// The read path a caller actually wants: the record plus its
    /// on-demand aggregate counts in one round trip.
    pub fn get_agent_group_with_counts(
        &self,
        name: &str,
    ) -> Result<Option<(AgentGroup, AgentGroupCounts)>, CommanderError> {
        let Some(group) = self.get_agent_group(name)? else {
            return Ok(None);
        };
        let counts = self.counts(&group)?;
        Ok(Some((group, counts)))
    }

    /// Validates that every entry is exactly-one-of `Ref`/`Inline` (already
    /// enforced at construction by `TryFrom`) before persisting
    /// (`# 4.2 Resolution rules #4`).
    pub fn save_agent_group(&self, group: &AgentGroup) -> Result<AgentGroup, CommanderError> {
        self.store.put_agent_group(group)
    }

    pub fn mark_deleted(&self, name: &str, at: DateTime<Utc>) -> Result<AgentGroup, CommanderError> {
        let mut group = self
            .store
            .get_agent_group(name)?
            .ok_or_else(|| CommanderError::NotFound(format!("agent group `{name}`")))?;
        group.deleted_at = Some(at);
        self.store.put_agent_group(&group)
    }

    fn selector_query_for(group: &AgentGroup) -> SelectorQuery {
        SelectorQuery {
            identifying_attributes: group.metadata.selector.identifying_attributes.clone(),
            non_identifying_attributes: group.metadata.selector.non_identifying_attributes.clone(),
        }
    }

    pub fn list_agents_by_group(
        &self,
        group: &AgentGroup,
        options: ListOptions,
    ) -> Result<Page<Agent>, CommanderError> {
        self.reconciler
            .list_agents_by_selector(Self::selector_query_for(group), options)
    }

    fn matches(selector_attrs: (&AttributeMap, &AttributeMap), agent: &Agent) -> bool {
        crate::domain::common::is_subset(selector_attrs.0, &agent.metadata.description.identifying_attributes)
            && crate::domain::common::is_subset(
                selector_attrs.1,
                &agent.metadata.description.non_identifying_attributes,
            )
    }

    /// `(Priority DESC, Name ASC)` over every non-deleted group whose
    /// selector is a subset of the agent's attributes (`# 4.2 GroupsForAgent`).
    pub fn groups_for_agent(&self, agent: &Agent) -> Result<Vec<AgentGroup>, CommanderError> {
        let mut matching = Vec::new();
        let mut continue_token = None;
        loop {
            let page = self.store.list_agent_groups(ListOptions {
                limit: None,
                continue_token: continue_token.clone(),
            })?;
            for group in page.items {
                if group.is_deleted() {
                    continue;
                }
                if Self::matches(
                    (
                        &group.metadata.selector.identifying_attributes,
                        &group.metadata.selector.non_identifying_attributes,
                    ),
                    agent,
                ) {
                    matching.push(group);
                }
            }
            match page.continue_token {
                Some(token) => continue_token = Some(token),
                None => break,
            }
        }
        matching.sort_by_key(group_ordering_key);
        Ok(matching)
    }

    /// Resolves one entry into `(configMap key, ConfigFile)`
    /// (`# 4.2 Resolution rules` #1/#2).
    fn resolve_entry(
        &self,
        group_name: &str,
        entry: &AgentRemoteConfigEntry,
    ) -> Result<(String, crate::domain::agent::ConfigFile), CommanderError> {
        match entry {
            AgentRemoteConfigEntry::Ref(name) => {
                let config = self
                    .store
                    .get_agent_remote_config(name)?
                    .ok_or_else(|| CommanderError::NotFound(format!("agent remote config `{name}`")))?;
                Ok((
                    name.clone(),
                    crate::domain::agent::ConfigFile {
                        body: config.spec.value,
                        content_type: config.spec.content_type,
                    },
                ))
            }
            AgentRemoteConfigEntry::Inline {
                name,
                value,
                content_type,
            } => Ok((
                format!("{group_name}/{name}"),
                crate::domain::agent::ConfigFile {
                    body: value.clone(),
                    content_type: content_type.clone(),
                },
            )),
        }
    }

    /// The central engine (`# 4.2 ReconcileGroup`): re-evaluates and
    /// re-applies the group's configs to its current matching set. A
    /// single agent's resolution failure is recorded as a condition and
    /// does not abort the loop.
    pub fn reconcile_group(&self, group: &AgentGroup) -> Result<AgentGroup, CommanderError> {
        let now = Utc::now();
        let mut failures = Vec::new();
        let mut continue_token = None;

        loop {
            let page = self.reconciler.list_agents_by_selector(
                Self::selector_query_for(group),
                ListOptions {
                    limit: None,
                    continue_token: continue_token.clone(),
                },
            )?;

            for mut agent in page.items {
                for entry in &group.spec.agent_remote_configs {
                    match self.resolve_entry(&group.metadata.name, entry) {
                        Ok((key, file)) => agent.spec.remote_config.set(key, file),
                        Err(e) => {
                            warn!(
                                group = %group.metadata.name,
                                agent = %agent.metadata.instance_uid,
                                error = %e,
                                "failed to resolve a remote config entry for group reconciliation"
                            );
                            failures.push(Condition::new(
                                "ResolveFailed",
                                ConditionStatus::True,
                                "MissingReference",
                                format!("agent {}: {e}", agent.metadata.instance_uid),
                                now,
                            ));
                        }
                    }
                }
                if let Err(e) = self.reconciler.save_agent(&agent) {
                    warn!(
                        group = %group.metadata.name,
                        agent = %agent.metadata.instance_uid,
                        error = %e,
                        "failed to save agent during group reconciliation"
                    );
                    failures.push(Condition::new(
                        "ReconcileFailed",
                        ConditionStatus::True,
                        "SaveAgentFailed",
                        format!("agent {}: {e}", agent.metadata.instance_uid),
                        now,
                    ));
                }
            }

            match page.continue_token {
                Some(token) => continue_token = Some(token),
                None => break,
            }
        }

        let mut updated = group.clone();
        updated.status.conditions.extend(failures);
        self.store.put_agent_group(&updated)
    }

    /// Evaluates every matching group against a single agent (connection
    /// time, `# 4.2 Propagation ordering`).
    pub fn reconcile_agent(&self, agent_instance_uid: crate::domain::InstanceUid) -> Result<Agent, CommanderError> {
        let agent = self.reconciler.get_or_create_agent(agent_instance_uid)?;
        let groups = self.groups_for_agent(&agent)?;

        let mut resolved = agent;
        for group in &groups {
            for entry in &group.spec.agent_remote_configs {
                if let Ok((key, file)) = self.resolve_entry(&group.metadata.name, entry) {
                    resolved.spec.remote_config.set(key, file);
                }
            }
        }
        self.reconciler.save_agent(&resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection_registry::ConnectionRegistry;
    use crate::domain::agent::Description;
    use crate::domain::group::{AgentGroupMetadata, AgentGroupSpec, Selector};
    use crate::domain::remote_config::{AgentRemoteConfig, AgentRemoteConfigSpec};
    use crate::domain::InstanceUid;
    use crate::event_bus::InMemoryEventBus;
    use crate::persistence::InMemoryStore;
    use crate::router::MessageRouter;
    use crate::server_identity::{ServerIdentity, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_HEARTBEAT_TIMEOUT};

    fn resolver() -> (AgentGroupResolver, Arc<dyn PersistencePort>) {
        let store: Arc<dyn PersistencePort> = Arc::new(InMemoryStore::new());
        let bus: Arc<dyn crate::event_bus::EventBusPort> = Arc::new(InMemoryEventBus::new());
        let identity = Arc::new(ServerIdentity::new(
            store.clone(),
            "s1",
            DEFAULT_HEARTBEAT_INTERVAL,
            DEFAULT_HEARTBEAT_TIMEOUT,
        ));
        identity.register().unwrap();
        let connections = Arc::new(ConnectionRegistry::new());
        let router = Arc::new(MessageRouter::new("s1", bus, identity, connections, store.clone()));
        let reconciler = Arc::new(AgentReconciler::new(store.clone(), router));
        (AgentGroupResolver::new(store.clone(), reconciler), store)
    }

    fn agent_with_env(store: &Arc<dyn PersistencePort>, env: &str) -> Agent {
        let uid = InstanceUid::new_random();
        let mut agent = Agent::new(uid);
        agent.metadata.description = Description {
            identifying_attributes: AttributeMap::from([("env".to_string(), env.to_string())]),
            non_identifying_attributes: AttributeMap::new(),
        };
        store.put_agent(&agent).unwrap();
        agent
    }

    fn selector_for(env: &str) -> Selector {
        Selector {
            identifying_attributes: AttributeMap::from([("env".to_string(), env.to_string())]),
            non_identifying_attributes: AttributeMap::new(),
        }
    }

    #[test]
    fn inline_entries_from_different_groups_never_collide() {
        let (resolver, store) = resolver();
        let agent = agent_with_env(&store, "prod");

        for group_name in ["group-a", "group-b"] {
            let group = AgentGroup {
                metadata: AgentGroupMetadata {
                    name: group_name.to_string(),
                    priority: 0,
                    selector: selector_for("prod"),
                    attributes: AttributeMap::new(),
                },
                spec: AgentGroupSpec {
                    agent_remote_configs: vec![AgentRemoteConfigEntry::Inline {
                        name: "app".to_string(),
                        value: format!("from {group_name}").into_bytes(),
                        content_type: "text/plain".to_string(),
                    }],
                },
                ..Default::default()
            };
            resolver.reconcile_group(&group).unwrap();
        }

        let saved = store.get_agent(agent.metadata.instance_uid).unwrap().unwrap();
        assert_eq!(saved.spec.remote_config.config_map.len(), 2);
        assert_eq!(
            saved.spec.remote_config.config_map["group-a/app"].body,
            b"from group-a"
        );
        assert_eq!(
            saved.spec.remote_config.config_map["group-b/app"].body,
            b"from group-b"
        );
    }

    #[test]
    fn shared_reference_resolves_to_identical_key_across_groups() {
        let (resolver, store) = resolver();
        let agent = agent_with_env(&store, "prod");
        store
            .put_agent_remote_config(&AgentRemoteConfig {
                name: "shared".to_string(),
                spec: AgentRemoteConfigSpec {
                    value: b"shared content".to_vec(),
                    content_type: "text/plain".to_string(),
                },
                ..Default::default()
            })
            .unwrap();

        for group_name in ["group-a", "group-b"] {
            let group = AgentGroup {
                metadata: AgentGroupMetadata {
                    name: group_name.to_string(),
                    priority: 0,
                    selector: selector_for("prod"),
                    attributes: AttributeMap::new(),
                },
                spec: AgentGroupSpec {
                    agent_remote_configs: vec![AgentRemoteConfigEntry::Ref("shared".to_string())],
                },
                ..Default::default()
            };
            resolver.reconcile_group(&group).unwrap();
        }

        let saved = store.get_agent(agent.metadata.instance_uid).unwrap().unwrap();
        assert_eq!(saved.spec.remote_config.config_map.len(), 1);
        assert_eq!(
            saved.spec.remote_config.config_map["shared"].body,
            b"shared content"
        );
    }

    #[test]
    fn missing_reference_records_per_agent_failure_without_aborting() {
        let (resolver, store) = resolver();
        let _agent = agent_with_env(&store, "prod");

        let group = AgentGroup {
            metadata: AgentGroupMetadata {
                name: "group-a".to_string(),
                priority: 0,
                selector: selector_for("prod"),
                attributes: AttributeMap::new(),
            },
            spec: AgentGroupSpec {
                agent_remote_configs: vec![AgentRemoteConfigEntry::Ref("missing".to_string())],
            },
            ..Default::default()
        };

        let result = resolver.reconcile_group(&group).unwrap();
        assert!(!result.status.conditions.is_empty());
    }

    #[test]
    fn counts_reflects_connected_and_healthy_state_of_matching_agents() {
        let (resolver, store) = resolver();
        let healthy = agent_with_env(&store, "prod");
        let mut healthy = healthy.clone();
        healthy.status.connected = true;
        healthy.status.component_health = Some(crate::domain::agent::ComponentHealth {
            healthy: true,
            status: String::new(),
            status_time: None,
            error_message: None,
            components: Default::default(),
        });
        store.put_agent(&healthy).unwrap();

        let mut unhealthy = agent_with_env(&store, "prod");
        unhealthy.status.connected = false;
        store.put_agent(&unhealthy).unwrap();

        let group = AgentGroup {
            metadata: AgentGroupMetadata {
                name: "group-a".to_string(),
                priority: 0,
                selector: selector_for("prod"),
                attributes: AttributeMap::new(),
            },
            ..Default::default()
        };
        store.put_agent_group(&group).unwrap();

        let counts = resolver.counts(&group).unwrap();
        assert_eq!(counts.num_agents, 2);
        assert_eq!(counts.num_connected_agents, 1);
        assert_eq!(counts.num_not_connected_agents, 1);
        assert_eq!(counts.num_healthy_agents, 1);
        assert_eq!(counts.num_unhealthy_agents, 1);

        let (fetched, fetched_counts) = resolver.get_agent_group_with_counts("group-a").unwrap().unwrap();
        assert_eq!(fetched.metadata.name, "group-a");
        assert_eq!(fetched_counts, counts);
    }

    #[test]
    fn groups_for_agent_orders_by_priority_desc_then_name_asc() {
        let (resolver, store) = resolver();
        let agent = agent_with_env(&store, "prod");

        for (name, priority) in [("low", 1), ("high-b", 5), ("high-a", 5)] {
            store
                .put_agent_group(&AgentGroup {
                    metadata: AgentGroupMetadata {
                        name: name.to_string(),
                        priority,
                        selector: selector_for("prod"),
                        attributes: AttributeMap::new(),
                    },
                    ..Default::default()
                })
                .unwrap();
        }

        let groups = resolver.groups_for_agent(&agent).unwrap();
        let names: Vec<_> = groups.iter().map(|g| g.metadata.name.clone()).collect();
        assert_eq!(names, vec!["high-a", "high-b", "low"]);
    }
}
