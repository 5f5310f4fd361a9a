//! Agent Reconciler (C1, `# 4.1`): owns the per-agent record lifecycle.

use crate::domain::agent::{true_condition, Agent, AgentReport, RemoteConfigStatusEnum};
use crate::domain::common::{is_subset, ConditionStatus, ListOptions, Page};
use crate::domain::InstanceUid;
use crate::error::CommanderError;
use crate::persistence::{PersistencePort, SelectorQuery};
use crate::router::MessageRouter;
use chrono::Utc;
use std::sync::Arc;
use tracing::error;

pub struct AgentReconciler {
    store: Arc<dyn PersistencePort>,
    router: Arc<MessageRouter>,
}

impl AgentReconciler {
    pub fn new(store: Arc<dyn PersistencePort>, router: Arc<MessageRouter>) -> Self {
        Self { store, router }
    }

    /// On cache miss reads the store; on absent key returns a newly minted
    /// [`Agent`] with all sub-sections at their zero values. Never writes
    /// on the read path (`# 4.1`).
    pub fn get_or_create_agent(&self, instance_uid: InstanceUid) -> Result<Agent, CommanderError> {
        match self.store.get_agent(instance_uid)? {
            Some(agent) => Ok(agent),
            None => Ok(Agent::new(instance_uid)),
        }
    }

    /// True when the agent carries something worth pushing to a connected
    /// transport: a non-empty config map, a pending UID rotation, or a
    /// pending restart (`# 3 Invariants`: "non-empty pending outbound
    /// message set").
    fn has_pending_outbound(agent: &Agent) -> bool {
        !agent.spec.remote_config.config_map.is_empty()
            || agent.spec.new_instance_uid.is_some()
            || agent.spec.restart_info.is_some()
    }

    /// Idempotent upsert keyed by `InstanceUID`. On success, if the agent
    /// has a pending outbound message set and is connected, notifies the
    /// owning server through C5. Notification failure is logged, not
    /// propagated (`# 4.1 SaveAgent`).
    pub fn save_agent(&self, agent: &Agent) -> Result<Agent, CommanderError> {
        let saved = self.store.put_agent(agent)?;

        if saved.status.connected && Self::has_pending_outbound(&saved) {
            if let Some(owner) = saved.status.last_reported_to.clone() {
                if let Err(e) = self
                    .router
                    .notify_spec_changed(&owner, saved.metadata.instance_uid)
                {
                    error!(
                        instance_uid = %saved.metadata.instance_uid,
                        owner = %owner,
                        error = %e,
                        "failed to notify owning server of a spec change"
                    );
                }
            }
        }
        Ok(saved)
    }

    /// Resolves `configName` against the standalone `AgentRemoteConfig`
    /// store and writes the result into `Spec.RemoteConfig.ConfigMap`
    /// under its own name, idempotently (`# 9 Open Questions`: ConfigMap
    /// is authoritative; `RemoteConfigNames` is a derived view).
    pub fn apply_remote_config(
        &self,
        instance_uid: InstanceUid,
        config_name: &str,
    ) -> Result<Agent, CommanderError> {
        let remote_config = self
            .store
            .get_agent_remote_config(config_name)?
            .ok_or_else(|| CommanderError::NotFound(format!("agent remote config `{config_name}`")))?;

        let mut agent = self.get_or_create_agent(instance_uid)?;
        agent.spec.remote_config.set(
            config_name.to_string(),
            crate::domain::agent::ConfigFile {
                body: remote_config.spec.value,
                content_type: remote_config.spec.content_type,
            },
        );
        self.save_agent(&agent)
    }

    /// Merges an incoming agent report into `Status`. Nullable sub-sections
    /// override the persisted value; `None` leaves it unchanged. A report
    /// with a lower `SequenceNum` than persisted is discarded, not an error
    /// (`# 4.1 IngestReport`, `# 3 Invariants`, `# 8` scenario 3).
    pub fn ingest_report(
        &self,
        instance_uid: InstanceUid,
        report: AgentReport,
    ) -> Result<Agent, CommanderError> {
        let mut agent = self.get_or_create_agent(instance_uid)?;
        if report.sequence_num < agent.status.sequence_num {
            return Ok(agent);
        }
        let now = Utc::now();

        if let Some(description) = report.description {
            agent.metadata.description = description;
        }
        if let Some(effective_config) = report.effective_config {
            agent.status.effective_config = Some(effective_config);
        }
        if let Some(package_statuses) = report.package_statuses {
            agent.status.package_statuses = package_statuses;
        }
        if let Some(component_health) = report.component_health {
            component_health
                .validate_depth()
                .map_err(|e| CommanderError::Validation(e.to_string()))?;
            agent.status.component_health = Some(component_health);
        }
        if let Some(available_components) = report.available_components {
            available_components
                .validate_depth()
                .map_err(|e| CommanderError::Validation(e.to_string()))?;
            agent.status.available_components = Some(available_components);
        }
        if let Some(mut remote_config_status) = report.remote_config_status {
            // `# 9 Open Questions`: always stamp the reception time here,
            // unlike the legacy zero-stamped behavior.
            remote_config_status.last_updated_at = Some(now);
            let transitioned_to_applied = remote_config_status.status == RemoteConfigStatusEnum::Applied;
            agent.status.remote_config_status = Some(remote_config_status);
            if transitioned_to_applied {
                agent.push_condition_on_transition(true_condition(
                    "RemoteConfigApplied",
                    "ReportedApplied",
                    "agent reported the remote config as applied",
                    now,
                ));
            }
        }
        if let Some(connected) = report.connected {
            let was = agent.status.connected;
            agent.status.connected = connected;
            if was != connected {
                agent.push_condition_on_transition(
                    if connected {
                        true_condition("Connected", "AgentConnected", "agent reported connected", now)
                    } else {
                        crate::domain::common::Condition::new(
                            "Connected",
                            ConditionStatus::False,
                            "AgentDisconnected",
                            "agent reported disconnected",
                            now,
                        )
                    },
                );
            }
        }
        if let Some(connection_type) = report.connection_type {
            agent.status.connection_type = Some(connection_type);
        }
        if let Some(last_reported_to) = report.last_reported_to {
            agent.status.last_reported_to = Some(last_reported_to);
        }

        agent.status.sequence_num = report.sequence_num;
        agent.status.last_reported_at = Some(now);

        self.save_agent(&agent)
    }

    pub fn list_agents(&self, options: ListOptions) -> Result<Page<Agent>, CommanderError> {
        self.store.list_agents(options)
    }

    /// Server-side when identifying attributes are present; fetch-and-filter
    /// otherwise, preserving the pagination cursor (`# 4.1 ListAgentsBySelector`).
    pub fn list_agents_by_selector(
        &self,
        selector: SelectorQuery,
        options: ListOptions,
    ) -> Result<Page<Agent>, CommanderError> {
        if !selector.identifying_attributes.is_empty() {
            return self.store.list_agents_by_selector(selector, options);
        }
        let page = self.store.list_agents(options)?;
        let items = page
            .items
            .into_iter()
            .filter(|a| {
                is_subset(
                    &selector.non_identifying_attributes,
                    &a.metadata.description.non_identifying_attributes,
                )
            })
            .collect();
        Ok(Page {
            items,
            continue_token: page.continue_token,
            remaining_item_count: page.remaining_item_count,
        })
    }

    pub fn search_agents(&self, query: &str, options: ListOptions) -> Result<Page<Agent>, CommanderError> {
        self.store.search_agents(query, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::InMemoryEventBus;
    use crate::persistence::InMemoryStore;
    use crate::server_identity::{ServerIdentity, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_HEARTBEAT_TIMEOUT};
    use crate::connection_registry::ConnectionRegistry;

    fn reconciler() -> AgentReconciler {
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
        AgentReconciler::new(store, router)
    }

    #[test]
    fn get_or_create_returns_zero_value_on_miss() {
        let r = reconciler();
        let uid = InstanceUid::new_random();
        let agent = r.get_or_create_agent(uid).unwrap();
        assert_eq!(agent.metadata.instance_uid, uid);
        assert!(agent.spec.remote_config.config_map.is_empty());
    }

    #[test]
    fn stale_sequence_number_is_discarded_not_an_error() {
        let r = reconciler();
        let uid = InstanceUid::new_random();

        r.ingest_report(
            uid,
            AgentReport {
                sequence_num: 5,
                connected: Some(true),
                ..Default::default()
            },
        )
        .unwrap();

        let result = r
            .ingest_report(
                uid,
                AgentReport {
                    sequence_num: 3,
                    connected: Some(false),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(result.status.sequence_num, 5);
        assert!(result.status.connected);
    }

    #[test]
    fn apply_remote_config_is_idempotent() {
        let r = reconciler();
        let uid = InstanceUid::new_random();
        let store = r.store.clone();
        let mut config = crate::domain::remote_config::AgentRemoteConfig::default();
        config.name = "shared".to_string();
        config.spec.value = b"hello".to_vec();
        store.put_agent_remote_config(&config).unwrap();

        r.apply_remote_config(uid, "shared").unwrap();
        let second = r.apply_remote_config(uid, "shared").unwrap();

        assert_eq!(second.spec.remote_config.config_map.len(), 1);
        assert_eq!(
            second.spec.remote_config.config_map["shared"].body,
            b"hello"
        );
    }

    #[test]
    fn apply_remote_config_missing_reference_is_not_found() {
        let r = reconciler();
        let err = r
            .apply_remote_config(InstanceUid::new_random(), "missing")
            .unwrap_err();
        assert!(matches!(err, CommanderError::NotFound(_)));
    }

    #[test]
    fn ingest_report_appends_condition_only_on_transition() {
        let r = reconciler();
        let uid = InstanceUid::new_random();

        let a1 = r
            .ingest_report(
                uid,
                AgentReport {
                    sequence_num: 1,
                    connected: Some(true),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(a1.conditions.len(), 1);

        let a2 = r
            .ingest_report(
                uid,
                AgentReport {
                    sequence_num: 2,
                    connected: Some(true),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(a2.conditions.len(), 1);

        let a3 = r
            .ingest_report(
                uid,
                AgentReport {
                    sequence_num: 3,
                    connected: Some(false),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(a3.conditions.len(), 2);
    }
}
