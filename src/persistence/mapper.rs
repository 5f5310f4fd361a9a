//! Bidirectional `Entity ↔ Domain` conversion (C6, `# 4.6`).
//!
//! `domain_to_entity` always stamps the current schema version
//! ([`CURRENT_AGENT_VERSION`] etc.); `entity_to_domain` dispatches on the
//! entity's `version` tag so old records keep decoding after a migration.

use super::entity::*;
use crate::domain::agent::*;
use crate::domain::common::{Condition, ConditionStatus, StorageCommon};
use crate::domain::group::{AgentGroup, AgentGroupMetadata, AgentGroupSpec, AgentGroupStatus, Selector};
use crate::domain::remote_config::{AgentRemoteConfig, AgentRemoteConfigSpec};
use crate::domain::server::Server;
use crate::domain::InstanceUid;
use crate::error::CommanderError;
use std::collections::BTreeMap;

pub const CURRENT_AGENT_VERSION: i64 = 1;

fn condition_to_entity(c: &Condition) -> ConditionEntity {
    ConditionEntity {
        type_: c.type_.clone(),
        status: match c.status {
            ConditionStatus::True => "True".to_string(),
            ConditionStatus::False => "False".to_string(),
            ConditionStatus::Unknown => "Unknown".to_string(),
        },
        last_transition_time: to_epoch_millis(c.last_transition_time),
        reason: c.reason.clone(),
        message: c.message.clone(),
    }
}

fn condition_from_entity(e: ConditionEntity) -> Condition {
    Condition {
        type_: e.type_,
        status: match e.status.as_str() {
            "True" => ConditionStatus::True,
            "False" => ConditionStatus::False,
            _ => ConditionStatus::Unknown,
        },
        last_transition_time: from_epoch_millis(e.last_transition_time),
        reason: e.reason,
        message: e.message,
    }
}

pub fn agent_to_entity(agent: &Agent) -> AgentEntity {
    let config_files = agent
        .spec
        .remote_config
        .config_map
        .iter()
        .map(|(name, file)| ConfigFileEntity {
            name: name.clone(),
            body: BytesEntity::generic(Some(file.body.clone())),
            content_type: file.content_type.clone(),
        })
        .collect();

    AgentEntity::V1(AgentEntityV1 {
        version: CURRENT_AGENT_VERSION,
        common_version: agent.common.version,
        id: agent.common.id.clone(),
        instance_uid: agent.metadata.instance_uid.into(),
        capabilities: agent.metadata.capabilities.0,
        identifying_attributes: AttributeEntity::from_map(
            &agent.metadata.description.identifying_attributes,
        ),
        non_identifying_attributes: AttributeEntity::from_map(
            &agent.metadata.description.non_identifying_attributes,
        ),
        custom_capabilities: agent.metadata.custom_capabilities.clone(),
        config_files,
        new_instance_uid: agent.spec.new_instance_uid.map(UuidEntity::from),
        required_restart_after: agent
            .spec
            .restart_info
            .as_ref()
            .map(|r| to_epoch_millis(r.required_restart_after)),
        connected: agent.status.connected,
        connection_type: agent.status.connection_type.map(|t| match t {
            ConnectionType::WebSocket => "websocket".to_string(),
            ConnectionType::Http => "http".to_string(),
        }),
        sequence_num: agent.status.sequence_num,
        last_reported_at: agent.status.last_reported_at.map(to_epoch_millis),
        last_reported_to: agent.status.last_reported_to.clone(),
        remote_config_status: agent
            .status
            .remote_config_status
            .as_ref()
            .map(|s| format!("{:?}", s.status)),
        remote_config_error_message: agent
            .status
            .remote_config_status
            .as_ref()
            .and_then(|s| s.error_message.clone()),
        remote_config_last_applied_hash: agent
            .status
            .remote_config_status
            .as_ref()
            .map(|s| BytesEntity::generic(Some(s.last_applied_hash.clone()))),
        remote_config_last_updated_at: agent
            .status
            .remote_config_status
            .as_ref()
            .and_then(|s| s.last_updated_at)
            .map(to_epoch_millis),
        tombstoned: agent.tombstoned,
        conditions: agent.conditions.iter().map(condition_to_entity).collect(),
        effective_config_json: agent
            .status
            .effective_config
            .as_ref()
            .and_then(|c| serde_json::to_string(c).ok()),
        package_statuses_json: serde_json::to_string(&agent.status.package_statuses).ok(),
        component_health_json: agent
            .status
            .component_health
            .as_ref()
            .and_then(|c| serde_json::to_string(c).ok()),
        available_components_json: agent
            .status
            .available_components
            .as_ref()
            .and_then(|c| serde_json::to_string(c).ok()),
    })
}

pub fn entity_to_agent(entity: AgentEntity) -> Result<Agent, CommanderError> {
    match entity {
        AgentEntity::V1(v1) => {
            let instance_uid: InstanceUid = v1
                .instance_uid
                .try_into()
                .map_err(|e| CommanderError::Internal(format!("decoding instance uid: {e}")))?;

            let remote_config_status = v1.remote_config_status.map(|status_str| {
                let status = match status_str.as_str() {
                    "Applying" => RemoteConfigStatusEnum::Applying,
                    "Applied" => RemoteConfigStatusEnum::Applied,
                    "Failed" => RemoteConfigStatusEnum::Failed,
                    _ => RemoteConfigStatusEnum::Unset,
                };
                RemoteConfigStatus {
                    last_applied_hash: v1
                        .remote_config_last_applied_hash
                        .and_then(|b| b.data)
                        .unwrap_or_default(),
                    status,
                    error_message: v1.remote_config_error_message.clone(),
                    last_updated_at: v1.remote_config_last_updated_at.map(from_epoch_millis),
                }
            });

            let config_map: BTreeMap<String, ConfigFile> = v1
                .config_files
                .into_iter()
                .map(|f| {
                    (
                        f.name,
                        ConfigFile {
                            body: f.body.data.unwrap_or_default(),
                            content_type: f.content_type,
                        },
                    )
                })
                .collect();

            Ok(Agent {
                metadata: AgentMetadata {
                    instance_uid,
                    capabilities: Capabilities(v1.capabilities),
                    description: Description {
                        identifying_attributes: v1.identifying_attributes.into_map(),
                        non_identifying_attributes: v1.non_identifying_attributes.into_map(),
                    },
                    custom_capabilities: v1.custom_capabilities,
                },
                spec: AgentSpec {
                    remote_config: RemoteConfig { config_map },
                    new_instance_uid: v1
                        .new_instance_uid
                        .map(|u| u.try_into())
                        .transpose()
                        .map_err(|e| {
                            CommanderError::Internal(format!("decoding new instance uid: {e}"))
                        })?,
                    restart_info: v1.required_restart_after.map(|ms| RestartInfo {
                        required_restart_after: from_epoch_millis(ms),
                    }),
                },
                status: AgentStatus {
                    effective_config: v1
                        .effective_config_json
                        .and_then(|s| serde_json::from_str(&s).ok()),
                    package_statuses: v1
                        .package_statuses_json
                        .and_then(|s| serde_json::from_str(&s).ok())
                        .unwrap_or_default(),
                    component_health: v1
                        .component_health_json
                        .and_then(|s| serde_json::from_str(&s).ok()),
                    available_components: v1
                        .available_components_json
                        .and_then(|s| serde_json::from_str(&s).ok()),
                    remote_config_status,
                    connected: v1.connected,
                    connection_type: v1.connection_type.as_deref().map(|t| match t {
                        "http" => ConnectionType::Http,
                        _ => ConnectionType::WebSocket,
                    }),
                    sequence_num: v1.sequence_num,
                    last_reported_at: v1.last_reported_at.map(from_epoch_millis),
                    last_reported_to: v1.last_reported_to,
                },
                conditions: v1.conditions.into_iter().map(condition_from_entity).collect(),
                tombstoned: v1.tombstoned,
                common: StorageCommon {
                    version: v1.common_version,
                    id: v1.id,
                },
            })
        }
    }
}

pub fn group_to_entity(group: &AgentGroup) -> Result<AgentGroupEntityV1, CommanderError> {
    Ok(AgentGroupEntityV1 {
        version: CURRENT_AGENT_VERSION,
        common_version: group.common.version,
        id: group.common.id.clone(),
        name: group.metadata.name.clone(),
        priority: group.metadata.priority,
        selector_identifying: AttributeEntity::from_map(
            &group.metadata.selector.identifying_attributes,
        ),
        selector_non_identifying: AttributeEntity::from_map(
            &group.metadata.selector.non_identifying_attributes,
        ),
        attributes: AttributeEntity::from_map(&group.metadata.attributes),
        remote_configs_json: serde_json::to_string(&group.spec.agent_remote_configs)
            .map_err(|e| CommanderError::Internal(format!("encoding group entries: {e}")))?,
        deleted_at: group.deleted_at.map(to_epoch_millis),
        conditions: group
            .status
            .conditions
            .iter()
            .map(condition_to_entity)
            .collect(),
    })
}

pub fn entity_to_group(entity: AgentGroupEntityV1) -> Result<AgentGroup, CommanderError> {
    let agent_remote_configs = serde_json::from_str(&entity.remote_configs_json)
        .map_err(|e| CommanderError::Internal(format!("decoding group entries: {e}")))?;
    Ok(AgentGroup {
        metadata: AgentGroupMetadata {
            name: entity.name,
            priority: entity.priority,
            selector: Selector {
                identifying_attributes: entity.selector_identifying.into_map(),
                non_identifying_attributes: entity.selector_non_identifying.into_map(),
            },
            attributes: entity.attributes.into_map(),
        },
        spec: AgentGroupSpec {
            agent_remote_configs,
        },
        status: AgentGroupStatus {
            conditions: entity.conditions.into_iter().map(condition_from_entity).collect(),
        },
        deleted_at: entity.deleted_at.map(from_epoch_millis),
        common: StorageCommon {
            version: entity.common_version,
            id: entity.id,
        },
    })
}

pub fn remote_config_to_entity(config: &AgentRemoteConfig) -> AgentRemoteConfigEntityV1 {
    AgentRemoteConfigEntityV1 {
        version: CURRENT_AGENT_VERSION,
        common_version: config.common.version,
        id: config.common.id.clone(),
        name: config.name.clone(),
        attributes: AttributeEntity::from_map(&config.attributes),
        value: BytesEntity::generic(Some(config.spec.value.clone())),
        content_type: config.spec.content_type.clone(),
        created_at: config.created_at.map(to_epoch_millis),
        created_by: config.created_by.clone(),
        updated_at: config.updated_at.map(to_epoch_millis),
        updated_by: config.updated_by.clone(),
        deleted_at: config.deleted_at.map(to_epoch_millis),
    }
}

pub fn entity_to_remote_config(entity: AgentRemoteConfigEntityV1) -> AgentRemoteConfig {
    AgentRemoteConfig {
        name: entity.name,
        attributes: entity.attributes.into_map(),
        spec: AgentRemoteConfigSpec {
            value: entity.value.data.unwrap_or_default(),
            content_type: entity.content_type,
        },
        created_at: entity.created_at.map(from_epoch_millis),
        created_by: entity.created_by,
        updated_at: entity.updated_at.map(from_epoch_millis),
        updated_by: entity.updated_by,
        deleted_at: entity.deleted_at.map(from_epoch_millis),
        common: StorageCommon {
            version: entity.common_version,
            id: entity.id,
        },
    }
}

pub fn server_to_entity(server: &Server) -> ServerEntityV1 {
    ServerEntityV1 {
        version: CURRENT_AGENT_VERSION,
        common_version: server.common.version,
        id: server.common.id.clone(),
        server_id: server.id.clone(),
        last_heartbeat_at: server.last_heartbeat_at.map(to_epoch_millis),
        created_at: server.created_at.map(to_epoch_millis),
        conditions: server.conditions.iter().map(condition_to_entity).collect(),
    }
}

pub fn entity_to_server(entity: ServerEntityV1) -> Server {
    Server {
        id: entity.server_id,
        last_heartbeat_at: entity.last_heartbeat_at.map(from_epoch_millis),
        created_at: entity.created_at.map(from_epoch_millis),
        conditions: entity.conditions.into_iter().map(condition_from_entity).collect(),
        common: StorageCommon {
            version: entity.common_version,
            id: entity.id,
        },
    }
}
