//! Document-store representation of the domain model (`# 4.6 Persistence
//! Mapper`, `# 3 Storage Entity Common`).
//!
//! Entities are versioned so schema migration never forces old readers to
//! change: `AgentEntity` is a closed set of versions, and the mapper
//! dispatches on the persisted `version` field to decode.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `map<string,string>` persisted as an array of records, the indexable
/// form used for selector queries (`# 4.6` conventions). Reads also accept
/// a native map for forward-compatibility with writers that chose that
/// form; see [`AttributeEntity::into_map`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeEntity {
    Indexed(Vec<KeyValue>),
    Native(BTreeMap<String, String>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

impl AttributeEntity {
    pub fn from_map(map: &BTreeMap<String, String>) -> Self {
        AttributeEntity::Indexed(
            map.iter()
                .map(|(k, v)| KeyValue {
                    key: k.clone(),
                    value: v.clone(),
                })
                .collect(),
        )
    }

    pub fn into_map(self) -> BTreeMap<String, String> {
        match self {
            AttributeEntity::Indexed(kvs) => {
                kvs.into_iter().map(|kv| (kv.key, kv.value)).collect()
            }
            AttributeEntity::Native(map) => map,
        }
    }
}

/// A UUID persisted both as 16-byte binary and a redundant string form for
/// text search (`# 4.6` conventions).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UuidEntity {
    pub binary: [u8; 16],
    pub text: String,
}

impl From<crate::domain::InstanceUid> for UuidEntity {
    fn from(uid: crate::domain::InstanceUid) -> Self {
        Self {
            binary: *uid.as_bytes(),
            text: uid.to_string(),
        }
    }
}

impl TryFrom<UuidEntity> for crate::domain::InstanceUid {
    type Error = uuid::Error;

    fn try_from(entity: UuidEntity) -> Result<Self, Self::Error> {
        Ok(uuid::Uuid::from_bytes(entity.binary).into())
    }
}

/// Byte payload with an explicit "generic" subtype tag and a `nil` vs
/// empty distinction (`# 4.6` conventions).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BytesEntity {
    pub subtype: String,
    pub data: Option<Vec<u8>>,
}

impl BytesEntity {
    pub fn generic(data: Option<Vec<u8>>) -> Self {
        Self {
            subtype: "generic".to_string(),
            data,
        }
    }
}

/// Agent-reported timestamps persist as millisecond epoch integers; audit
/// timestamps persist as native date-time (`# 4.6` conventions).
pub type EpochMillis = i64;

pub fn to_epoch_millis(at: chrono::DateTime<chrono::Utc>) -> EpochMillis {
    at.timestamp_millis()
}

pub fn from_epoch_millis(ms: EpochMillis) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionEntity {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: String,
    pub last_transition_time: EpochMillis,
    pub reason: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFileEntity {
    pub name: String,
    pub body: BytesEntity,
    pub content_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEntityV1 {
    /// Schema version this document was written with, not the
    /// optimistic-concurrency counter (see `common_version`).
    pub version: i64,
    pub common_version: i64,
    pub id: Option<String>,
    pub instance_uid: UuidEntity,
    pub capabilities: u64,
    pub identifying_attributes: AttributeEntity,
    pub non_identifying_attributes: AttributeEntity,
    pub custom_capabilities: Vec<String>,
    pub config_files: Vec<ConfigFileEntity>,
    pub new_instance_uid: Option<UuidEntity>,
    pub required_restart_after: Option<EpochMillis>,
    pub connected: bool,
    pub connection_type: Option<String>,
    pub sequence_num: u64,
    pub last_reported_at: Option<EpochMillis>,
    pub last_reported_to: Option<String>,
    pub remote_config_status: Option<String>,
    pub remote_config_error_message: Option<String>,
    pub remote_config_last_applied_hash: Option<BytesEntity>,
    pub remote_config_last_updated_at: Option<EpochMillis>,
    pub tombstoned: bool,
    pub conditions: Vec<ConditionEntity>,
    /// Opaque, best-effort fields: serialized status sub-trees we do not
    /// need to query on. Unknown fields on read are tolerated and ignored;
    /// a write never produces fields outside this schema.
    pub effective_config_json: Option<String>,
    pub package_statuses_json: Option<String>,
    pub component_health_json: Option<String>,
    pub available_components_json: Option<String>,
}

/// Closed set of schema versions (`# 4.6`: "the mapper dispatches on
/// Version to pick the right decoder"). The store persists the flattened
/// `AgentEntityV1` shape with its own `version` field; this enum is the
/// in-process dispatch point `entity_to_agent` matches on, not a wire
/// format of its own.
#[derive(Debug, Clone)]
pub enum AgentEntity {
    V1(AgentEntityV1),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentGroupEntityV1 {
    pub version: i64,
    pub common_version: i64,
    pub id: Option<String>,
    pub name: String,
    pub priority: i64,
    pub selector_identifying: AttributeEntity,
    pub selector_non_identifying: AttributeEntity,
    pub attributes: AttributeEntity,
    pub remote_configs_json: String,
    pub deleted_at: Option<EpochMillis>,
    pub conditions: Vec<ConditionEntity>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRemoteConfigEntityV1 {
    pub version: i64,
    pub common_version: i64,
    pub id: Option<String>,
    pub name: String,
    pub attributes: AttributeEntity,
    pub value: BytesEntity,
    pub content_type: String,
    pub created_at: Option<EpochMillis>,
    pub created_by: Option<String>,
    pub updated_at: Option<EpochMillis>,
    pub updated_by: Option<String>,
    pub deleted_at: Option<EpochMillis>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerEntityV1 {
    pub version: i64,
    pub common_version: i64,
    pub id: Option<String>,
    pub server_id: String,
    pub last_heartbeat_at: Option<EpochMillis>,
    pub created_at: Option<EpochMillis>,
    pub conditions: Vec<ConditionEntity>,
}
