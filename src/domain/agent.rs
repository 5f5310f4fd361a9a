//! The per-agent record: `Metadata / Spec / Status` (`# 3 Agent`).

use super::common::{AttributeMap, Condition, ConditionStatus, StorageCommon};
use super::instance_uid::InstanceUid;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Recursive trees (`ComponentHealth`, `AvailableComponents`) are bounded to
/// this depth to keep a malformed report from recursing unboundedly
/// (`# 9 Design Notes`, deep nullable trees).
pub const MAX_TREE_DEPTH: usize = 16;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities(pub u64);

impl Capabilities {
    pub const REPORTS_STATUS: u64 = 1 << 0;
    pub const ACCEPTS_REMOTE_CONFIG: u64 = 1 << 1;
    pub const REPORTS_EFFECTIVE_CONFIG: u64 = 1 << 2;
    pub const REPORTS_PACKAGE_STATUSES: u64 = 1 << 3;
    pub const ACCEPTS_PACKAGES: u64 = 1 << 4;
    pub const REPORTS_OWN_TRACES: u64 = 1 << 5;
    pub const ACCEPTS_RESTART_COMMAND: u64 = 1 << 6;

    pub fn has(self, flag: u64) -> bool {
        self.0 & flag != 0
    }

    pub fn with(self, flag: u64) -> Self {
        Self(self.0 | flag)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Description {
    pub identifying_attributes: AttributeMap,
    pub non_identifying_attributes: AttributeMap,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentMetadata {
    pub instance_uid: InstanceUid,
    pub capabilities: Capabilities,
    pub description: Description,
    pub custom_capabilities: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFile {
    pub body: Vec<u8>,
    pub content_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Keyed by config name. Collision-free by construction (`# 4.2`
    /// resolution rules: reference keys are the config name itself, inline
    /// keys are `groupName/inlineName`).
    pub config_map: BTreeMap<String, ConfigFile>,
}

impl RemoteConfig {
    /// Derived view requested by transport/legacy consumers
    /// (`# 9 Open Questions`): a sorted, deduplicated list of config names.
    /// Not persisted; always recomputed from `config_map`.
    pub fn remote_config_names(&self) -> Vec<String> {
        self.config_map.keys().cloned().collect()
    }

    pub fn set(&mut self, name: String, file: ConfigFile) {
        self.config_map.insert(name, file);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartInfo {
    pub required_restart_after: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSpec {
    pub remote_config: RemoteConfig,
    pub new_instance_uid: Option<InstanceUid>,
    pub restart_info: Option<RestartInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub healthy: bool,
    pub status: String,
    pub status_time: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub components: BTreeMap<String, ComponentHealth>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableComponent {
    pub content_hash: Vec<u8>,
    pub components: BTreeMap<String, AvailableComponent>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("tree exceeds max depth of {max}")]
pub struct TreeTooDeepError {
    pub max: usize,
}

fn depth_of(components: &BTreeMap<String, ComponentHealth>) -> usize {
    components
        .values()
        .map(|c| 1 + depth_of(&c.components))
        .max()
        .unwrap_or(0)
}

fn depth_of_available(components: &BTreeMap<String, AvailableComponent>) -> usize {
    components
        .values()
        .map(|c| 1 + depth_of_available(&c.components))
        .max()
        .unwrap_or(0)
}

impl ComponentHealth {
    /// Validates the recursion depth bound from `# 9 Design Notes`.
    pub fn validate_depth(&self) -> Result<(), TreeTooDeepError> {
        if 1 + depth_of(&self.components) > MAX_TREE_DEPTH {
            return Err(TreeTooDeepError { max: MAX_TREE_DEPTH });
        }
        Ok(())
    }
}

impl AvailableComponent {
    pub fn validate_depth(&self) -> Result<(), TreeTooDeepError> {
        if 1 + depth_of_available(&self.components) > MAX_TREE_DEPTH {
            return Err(TreeTooDeepError { max: MAX_TREE_DEPTH });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteConfigStatusEnum {
    Unset,
    Applying,
    Applied,
    Failed,
}

impl Default for RemoteConfigStatusEnum {
    fn default() -> Self {
        Self::Unset
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfigStatus {
    pub last_applied_hash: Vec<u8>,
    pub status: RemoteConfigStatusEnum,
    pub error_message: Option<String>,
    /// Set to the report's reception time (`# 9 Open Questions`: the legacy
    /// zero-stamping behavior is not reproduced here).
    pub last_updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionType {
    WebSocket,
    Http,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageStatus {
    pub name: String,
    pub version: String,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStatus {
    pub effective_config: Option<RemoteConfig>,
    pub package_statuses: BTreeMap<String, PackageStatus>,
    pub component_health: Option<ComponentHealth>,
    pub available_components: Option<AvailableComponent>,
    pub remote_config_status: Option<RemoteConfigStatus>,
    pub connected: bool,
    pub connection_type: Option<ConnectionType>,
    pub sequence_num: u64,
    pub last_reported_at: Option<DateTime<Utc>>,
    pub last_reported_to: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub metadata: AgentMetadata,
    pub spec: AgentSpec,
    pub status: AgentStatus,
    pub conditions: Vec<Condition>,
    /// Set when an operator-driven UID rotation has superseded this record
    /// (`# 4.1` edge cases: agents are never hard-deleted).
    pub tombstoned: bool,
    pub common: StorageCommon,
}

impl Agent {
    /// Zero-value record for a cache/store miss (`# 4.1 GetOrCreateAgent`).
    pub fn new(instance_uid: InstanceUid) -> Self {
        Self {
            metadata: AgentMetadata {
                instance_uid,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn description(&self) -> &Description {
        &self.metadata.description
    }

    pub fn push_condition_on_transition(&mut self, new: Condition) {
        let transitioned = match self.conditions.iter().rev().find(|c| c.type_ == new.type_) {
            Some(existing) => existing.status != new.status,
            None => true,
        };
        if transitioned {
            self.conditions.push(new);
        }
    }
}

/// Incoming agent report (`# 4.1 IngestReport`). Every sub-section is
/// nullable: `None` leaves the persisted value unchanged, `Some` overrides
/// it wholesale.
#[derive(Debug, Clone, Default)]
pub struct AgentReport {
    pub sequence_num: u64,
    pub description: Option<Description>,
    pub effective_config: Option<RemoteConfig>,
    pub package_statuses: Option<BTreeMap<String, PackageStatus>>,
    pub component_health: Option<ComponentHealth>,
    pub available_components: Option<AvailableComponent>,
    pub remote_config_status: Option<RemoteConfigStatus>,
    pub connected: Option<bool>,
    pub connection_type: Option<ConnectionType>,
    pub last_reported_to: Option<String>,
}

pub(crate) fn true_condition(
    type_: &str,
    reason: &str,
    message: impl Into<String>,
    at: DateTime<Utc>,
) -> Condition {
    Condition::new(type_, ConditionStatus::True, reason, message, at)
}
