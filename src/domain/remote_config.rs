//! `AgentRemoteConfig`: a standalone, named configuration blob
//! referenceable by groups (`# 3 AgentRemoteConfig`).

use super::common::{AttributeMap, StorageCommon};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRemoteConfigSpec {
    pub value: Vec<u8>,
    pub content_type: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentRemoteConfig {
    pub name: String,
    pub attributes: AttributeMap,
    pub spec: AgentRemoteConfigSpec,
    pub created_at: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
    pub updated_by: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub common: StorageCommon,
}

impl AgentRemoteConfig {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}
