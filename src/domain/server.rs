//! `Server`: the control-plane-instance record (`# 3 Server`, `# 4.4`).

use super::common::{Condition, StorageCommon};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Server {
    pub id: String,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub conditions: Vec<Condition>,
    pub common: StorageCommon,
}

/// Default staleness timeout per `# 3 Server`.
pub const DEFAULT_HEARTBEAT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(90);

impl Server {
    pub fn new(id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            last_heartbeat_at: Some(now),
            created_at: Some(now),
            conditions: Vec::new(),
            common: StorageCommon::new(),
        }
    }

    /// `now - LastHeartbeatAt < HeartbeatTimeout` (`# 3 Server`).
    pub fn is_alive(&self, now: DateTime<Utc>, timeout: std::time::Duration) -> bool {
        match self.last_heartbeat_at {
            Some(at) => {
                let age = now.signed_duration_since(at);
                age < chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::MAX)
            }
            None => false,
        }
    }
}
