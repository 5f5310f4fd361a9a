//! `Connection`: ephemeral, in-memory only, lifetime bound to the
//! underlying socket (`# 3 Connection`, `# 4.3`).

use super::agent::ConnectionType;
use super::instance_uid::InstanceUid;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct Connection {
    pub connection_id: String,
    /// May be [`InstanceUid::zero`] until the agent's first report arrives.
    pub instance_uid: InstanceUid,
    pub connection_type: ConnectionType,
    pub opened_at: DateTime<Utc>,
    pub last_communicated_at: DateTime<Utc>,
}

impl Connection {
    pub fn new(connection_id: impl Into<String>, connection_type: ConnectionType, now: DateTime<Utc>) -> Self {
        Self {
            connection_id: connection_id.into(),
            instance_uid: InstanceUid::zero(),
            connection_type,
            opened_at: now,
            last_communicated_at: now,
        }
    }
}
