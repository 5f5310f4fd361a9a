//! Connection Registry (C3, `# 4.3`): process-local, no persistence,
//! concurrent map keyed by `ConnectionID` with a secondary index on
//! `InstanceUID`.

mod list;

use crate::domain::agent::ConnectionType;
use crate::domain::connection::Connection;
use crate::domain::common::{ListOptions, Page};
use crate::domain::InstanceUid;
use crate::error::CommanderError;
use crate::transport::{ServerToAgentMessage, TransportHandle};
use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConnectionRegistryError {
    #[error("agent is not locally connected")]
    NotFound,
    #[error("connection does not support server-initiated sends")]
    UnsupportedConnectionType,
}

impl From<ConnectionRegistryError> for CommanderError {
    fn from(value: ConnectionRegistryError) -> Self {
        match value {
            ConnectionRegistryError::NotFound => {
                CommanderError::NotFound("agent not locally connected".to_string())
            }
            ConnectionRegistryError::UnsupportedConnectionType => CommanderError::Internal(
                "connection registry cannot push to this connection type".to_string(),
            ),
        }
    }
}

struct Entry {
    connection: Connection,
    transport: Arc<dyn TransportHandle>,
}

/// All operations are safe under parallel access (`# 4.3 Concurrency`):
/// `dashmap` shards the table internally, and the secondary index is kept
/// consistent by always mutating both maps under the same call.
#[derive(Default)]
pub struct ConnectionRegistry {
    by_connection_id: DashMap<String, Entry>,
    by_instance_uid: DashMap<InstanceUid, String>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save(&self, connection: Connection, transport: Arc<dyn TransportHandle>) {
        let connection_id = connection.connection_id.clone();
        if !connection.instance_uid.is_zero() {
            self.by_instance_uid
                .insert(connection.instance_uid, connection_id.clone());
        }
        debug!(connection_id = %connection_id, "connection registered");
        self.by_connection_id.insert(
            connection_id,
            Entry {
                connection,
                transport,
            },
        );
    }

    /// Re-indexes a connection once the agent's instance UID becomes known
    /// (the first report after handshake — `# 3 Connection`: "may be zero
    /// until first report").
    pub fn bind_instance_uid(&self, connection_id: &str, instance_uid: InstanceUid) {
        if let Some(mut entry) = self.by_connection_id.get_mut(connection_id) {
            entry.connection.instance_uid = instance_uid;
            self.by_instance_uid
                .insert(instance_uid, connection_id.to_string());
        }
    }

    pub fn delete(&self, connection_id: &str) {
        if let Some((_, entry)) = self.by_connection_id.remove(connection_id) {
            if !entry.connection.instance_uid.is_zero() {
                self.by_instance_uid.remove(&entry.connection.instance_uid);
            }
        }
    }

    pub fn get_by_id(&self, connection_id: &str) -> Option<Connection> {
        self.by_connection_id
            .get(connection_id)
            .map(|e| e.connection.clone())
    }

    pub fn get_by_instance_uid(&self, instance_uid: InstanceUid) -> Option<Connection> {
        let connection_id = self.by_instance_uid.get(&instance_uid)?;
        self.get_by_id(&connection_id)
    }

    pub fn list(&self, options: ListOptions) -> Page<Connection> {
        let keys: Vec<String> = self.by_connection_id.iter().map(|e| e.key().clone()).collect();
        list::paginate_keys(keys, options, |key| self.get_by_id(key))
    }

    /// Looks up the live transport handle for `instance_uid` and writes the
    /// framed message (`# 4.3 SendServerToAgent`).
    pub fn send_server_to_agent(
        &self,
        instance_uid: InstanceUid,
        message: ServerToAgentMessage,
    ) -> Result<(), ConnectionRegistryError> {
        let connection_id = self
            .by_instance_uid
            .get(&instance_uid)
            .map(|id| id.clone())
            .ok_or(ConnectionRegistryError::NotFound)?;
        let entry = self
            .by_connection_id
            .get(&connection_id)
            .ok_or(ConnectionRegistryError::NotFound)?;
        if entry.connection.connection_type != ConnectionType::WebSocket {
            warn!(%instance_uid, "cannot push to a non-websocket connection");
            return Err(ConnectionRegistryError::UnsupportedConnectionType);
        }
        entry
            .transport
            .send(message)
            .map_err(|_| ConnectionRegistryError::NotFound)
    }

    pub fn len(&self) -> usize {
        self.by_connection_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_connection_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransportHandle;
    use chrono::Utc;

    fn connection(id: &str, uid: InstanceUid) -> Connection {
        let mut c = Connection::new(id, ConnectionType::WebSocket, Utc::now());
        c.instance_uid = uid;
        c
    }

    #[test]
    fn send_server_to_agent_not_found_when_not_connected() {
        let registry = ConnectionRegistry::new();
        let result = registry.send_server_to_agent(
            InstanceUid::new_random(),
            ServerToAgentMessage {
                instance_uid: InstanceUid::new_random(),
                remote_config_names: vec![],
                new_instance_uid: None,
            },
        );
        assert_eq!(result, Err(ConnectionRegistryError::NotFound));
    }

    #[test]
    fn send_server_to_agent_writes_through_transport() {
        let registry = ConnectionRegistry::new();
        let uid = InstanceUid::new_random();
        let mut transport = MockTransportHandle::new();
        transport.expect_send().times(1).returning(|_| Ok(()));
        registry.save(connection("c1", uid), Arc::new(transport));

        let result = registry.send_server_to_agent(
            uid,
            ServerToAgentMessage {
                instance_uid: uid,
                remote_config_names: vec!["agentConfig".to_string()],
                new_instance_uid: None,
            },
        );
        assert!(result.is_ok());
    }

    #[test]
    fn delete_removes_both_indexes() {
        let registry = ConnectionRegistry::new();
        let uid = InstanceUid::new_random();
        let transport = MockTransportHandle::new();
        registry.save(connection("c1", uid), Arc::new(transport));
        assert!(registry.get_by_instance_uid(uid).is_some());

        registry.delete("c1");
        assert!(registry.get_by_instance_uid(uid).is_none());
        assert!(registry.get_by_id("c1").is_none());
    }

    #[test]
    fn list_is_sorted_and_paginates() {
        let registry = ConnectionRegistry::new();
        for i in 0..5 {
            let transport = MockTransportHandle::new();
            registry.save(
                connection(&format!("c{i}"), InstanceUid::new_random()),
                Arc::new(transport),
            );
        }
        let page1 = registry.list(ListOptions {
            limit: Some(2),
            continue_token: None,
        });
        assert_eq!(page1.items.len(), 2);
        assert!(page1.continue_token.is_some());
    }
}
