//! Inter-Server Message Router (C5, `# 4.5`): a thin router over the
//! external event bus, dispatching received messages to local handlers.

use crate::connection_registry::{ConnectionRegistry, ConnectionRegistryError};
use crate::domain::InstanceUid;
use crate::error::CommanderError;
use crate::event_bus::{EventBusPort, Message, MessagePayload};
use crate::persistence::PersistencePort;
use crate::server_identity::ServerIdentity;
use crate::transport::build_server_to_agent_message;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct MessageRouter {
    server_id: String,
    event_bus: Arc<dyn EventBusPort>,
    identity: Arc<ServerIdentity>,
    connections: Arc<ConnectionRegistry>,
    store: Arc<dyn PersistencePort>,
}

impl MessageRouter {
    pub fn new(
        server_id: impl Into<String>,
        event_bus: Arc<dyn EventBusPort>,
        identity: Arc<ServerIdentity>,
        connections: Arc<ConnectionRegistry>,
        store: Arc<dyn PersistencePort>,
    ) -> Self {
        Self {
            server_id: server_id.into(),
            event_bus,
            identity,
            connections,
            store,
        }
    }

    /// `SendToServer`: refuses if the target is not alive (`# 4.5 Send`).
    pub fn send_to_server(&self, target_server_id: &str, message: Message) -> Result<(), CommanderError> {
        let target = self
            .store
            .get_server(target_server_id)?
            .ok_or_else(|| CommanderError::PeerUnavailable(target_server_id.to_string()))?;
        if !self.identity.is_alive(&target) {
            return Err(CommanderError::PeerUnavailable(target_server_id.to_string()));
        }
        self.event_bus.publish(target_server_id, message)
    }

    /// Convenience wrapper used by C1's `SaveAgent` notification path
    /// (`# 4.1`, `# 8` scenario 5).
    pub fn notify_spec_changed(
        &self,
        owning_server_id: &str,
        instance_uid: InstanceUid,
    ) -> Result<(), CommanderError> {
        let message = Message::send_server_to_agent(
            self.server_id.clone(),
            owning_server_id,
            vec![instance_uid],
        );
        self.send_to_server(owning_server_id, message)
    }

    fn handle_send_server_to_agent(&self, target_agent_instance_uids: &[InstanceUid]) {
        for instance_uid in target_agent_instance_uids {
            let Some(agent) = self.store.get_agent(*instance_uid).ok().flatten() else {
                debug!(%instance_uid, "agent not found while handling wake-up");
                continue;
            };
            let message = build_server_to_agent_message(&agent);
            match self.connections.send_server_to_agent(*instance_uid, message) {
                Ok(()) => info!(%instance_uid, "delivered pending outbound message"),
                Err(ConnectionRegistryError::NotFound) => {
                    // Not locally connected: another peer owns it, or a
                    // later trigger will retry (`# 4.5 Receive`).
                    debug!(%instance_uid, "agent not locally connected, skipping");
                }
                Err(e) => warn!(%instance_uid, error = %e, "failed to deliver outbound message"),
            }
        }
    }

    fn dispatch(&self, message: Message) {
        match message.payload {
            MessagePayload::SendServerToAgent {
                target_agent_instance_uids,
            } => self.handle_send_server_to_agent(&target_agent_instance_uids),
        }
    }

    /// Long-running subscriber task; returns when `cancellation` fires.
    /// Messages carry no ordering guarantees and handlers are idempotent
    /// by construction (`# 4.5 Ordering and cancellation`).
    #[tracing::instrument(skip_all, fields(server_id = %self.server_id))]
    pub async fn run(&self, cancellation: CancellationToken) {
        let mut receiver = self.event_bus.subscribe(&self.server_id);
        loop {
            tokio::select! {
                _ = cancellation.cancelled() => {
                    info!("subscriber loop stopping on cancellation");
                    return;
                }
                received = receiver.recv() => {
                    match received {
                        Some(message) => self.dispatch(message),
                        None => {
                            warn!("event bus channel closed, stopping subscriber loop");
                            return;
                        }
                    }
                }
            }
        }
    }
}
