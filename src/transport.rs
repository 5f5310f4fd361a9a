//! OpAMP Transport Port (`# 6 EXTERNAL INTERFACES`, consumed by C3): one
//! live connection's writer. Wire-level OpAMP framing is out of scope
//! (`# 1 Non-goals`); this crate only needs a place to hand the server's
//! outbound bytes to whatever actually owns the socket.

use crate::domain::agent::Agent;
use crate::error::CommanderError;

/// The opaque outbound payload built from an agent's desired spec
/// (`# 4.5` receive handler: "builds the outbound OpAMP message from
/// Spec"). Framing itself is an external collaborator's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerToAgentMessage {
    pub instance_uid: crate::domain::InstanceUid,
    pub remote_config_names: Vec<String>,
    pub new_instance_uid: Option<crate::domain::InstanceUid>,
}

pub fn build_server_to_agent_message(agent: &Agent) -> ServerToAgentMessage {
    ServerToAgentMessage {
        instance_uid: agent.metadata.instance_uid,
        remote_config_names: agent.spec.remote_config.remote_config_names(),
        new_instance_uid: agent.spec.new_instance_uid,
    }
}

/// A single connection's transport handle (`# 3 Connection`). Implemented
/// by whatever owns the WebSocket/long-poll socket for that connection.
#[cfg_attr(test, mockall::automock)]
pub trait TransportHandle: Send + Sync {
    fn send(&self, message: ServerToAgentMessage) -> Result<(), CommanderError>;
}
