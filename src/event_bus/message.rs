//! Inter-server message envelope (`# 4.5 Inter-Server Message Router`).

use crate::domain::InstanceUid;
use serde::{Deserialize, Serialize};

/// `Message{Source, Target, Type, Payload}` (`# 4.5 Envelope`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub source: String,
    /// Empty means "broadcast"; the commander core only ever sends
    /// targeted messages, but the envelope itself permits it.
    pub target: Option<String>,
    pub payload: MessagePayload,
}

/// The one message type named in `# 4.5`; the envelope leaves room for
/// future types without breaking existing subscribers (`unknown fields on
/// read are tolerated`, mirrored from the persistence convention in `# 4.6`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum MessagePayload {
    SendServerToAgent {
        target_agent_instance_uids: Vec<InstanceUid>,
    },
}

impl Message {
    pub fn send_server_to_agent(
        source: impl Into<String>,
        target: impl Into<String>,
        agent_instance_uids: Vec<InstanceUid>,
    ) -> Self {
        Self {
            source: source.into(),
            target: Some(target.into()),
            payload: MessagePayload::SendServerToAgent {
                target_agent_instance_uids: agent_instance_uids,
            },
        }
    }
}
