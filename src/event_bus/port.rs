//! Event Bus Port (`# 6 EXTERNAL INTERFACES`): `Publish` and `Subscribe`,
//! transport-agnostic by design (pub/sub or message queue both fit).

use super::message::Message;
use crate::error::CommanderError;
use tokio::sync::mpsc::UnboundedReceiver;

#[cfg_attr(test, mockall::automock)]
pub trait EventBusPort: Send + Sync {
    fn publish(&self, target_server_id: &str, message: Message) -> Result<(), CommanderError>;

    /// Returns a receiver of messages addressed to `self_server_id`. Each
    /// call establishes an independent subscription (`# 4.5` "a single
    /// long-running subscriber task reads from the bus" — the commander
    /// holds exactly one).
    fn subscribe(&self, self_server_id: &str) -> UnboundedReceiver<Message>;
}
