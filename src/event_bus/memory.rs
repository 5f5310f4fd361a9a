//! In-memory reference adapter for [`EventBusPort`]: one channel per
//! target server, matching `# 5 Shared resources`: "Event bus: shared;
//! subject-per-target-server."

use super::message::Message;
use super::port::EventBusPort;
use crate::error::CommanderError;
use dashmap::DashMap;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

#[derive(Default)]
pub struct InMemoryEventBus {
    subjects: DashMap<String, UnboundedSender<Message>>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventBusPort for InMemoryEventBus {
    fn publish(&self, target_server_id: &str, message: Message) -> Result<(), CommanderError> {
        match self.subjects.get(target_server_id) {
            Some(sender) => sender
                .send(message)
                .map_err(|e| CommanderError::Internal(format!("publishing to event bus: {e}"))),
            // No subscriber yet (peer not started, or already stopped):
            // at-least-once delivery is not promised across restarts
            // (`# 5 Ordering guarantees`), so this is not an error.
            None => Ok(()),
        }
    }

    fn subscribe(&self, self_server_id: &str) -> UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subjects.insert(self_server_id.to_string(), tx);
        rx
    }
}
