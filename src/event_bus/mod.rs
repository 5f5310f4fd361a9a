//! Event Bus Port (`# 6`) and its envelope (C5, `# 4.5`).

pub mod memory;
pub mod message;
pub mod port;

pub use memory::InMemoryEventBus;
pub use message::{Message, MessagePayload};
pub use port::EventBusPort;
