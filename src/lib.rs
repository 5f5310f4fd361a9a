//! OpAMP fleet commander: agent state reconciliation, group-driven config
//! fan-out, and cross-server message routing (`# 2 System Overview`).

pub mod cli;
pub mod commander;
pub mod config;
pub mod connection_registry;
pub mod domain;
pub mod error;
pub mod event_bus;
pub mod group_resolver;
pub mod logging;
pub mod persistence;
pub mod reconciler;
pub mod router;
pub mod server_identity;
pub mod transport;
