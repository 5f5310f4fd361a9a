//! The core data model (`# 3 DATA MODEL`): `Agent`, `AgentGroup`,
//! `AgentRemoteConfig`, `Server`, `Connection`, plus the common envelope
//! every persisted entity shares.

pub mod agent;
pub mod common;
pub mod connection;
pub mod group;
pub mod instance_uid;
pub mod remote_config;
pub mod server;

pub use agent::Agent;
pub use connection::Connection;
pub use group::AgentGroup;
pub use instance_uid::InstanceUid;
pub use remote_config::AgentRemoteConfig;
pub use server::Server;
