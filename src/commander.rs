//! Wires the six components together into one running process
//! (`# 2 System Overview`, `# 9 Design Notes`: "expose them via a `Run(ctx)`
//! method that returns when the context is cancelled").

use crate::config::CommanderConfig;
use crate::connection_registry::ConnectionRegistry;
use crate::error::CommanderError;
use crate::event_bus::{EventBusPort, InMemoryEventBus};
use crate::group_resolver::AgentGroupResolver;
use crate::persistence::{InMemoryStore, PersistencePort};
use crate::reconciler::AgentReconciler;
use crate::router::MessageRouter;
use crate::server_identity::ServerIdentity;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// A health/readiness snapshot, cheap to compute from already-resident
/// state (no store round trip beyond what `ServerIdentity` already caches).
#[derive(Debug, Clone)]
pub struct HealthSnapshot {
    pub server_id: String,
    pub registered: bool,
    pub alive_peer_count: usize,
    pub local_connection_count: usize,
}

pub struct Commander {
    config: CommanderConfig,
    store: Arc<dyn PersistencePort>,
    identity: Arc<ServerIdentity>,
    connections: Arc<ConnectionRegistry>,
    router: Arc<MessageRouter>,
    pub reconciler: Arc<AgentReconciler>,
    pub group_resolver: Arc<AgentGroupResolver>,
}

impl Commander {
    /// Wires the in-memory reference adapters (`# 1 Non-goals`: the
    /// document store and the event bus are external collaborators; these
    /// adapters exist so the core can run and be tested standalone).
    pub fn new(config: CommanderConfig) -> Self {
        let store: Arc<dyn PersistencePort> = Arc::new(InMemoryStore::new());
        let event_bus: Arc<dyn EventBusPort> = Arc::new(InMemoryEventBus::new());
        Self::with_adapters(config, store, event_bus)
    }

    pub fn with_adapters(
        config: CommanderConfig,
        store: Arc<dyn PersistencePort>,
        event_bus: Arc<dyn EventBusPort>,
    ) -> Self {
        let identity = Arc::new(ServerIdentity::new(
            store.clone(),
            config.server.id.clone(),
            config.server.heartbeat_interval,
            config.server.heartbeat_timeout,
        ));
        let connections = Arc::new(ConnectionRegistry::new());
        let router = Arc::new(MessageRouter::new(
            config.server.id.clone(),
            event_bus,
            identity.clone(),
            connections.clone(),
            store.clone(),
        ));
        let reconciler = Arc::new(AgentReconciler::new(store.clone(), router.clone()));
        let group_resolver = Arc::new(AgentGroupResolver::new(store.clone(), reconciler.clone()));

        Self {
            config,
            store,
            identity,
            connections,
            router,
            reconciler,
            group_resolver,
        }
    }

    pub fn connections(&self) -> &Arc<ConnectionRegistry> {
        &self.connections
    }

    pub fn health(&self) -> Result<HealthSnapshot, CommanderError> {
        let alive_peer_count = self.identity.list_servers()?.len();
        Ok(HealthSnapshot {
            server_id: self.config.server.id.clone(),
            registered: self.store.get_server(&self.config.server.id)?.is_some(),
            alive_peer_count,
            local_connection_count: self.connections.len(),
        })
    }

    /// Registers this server identity and runs the heartbeat and subscriber
    /// loops until `cancellation` fires, then waits for both to return
    /// (`# 4.4`, `# 4.5`).
    pub async fn run(&self, cancellation: CancellationToken) -> Result<(), CommanderError> {
        self.identity.register()?;
        info!(server_id = %self.config.server.id, "registered server identity");

        let identity = self.identity.clone();
        let identity_cancel = cancellation.clone();
        let heartbeat_task = tokio::spawn(async move { identity.run(identity_cancel).await });

        let router = self.router.clone();
        let router_cancel = cancellation.clone();
        let router_task = tokio::spawn(async move { router.run(router_cancel).await });

        let _ = tokio::join!(heartbeat_task, router_task);
        info!(server_id = %self.config.server.id, "commander shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerSection;
    use std::time::Duration;

    fn test_config() -> CommanderConfig {
        CommanderConfig {
            server: ServerSection {
                id: "s1".to_string(),
                heartbeat_interval: Duration::from_millis(10),
                heartbeat_timeout: Duration::from_secs(5),
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn health_reports_unregistered_before_run() {
        let commander = Commander::new(test_config());
        let health = commander.health().unwrap();
        assert!(!health.registered);
        assert_eq!(health.local_connection_count, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn run_registers_and_stops_on_cancellation() {
        let commander = Commander::new(test_config());
        let cancellation = CancellationToken::new();
        let run_cancel = cancellation.clone();

        let handle = tokio::spawn(async move { commander.run(run_cancel).await });
        tokio::time::sleep(Duration::from_millis(30)).await;
        cancellation.cancel();
        handle.await.unwrap().unwrap();
    }
}
