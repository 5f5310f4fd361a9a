//! Server Identity & Heartbeat (C4, `# 4.4`).

use crate::domain::common::{Condition, ConditionStatus, ListOptions};
use crate::domain::server::Server;
pub use crate::domain::server::DEFAULT_HEARTBEAT_TIMEOUT;
use crate::error::CommanderError;
use crate::persistence::PersistencePort;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

pub struct ServerIdentity {
    store: Arc<dyn PersistencePort>,
    server_id: String,
    heartbeat_interval: Duration,
    heartbeat_timeout: Duration,
}

impl ServerIdentity {
    pub fn new(
        store: Arc<dyn PersistencePort>,
        server_id: impl Into<String>,
        heartbeat_interval: Duration,
        heartbeat_timeout: Duration,
    ) -> Self {
        Self {
            store,
            server_id: server_id.into(),
            heartbeat_interval,
            heartbeat_timeout,
        }
    }

    /// On start, refuse to run if an alive record with the same ID already
    /// exists (`# 4.4 Register`, `# 8` scenario 4).
    pub fn register(&self) -> Result<Server, CommanderError> {
        let now = Utc::now();
        if let Some(existing) = self.store.get_server(&self.server_id)? {
            if existing.is_alive(now, self.heartbeat_timeout) {
                return Err(CommanderError::AlreadyExists(format!(
                    "server id `{}` is already registered and alive",
                    self.server_id
                )));
            }
        }
        let mut server = Server::new(self.server_id.clone(), now);
        server.conditions.push(Condition::new(
            "Registered",
            ConditionStatus::True,
            "StartupRegistration",
            "server registered with the cluster",
            now,
        ));
        let saved = self.store.put_server(&server)?;
        info!(server_id = %self.server_id, "server registered");
        Ok(saved)
    }

    pub fn current_server(&self) -> Result<Server, CommanderError> {
        self.store
            .get_server(&self.server_id)?
            .ok_or_else(|| CommanderError::NotFound(format!("server `{}`", self.server_id)))
    }

    pub fn get_server(&self, id: &str) -> Result<Server, CommanderError> {
        self.store
            .get_server(id)?
            .ok_or_else(|| CommanderError::NotFound(format!("server `{id}`")))
    }

    /// Alive-filtered by default (`# 4.4 ListServers`).
    pub fn list_servers(&self) -> Result<Vec<Server>, CommanderError> {
        let now = Utc::now();
        let page = self.store.list_servers(ListOptions::default())?;
        Ok(page
            .items
            .into_iter()
            .filter(|s| s.is_alive(now, self.heartbeat_timeout))
            .collect())
    }

    pub fn is_alive(&self, server: &Server) -> bool {
        server.is_alive(Utc::now(), self.heartbeat_timeout)
    }

    /// Runs the blocking store round trip on a blocking-pool thread so the
    /// caller's `tokio::time::timeout` can actually preempt a slow store
    /// (`# 5`: heartbeat budget) instead of wrapping an async block with no
    /// await point, which a `timeout` can never interrupt.
    fn heartbeat_once_blocking(store: &dyn PersistencePort, server_id: &str) -> Result<(), CommanderError> {
        let mut server = store
            .get_server(server_id)?
            .ok_or_else(|| CommanderError::NotFound(format!("server `{server_id}`")))?;
        server.last_heartbeat_at = Some(Utc::now());
        store.put_server(&server)?;
        Ok(())
    }

    /// Long-lived heartbeat loop; returns when `cancellation` fires
    /// (`# 9 Design Notes`: coroutine control flow, `Run(ctx)`).
    #[tracing::instrument(skip_all, fields(server_id = %self.server_id))]
    pub async fn run(&self, cancellation: CancellationToken) {
        let mut interval = tokio::time::interval(self.heartbeat_interval);
        loop {
            tokio::select! {
                _ = cancellation.cancelled() => {
                    info!("heartbeat loop stopping on cancellation");
                    return;
                }
                _ = interval.tick() => {
                    let deadline = self.heartbeat_interval / 3;
                    let store = self.store.clone();
                    let server_id = self.server_id.clone();
                    let task = tokio::task::spawn_blocking(move || {
                        Self::heartbeat_once_blocking(store.as_ref(), &server_id)
                    });
                    match tokio::time::timeout(deadline, task).await {
                        Ok(Ok(Ok(()))) => {}
                        Ok(Ok(Err(e))) => warn!(error = %e, "heartbeat write failed"),
                        Ok(Err(join_error)) => warn!(error = %join_error, "heartbeat task panicked"),
                        Err(_) => warn!(
                            ?deadline,
                            "heartbeat read+write exceeded HeartbeatInterval/3"
                        ),
                    }
                }
            }
        }
    }
}
