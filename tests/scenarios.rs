//! End-to-end coverage for the six literal scenarios, exercised against the
//! in-memory reference adapters.

use chrono::Utc;
use opamp_commander::connection_registry::ConnectionRegistry;
use opamp_commander::domain::agent::{Agent, AgentReport, ConnectionType};
use opamp_commander::domain::common::AttributeMap;
use opamp_commander::domain::group::{
    AgentGroup, AgentGroupMetadata, AgentGroupSpec, AgentRemoteConfigEntry, Selector,
};
use opamp_commander::domain::remote_config::{AgentRemoteConfig, AgentRemoteConfigSpec};
use opamp_commander::domain::server::Server;
use opamp_commander::domain::InstanceUid;
use opamp_commander::event_bus::{EventBusPort, InMemoryEventBus};
use opamp_commander::group_resolver::AgentGroupResolver;
use opamp_commander::persistence::{InMemoryStore, PersistencePort};
use opamp_commander::reconciler::AgentReconciler;
use opamp_commander::router::MessageRouter;
use opamp_commander::server_identity::{ServerIdentity, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_HEARTBEAT_TIMEOUT};
use opamp_commander::transport::{ServerToAgentMessage, TransportHandle};
use std::sync::{Arc, Mutex};

/// A transport double for integration tests; `mockall::automock` is only
/// generated under `#[cfg(test)]` on the library crate itself and is not
/// visible here.
#[derive(Default)]
struct RecordingTransport {
    received: Mutex<Vec<ServerToAgentMessage>>,
}

impl TransportHandle for RecordingTransport {
    fn send(&self, message: ServerToAgentMessage) -> Result<(), opamp_commander::error::CommanderError> {
        self.received.lock().unwrap().push(message);
        Ok(())
    }
}

struct Harness {
    store: Arc<dyn PersistencePort>,
    reconciler: Arc<AgentReconciler>,
    group_resolver: Arc<AgentGroupResolver>,
}

fn harness(server_id: &str) -> Harness {
    let store: Arc<dyn PersistencePort> = Arc::new(InMemoryStore::new());
    let bus: Arc<dyn EventBusPort> = Arc::new(InMemoryEventBus::new());
    let identity = Arc::new(ServerIdentity::new(
        store.clone(),
        server_id,
        DEFAULT_HEARTBEAT_INTERVAL,
        DEFAULT_HEARTBEAT_TIMEOUT,
    ));
    identity.register().unwrap();
    let connections = Arc::new(ConnectionRegistry::new());
    let router = Arc::new(MessageRouter::new(
        server_id,
        bus,
        identity,
        connections,
        store.clone(),
    ));
    let reconciler = Arc::new(AgentReconciler::new(store.clone(), router));
    let group_resolver = Arc::new(AgentGroupResolver::new(store.clone(), reconciler.clone()));
    Harness {
        store,
        reconciler,
        group_resolver,
    }
}

fn agent_selecting(store: &Arc<dyn PersistencePort>, env: &str) -> Agent {
    let mut agent = Agent::new(InstanceUid::new_random());
    agent
        .metadata
        .description
        .identifying_attributes
        .insert("env".to_string(), env.to_string());
    store.put_agent(&agent).unwrap();
    agent
}

fn selector_for(env: &str) -> Selector {
    Selector {
        identifying_attributes: AttributeMap::from([("env".to_string(), env.to_string())]),
        non_identifying_attributes: AttributeMap::new(),
    }
}

/// Scenario 1: inline collision.
#[test]
fn inline_collision_produces_two_independent_keys() {
    let h = harness("s1");
    let agent = agent_selecting(&h.store, "prod");

    for (group_name, body) in [("alpha", "alpha body"), ("beta", "beta body")] {
        let group = AgentGroup {
            metadata: AgentGroupMetadata {
                name: group_name.to_string(),
                priority: 0,
                selector: selector_for("prod"),
                attributes: AttributeMap::new(),
            },
            spec: AgentGroupSpec {
                agent_remote_configs: vec![AgentRemoteConfigEntry::Inline {
                    name: "config".to_string(),
                    value: body.as_bytes().to_vec(),
                    content_type: "text/plain".to_string(),
                }],
            },
            ..Default::default()
        };
        h.group_resolver.reconcile_group(&group).unwrap();
    }

    let saved = h.store.get_agent(agent.metadata.instance_uid).unwrap().unwrap();
    assert_eq!(saved.spec.remote_config.config_map.len(), 2);
    assert_eq!(saved.spec.remote_config.config_map["alpha/config"].body, b"alpha body");
    assert_eq!(saved.spec.remote_config.config_map["beta/config"].body, b"beta body");
}

/// Scenario 2: shared reference.
#[test]
fn shared_reference_yields_one_key_for_both_groups() {
    let h = harness("s1");
    let agent = agent_selecting(&h.store, "prod");
    h.store
        .put_agent_remote_config(&AgentRemoteConfig {
            name: "shared-otel-config".to_string(),
            spec: AgentRemoteConfigSpec {
                value: b"otel config bytes".to_vec(),
                content_type: "text/yaml".to_string(),
            },
            ..Default::default()
        })
        .unwrap();

    for group_name in ["alpha", "beta"] {
        let group = AgentGroup {
            metadata: AgentGroupMetadata {
                name: group_name.to_string(),
                priority: 0,
                selector: selector_for("prod"),
                attributes: AttributeMap::new(),
            },
            spec: AgentGroupSpec {
                agent_remote_configs: vec![AgentRemoteConfigEntry::Ref("shared-otel-config".to_string())],
            },
            ..Default::default()
        };
        h.group_resolver.reconcile_group(&group).unwrap();
    }

    let saved = h.store.get_agent(agent.metadata.instance_uid).unwrap().unwrap();
    assert_eq!(saved.spec.remote_config.config_map.len(), 1);
    assert_eq!(
        saved.spec.remote_config.config_map["shared-otel-config"].body,
        b"otel config bytes"
    );
    assert!(!saved.spec.remote_config.config_map.contains_key("alpha/shared-otel-config"));
    assert!(!saved.spec.remote_config.config_map.contains_key("beta/shared-otel-config"));
}

/// Scenario 3: stale sequence number.
#[test]
fn stale_sequence_number_does_not_override_status() {
    let h = harness("s1");
    let uid = InstanceUid::new_random();

    h.reconciler
        .ingest_report(
            uid,
            AgentReport {
                sequence_num: 5,
                connected: Some(true),
                connection_type: Some(ConnectionType::WebSocket),
                ..Default::default()
            },
        )
        .unwrap();

    let result = h
        .reconciler
        .ingest_report(
            uid,
            AgentReport {
                sequence_num: 3,
                connected: Some(false),
                ..Default::default()
            },
        )
        .unwrap();

    assert_eq!(result.status.sequence_num, 5);
    assert!(result.status.connected);
    assert_eq!(result.status.connection_type, Some(ConnectionType::WebSocket));
}

/// Scenario 4: server liveness.
#[test]
fn registration_succeeds_only_once_previous_record_is_stale() {
    let store: Arc<dyn PersistencePort> = Arc::new(InMemoryStore::new());

    let mut stale = Server::new("s1", Utc::now() - chrono::Duration::seconds(120));
    stale = store.put_server(&stale).unwrap();
    let _ = stale;
    let identity_after_stale = ServerIdentity::new(store.clone(), "s1", DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_HEARTBEAT_TIMEOUT);
    assert!(identity_after_stale.register().is_ok());

    let fresh = ServerIdentity::new(store, "s1", DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_HEARTBEAT_TIMEOUT);
    let err = fresh.register().unwrap_err();
    assert!(matches!(err, opamp_commander::error::CommanderError::AlreadyExists(_)));
}

/// Scenario 5: cross-server wake-up.
#[tokio::test]
async fn cross_server_wake_up_delivers_to_the_owning_connection() {
    let store: Arc<dyn PersistencePort> = Arc::new(InMemoryStore::new());
    let bus: Arc<dyn EventBusPort> = Arc::new(InMemoryEventBus::new());

    let identity_a = Arc::new(ServerIdentity::new(store.clone(), "server-a", DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_HEARTBEAT_TIMEOUT));
    identity_a.register().unwrap();
    let connections_a = Arc::new(ConnectionRegistry::new());
    let router_a = Arc::new(MessageRouter::new("server-a", bus.clone(), identity_a, connections_a.clone(), store.clone()));

    let identity_b = Arc::new(ServerIdentity::new(store.clone(), "server-b", DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_HEARTBEAT_TIMEOUT));
    identity_b.register().unwrap();
    let connections_b = Arc::new(ConnectionRegistry::new());
    let router_b = Arc::new(MessageRouter::new("server-b", bus.clone(), identity_b, connections_b, store.clone()));
    let reconciler_b = Arc::new(AgentReconciler::new(store.clone(), router_b));

    let uid = InstanceUid::new_random();
    let mut agent = Agent::new(uid);
    agent.status.connected = true;
    agent.status.last_reported_to = Some("server-a".to_string());
    store.put_agent(&agent).unwrap();

    let transport = Arc::new(RecordingTransport::default());
    connections_a.save(
        opamp_commander::domain::connection::Connection::new("c1", ConnectionType::WebSocket, Utc::now()),
        transport.clone(),
    );
    connections_a.bind_instance_uid("c1", uid);

    let cancellation = tokio_util::sync::CancellationToken::new();
    let subscriber_cancel = cancellation.clone();
    let subscriber = tokio::spawn(async move { router_a.run(subscriber_cancel).await });

    store
        .put_agent_remote_config(&AgentRemoteConfig {
            name: "app-config".to_string(),
            spec: AgentRemoteConfigSpec {
                value: b"v1".to_vec(),
                content_type: "text/plain".to_string(),
            },
            ..Default::default()
        })
        .unwrap();
    reconciler_b.apply_remote_config(uid, "app-config").unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    cancellation.cancel();
    subscriber.await.unwrap();

    let received = transport.received.lock().unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].instance_uid, uid);
}

/// Scenario 6: missing reference.
#[test]
fn missing_reference_records_resolve_failed_condition() {
    let h = harness("s1");
    let _agent = agent_selecting(&h.store, "prod");

    let group = AgentGroup {
        metadata: AgentGroupMetadata {
            name: "g".to_string(),
            priority: 0,
            selector: selector_for("prod"),
            attributes: AttributeMap::new(),
        },
        spec: AgentGroupSpec {
            agent_remote_configs: vec![AgentRemoteConfigEntry::Ref("non-existent".to_string())],
        },
        ..Default::default()
    };

    let result = h.group_resolver.reconcile_group(&group).unwrap();
    let failure = result
        .status
        .conditions
        .iter()
        .find(|c| c.type_ == "ResolveFailed")
        .expect("expected a ResolveFailed condition");
    assert!(failure.message.contains("non-existent"));
}
