//! Integration tests for the registry actor through its public handle.
//!
//! These drive `spawn_registry` directly with in-memory outbound queues,
//! without sockets, to check arbitration and housekeeping end to end.
//!
//! Tests CAN use `.unwrap()` and `.expect()` - this is allowed.

use std::sync::Arc;
use std::time::Duration;

use quiz_core::{ClientId, ClientStatus};
use quiz_protocol::{InboundMessage, OutboundCommand};
use quizd::config::DaemonConfig;
use quizd::control::ControlFlags;
use quizd::registry::{
    spawn_registry, RegistryError, RegistryEvent, RegistryHandle, OUTBOUND_BUFFER,
};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

const POLL_INTERVAL_MS: u64 = 25;
const RECV_TIMEOUT: Duration = Duration::from_secs(2);

// ============================================================================
// Test Helpers
// ============================================================================

struct Harness {
    registry: RegistryHandle,
    control: Arc<ControlFlags>,
    events: broadcast::Receiver<RegistryEvent>,
    cancel_token: CancellationToken,
    task: tokio::task::JoinHandle<Result<(), RegistryError>>,
}

impl Harness {
    fn spawn(max_clients: usize) -> Self {
        let config = DaemonConfig {
            poll_interval_ms: POLL_INTERVAL_MS,
            idle_timeout_secs: 0,
            max_clients,
            ..DaemonConfig::default()
        };
        let control = ControlFlags::new_shared();
        let cancel_token = CancellationToken::new();
        let (registry, task) = spawn_registry(&config, control.clone(), cancel_token.clone());
        let events = registry.subscribe();

        Self {
            registry,
            control,
            events,
            cancel_token,
            task,
        }
    }

    /// Registers a named client and returns its outbound queue.
    async fn join(&self, id: u64, name: &str) -> mpsc::Receiver<OutboundCommand> {
        let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);
        let client_id = ClientId::new(id);
        self.registry.connect(client_id, None, tx).await.unwrap();
        self.registry
            .deliver(client_id, InboundMessage::Name(name.to_string()))
            .await
            .unwrap();
        rx
    }

    async fn wait_for<F>(&mut self, predicate: F) -> RegistryEvent
    where
        F: Fn(&RegistryEvent) -> bool,
    {
        timeout(RECV_TIMEOUT, async {
            loop {
                match self.events.recv().await {
                    Ok(event) if predicate(&event) => return event,
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => {
                        panic!("Registry event channel closed")
                    }
                }
            }
        })
        .await
        .expect("Timed out waiting for registry event")
    }
}

async fn next_command(rx: &mut mpsc::Receiver<OutboundCommand>) -> OutboundCommand {
    timeout(RECV_TIMEOUT, rx.recv())
        .await
        .expect("Timed out waiting for command")
        .expect("outbound queue closed")
}

// ============================================================================
// Registration Tests
// ============================================================================

#[tokio::test]
async fn test_duplicate_id_rejected() {
    let harness = Harness::spawn(8);
    let _rx = harness.join(1, "Alice").await;

    let (tx, _rx2) = mpsc::channel(OUTBOUND_BUFFER);
    let result = harness.registry.connect(ClientId::new(1), None, tx).await;

    assert_eq!(result, Err(RegistryError::ClientAlreadyExists(ClientId::new(1))));
    assert_eq!(harness.registry.get_all_clients().await.len(), 1);
}

#[tokio::test]
async fn test_capacity_is_enforced() {
    let harness = Harness::spawn(2);
    let _a = harness.join(1, "Alice").await;
    let _b = harness.join(2, "Bob").await;

    let (tx, _rx) = mpsc::channel(OUTBOUND_BUFFER);
    let result = harness.registry.connect(ClientId::new(3), None, tx).await;
    assert_eq!(result, Err(RegistryError::RegistryFull { max: 2 }));

    // A departure makes room again
    harness
        .registry
        .disconnect(ClientId::new(1), quizd::registry::DisconnectReason::Closed)
        .await
        .unwrap();
    let (tx, _rx) = mpsc::channel(OUTBOUND_BUFFER);
    harness
        .registry
        .connect(ClientId::new(3), None, tx)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_messages_from_unknown_client_are_dropped() {
    let harness = Harness::spawn(8);
    let mut alice = harness.join(1, "Alice").await;

    harness
        .registry
        .deliver(ClientId::new(99), InboundMessage::Buzz)
        .await
        .unwrap();

    assert!(harness.registry.get_answerer().await.is_none());
    assert!(harness.registry.get_client(ClientId::new(99)).await.is_none());
    assert!(alice.try_recv().is_err());
}

// ============================================================================
// Arbitration Tests
// ============================================================================

#[tokio::test]
async fn test_buzz_order_is_command_order() {
    let harness = Harness::spawn(8);
    let mut alice = harness.join(1, "Alice").await;
    let mut bob = harness.join(2, "Bob").await;

    harness
        .registry
        .deliver(ClientId::new(2), InboundMessage::Buzz)
        .await
        .unwrap();
    harness
        .registry
        .deliver(ClientId::new(1), InboundMessage::Buzz)
        .await
        .unwrap();

    assert_eq!(next_command(&mut bob).await, OutboundCommand::Accepted);
    assert_eq!(next_command(&mut alice).await, OutboundCommand::Lock);

    let answerer = harness.registry.get_answerer().await.unwrap();
    assert_eq!(answerer.id, ClientId::new(2));
    assert_eq!(answerer.name.as_deref(), Some("Bob"));

    let alice_view = harness.registry.get_client(ClientId::new(1)).await.unwrap();
    assert_eq!(alice_view.status, ClientStatus::LockedByAnswerer);
}

// ============================================================================
// Housekeeping Tests
// ============================================================================

#[tokio::test]
async fn test_control_serviced_under_continuous_traffic() {
    let mut harness = Harness::spawn(8);
    let mut alice = harness.join(1, "Alice").await;
    let mut bob = harness.join(2, "Bob").await;

    harness
        .registry
        .deliver(ClientId::new(1), InboundMessage::Buzz)
        .await
        .unwrap();
    assert_eq!(next_command(&mut alice).await, OutboundCommand::Accepted);
    assert_eq!(next_command(&mut bob).await, OutboundCommand::Lock);

    // Keep the command channel busy well inside the poll interval
    let chatter = harness.registry.clone();
    let noise = tokio::spawn(async move {
        loop {
            if chatter
                .deliver(ClientId::new(2), InboundMessage::KeepAlive)
                .await
                .is_err()
            {
                break;
            }
            sleep(Duration::from_millis(2)).await;
        }
    });

    harness.control.request_lockout();

    let event = harness
        .wait_for(|e| matches!(e, RegistryEvent::LockedOut { .. }))
        .await;
    assert_eq!(
        event,
        RegistryEvent::LockedOut {
            answerer: Some(ClientId::new(1))
        }
    );
    assert_eq!(next_command(&mut alice).await, OutboundCommand::Lock);
    assert_eq!(next_command(&mut bob).await, OutboundCommand::Unlock);

    noise.abort();
}

#[tokio::test]
async fn test_lockout_then_reset_in_same_tick() {
    let mut harness = Harness::spawn(8);
    let mut alice = harness.join(1, "Alice").await;
    let mut bob = harness.join(2, "Bob").await;

    harness
        .registry
        .deliver(ClientId::new(1), InboundMessage::Buzz)
        .await
        .unwrap();
    assert_eq!(next_command(&mut alice).await, OutboundCommand::Accepted);
    assert_eq!(next_command(&mut bob).await, OutboundCommand::Lock);

    harness.control.request_lockout();
    harness.control.request_reset();

    harness
        .wait_for(|e| matches!(e, RegistryEvent::RoundReset { .. }))
        .await;

    // Lockout is applied first, then the reset releases everyone
    assert_eq!(next_command(&mut alice).await, OutboundCommand::Lock);
    assert_eq!(next_command(&mut bob).await, OutboundCommand::Unlock);
    assert_eq!(next_command(&mut alice).await, OutboundCommand::Unlock);

    for view in harness.registry.get_all_clients().await {
        assert_eq!(view.status, ClientStatus::Named);
    }
    assert!(!harness.control.is_pending());
}

// ============================================================================
// Shutdown Tests
// ============================================================================

#[tokio::test]
async fn test_cancellation_stops_actor_cleanly() {
    let harness = Harness::spawn(8);
    let mut alice = harness.join(1, "Alice").await;

    harness.cancel_token.cancel();

    let result = timeout(RECV_TIMEOUT, harness.task)
        .await
        .expect("actor did not stop")
        .expect("actor task panicked");
    assert_eq!(result, Ok(()));

    // Outbound queues are dropped with the actor
    assert_eq!(
        timeout(RECV_TIMEOUT, alice.recv()).await.unwrap(),
        None
    );
}
