//! Robustness tests for the buzzer server.
//!
//! These tests verify the daemon handles edge cases and error conditions gracefully:
//! - Malformed and oversized input
//! - Rapid connect/disconnect
//! - Simultaneous buzzes
//! - Idle client sweep
//!
//! Tests CAN use `.unwrap()` and `.expect()` - this is allowed.

use std::net::SocketAddr;
use std::time::Duration;

use quiz_core::{ClientId, ClientStatus};
use quizd::config::DaemonConfig;
use quizd::control::ControlFlags;
use quizd::registry::{spawn_registry, DisconnectReason, RegistryEvent, RegistryHandle};
use quizd::server::QuizServer;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Constants
// ============================================================================

const POLL_INTERVAL_MS: u64 = 20;
const RECV_TIMEOUT: Duration = Duration::from_secs(2);
const IDLE_WAIT_TIMEOUT: Duration = Duration::from_secs(4);
const SETTLE_DELAY: Duration = Duration::from_millis(100);
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_millis(100);

const LOCK: u8 = b'8';
const UNLOCK: u8 = b'7';
const ACCEPTED: u8 = b'9';

// ============================================================================
// Test Helpers
// ============================================================================

struct TestServer {
    addr: SocketAddr,
    registry: RegistryHandle,
    events: broadcast::Receiver<RegistryEvent>,
    cancel_token: CancellationToken,
}

impl TestServer {
    async fn spawn() -> Self {
        Self::spawn_with(0).await
    }

    async fn spawn_with(idle_timeout_secs: u64) -> Self {
        let config = DaemonConfig {
            listen: SocketAddr::from(([127, 0, 0, 1], 0)),
            poll_interval_ms: POLL_INTERVAL_MS,
            idle_timeout_secs,
            ..DaemonConfig::default()
        };
        let cancel_token = CancellationToken::new();

        let (registry, _task) =
            spawn_registry(&config, ControlFlags::new_shared(), cancel_token.clone());
        let events = registry.subscribe();

        let server = QuizServer::bind(config.listen, registry.clone(), cancel_token.clone())
            .await
            .expect("bind test server");
        let addr = server.local_addr();

        tokio::spawn(async move {
            let _ = server.run().await;
        });

        TestServer {
            addr,
            registry,
            events,
            cancel_token,
        }
    }

    async fn join(&mut self, name: &str) -> (TestClient, ClientId) {
        let stream = TcpStream::connect(self.addr)
            .await
            .expect("connect to server");
        let mut client = TestClient::new(stream);

        let client_id = match self
            .wait_for(RECV_TIMEOUT, |e| matches!(e, RegistryEvent::Connected { .. }))
            .await
        {
            RegistryEvent::Connected { client_id } => client_id,
            other => panic!("Expected Connected, got {other:?}"),
        };

        client.send(format!("Name:{name}").as_bytes()).await;
        self.wait_for(RECV_TIMEOUT, |e| {
            matches!(e, RegistryEvent::Named { client_id: id, .. } if *id == client_id)
        })
        .await;

        (client, client_id)
    }

    async fn wait_for<F>(&mut self, limit: Duration, predicate: F) -> RegistryEvent
    where
        F: Fn(&RegistryEvent) -> bool,
    {
        timeout(limit, async {
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

    /// Polls until the registry holds `expected` clients.
    async fn wait_for_count(&self, expected: usize) {
        let start = tokio::time::Instant::now();
        loop {
            let count = self.registry.get_all_clients().await.len();
            if count == expected {
                return;
            }
            assert!(
                start.elapsed() < RECV_TIMEOUT,
                "Registry holds {count} clients, expected {expected}"
            );
            sleep(Duration::from_millis(10)).await;
        }
    }

    async fn shutdown(self) {
        self.cancel_token.cancel();
        sleep(SHUTDOWN_GRACE_PERIOD).await;
    }
}

struct TestClient {
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
}

impl TestClient {
    fn new(stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self { reader, writer }
    }

    async fn send(&mut self, data: &[u8]) {
        self.writer.write_all(data).await.unwrap();
        self.writer.flush().await.unwrap();
    }

    async fn recv(&mut self) -> u8 {
        let mut byte = [0u8; 1];
        timeout(RECV_TIMEOUT, self.reader.read_exact(&mut byte))
            .await
            .expect("Timed out waiting for a command byte")
            .expect("read command byte");
        byte[0]
    }

    async fn expect_closed(&mut self) {
        let mut byte = [0u8; 1];
        match timeout(RECV_TIMEOUT, self.reader.read(&mut byte)).await {
            Ok(Ok(0)) | Ok(Err(_)) => {}
            Ok(Ok(_)) => panic!("Expected close, got byte {:?}", byte[0] as char),
            Err(_) => panic!("Connection was not closed"),
        }
    }
}

// ============================================================================
// Malformed Input Tests
// ============================================================================

#[tokio::test]
async fn test_unrecognized_input_is_ignored() {
    let mut server = TestServer::spawn().await;
    let (mut client, client_id) = server.join("Alice").await;

    client.send(b"hello there").await;
    sleep(SETTLE_DELAY).await;

    let view = server.registry.get_client(client_id).await.unwrap();
    assert_eq!(view.status, ClientStatus::Named);

    // Connection still works
    client.send(b"9").await;
    assert_eq!(client.recv().await, ACCEPTED);

    server.shutdown().await;
}

#[tokio::test]
async fn test_invalid_utf8_is_ignored() {
    let mut server = TestServer::spawn().await;
    let (mut client, client_id) = server.join("Alice").await;

    client.send(&[0xff, 0xfe, 0x39]).await;
    sleep(SETTLE_DELAY).await;

    assert!(server.registry.get_answerer().await.is_none());
    assert!(server.registry.get_client(client_id).await.is_some());

    client.send(b"0").await;
    assert_eq!(client.recv().await, LOCK);

    server.shutdown().await;
}

#[tokio::test]
async fn test_empty_name_is_ignored() {
    let mut server = TestServer::spawn().await;
    let (mut client, client_id) = server.join("Alice").await;

    client.send(b"Name:").await;
    sleep(SETTLE_DELAY).await;

    let view = server.registry.get_client(client_id).await.unwrap();
    assert_eq!(view.name.as_deref(), Some("Alice"));

    client.send(b"1").await;
    assert_eq!(client.recv().await, UNLOCK);

    server.shutdown().await;
}

#[tokio::test]
async fn test_oversized_input_is_ignored() {
    let mut server = TestServer::spawn().await;
    let (mut client, client_id) = server.join("Alice").await;

    // Larger than one read; every chunk is unrecognized
    let mut garbage = vec![b'x'; 4096];
    garbage.push(b'\n');
    client.send(&garbage).await;
    client.send(b"9\n").await;

    assert_eq!(client.recv().await, ACCEPTED);
    assert_eq!(server.registry.get_answerer().await.unwrap().id, client_id);

    server.shutdown().await;
}

// ============================================================================
// Connection Churn Tests
// ============================================================================

#[tokio::test]
async fn test_rapid_connect_disconnect() {
    let mut server = TestServer::spawn().await;

    const CHURN: usize = 20;

    for _ in 0..CHURN {
        let stream = TcpStream::connect(server.addr).await.unwrap();
        drop(stream);
    }

    for _ in 0..CHURN {
        server
            .wait_for(RECV_TIMEOUT, |e| {
                matches!(e, RegistryEvent::Disconnected { .. })
            })
            .await;
    }
    server.wait_for_count(0).await;

    // Server still serves new clients
    let (mut client, _) = server.join("Survivor").await;
    client.send(b"9").await;
    assert_eq!(client.recv().await, ACCEPTED);

    server.shutdown().await;
}

#[tokio::test]
async fn test_simultaneous_buzzes_have_one_winner() {
    let mut server = TestServer::spawn().await;

    let mut clients = Vec::new();
    for i in 0..8 {
        clients.push(server.join(&format!("player-{i}")).await);
    }

    let mut tasks = JoinSet::new();
    for (mut client, client_id) in clients {
        tasks.spawn(async move {
            client.send(b"9").await;
            (client_id, client.recv().await)
        });
    }

    let mut winners = Vec::new();
    let mut locked = 0;
    while let Some(result) = tasks.join_next().await {
        let (client_id, byte) = result.unwrap();
        match byte {
            ACCEPTED => winners.push(client_id),
            LOCK => locked += 1,
            other => panic!("Unexpected byte {:?}", other as char),
        }
    }

    assert_eq!(winners.len(), 1, "exactly one winner expected");
    assert_eq!(locked, 7);
    assert_eq!(server.registry.get_answerer().await.unwrap().id, winners[0]);

    server.shutdown().await;
}

// ============================================================================
// Idle Sweep Tests
// ============================================================================

#[tokio::test]
async fn test_silent_client_is_dropped() {
    let mut server = TestServer::spawn_with(1).await;
    let (mut client, client_id) = server.join("Sleepy").await;

    let event = server
        .wait_for(IDLE_WAIT_TIMEOUT, |e| {
            matches!(e, RegistryEvent::Disconnected { .. })
        })
        .await;
    assert_eq!(
        event,
        RegistryEvent::Disconnected {
            client_id,
            reason: DisconnectReason::Idle,
            was_answerer: false,
        }
    );

    client.expect_closed().await;
    assert!(server.registry.get_client(client_id).await.is_none());

    server.shutdown().await;
}

#[tokio::test]
async fn test_keep_alive_prevents_idle_drop() {
    let mut server = TestServer::spawn_with(1).await;
    let (mut client, client_id) = server.join("Chatty").await;

    for _ in 0..8 {
        sleep(Duration::from_millis(250)).await;
        client.send(b"ka").await;
    }

    assert!(server.registry.get_client(client_id).await.is_some());

    server.shutdown().await;
}
