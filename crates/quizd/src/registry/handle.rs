//! Client interface for interacting with the RegistryActor.
//!
//! The `RegistryHandle` provides a cheap-to-clone interface for sending commands
//! to the registry actor and subscribing to registry events.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Channel errors are mapped to `RegistryError::ChannelClosed`

use std::net::SocketAddr;

use quiz_core::{ClientId, ClientView};
use quiz_protocol::InboundMessage;
use tokio::sync::{broadcast, mpsc, oneshot};

use super::commands::{
    DisconnectReason, OutboundSender, RegistryCommand, RegistryError, RegistryEvent,
};

// ============================================================================
// Registry Handle
// ============================================================================

/// Handle for interacting with the registry actor.
///
/// This is a cheap-to-clone handle that can be shared across tasks.
/// All methods are async and communicate with the actor via channels.
///
/// # Usage
///
/// ```ignore
/// let handle = registry_handle.clone();
///
/// // Register a connection, then forward its messages
/// handle.connect(client_id, Some(peer), outbound_tx).await?;
/// handle.deliver(client_id, InboundMessage::Buzz).await?;
///
/// // Observe arbitration
/// let mut rx = handle.subscribe();
/// while let Ok(event) = rx.recv().await {
///     // Handle event
/// }
/// ```
#[derive(Clone)]
pub struct RegistryHandle {
    /// Command sender to the actor
    sender: mpsc::Sender<RegistryCommand>,

    /// Event broadcaster for subscribing to updates
    event_sender: broadcast::Sender<RegistryEvent>,
}

impl RegistryHandle {
    /// Create a new registry handle.
    pub fn new(
        sender: mpsc::Sender<RegistryCommand>,
        event_sender: broadcast::Sender<RegistryEvent>,
    ) -> Self {
        Self {
            sender,
            event_sender,
        }
    }

    /// Register a newly accepted connection.
    ///
    /// Must complete before any `deliver` for the same client.
    ///
    /// # Errors
    ///
    /// - `RegistryError::ClientAlreadyExists` if the id is already live
    /// - `RegistryError::RegistryFull` if the registry is at maximum capacity
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn connect(
        &self,
        client_id: ClientId,
        peer: Option<SocketAddr>,
        outbound: OutboundSender,
    ) -> Result<(), RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Connect {
                client_id,
                peer,
                outbound,
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)?
    }

    /// Forward a decoded message from a client.
    ///
    /// Returns once the message is queued; it does not wait for arbitration.
    pub async fn deliver(
        &self,
        client_id: ClientId,
        message: InboundMessage,
    ) -> Result<(), RegistryError> {
        self.sender
            .send(RegistryCommand::Inbound { client_id, message })
            .await
            .map_err(|_| RegistryError::ChannelClosed)
    }

    /// Report that a connection ended.
    pub async fn disconnect(
        &self,
        client_id: ClientId,
        reason: DisconnectReason,
    ) -> Result<(), RegistryError> {
        self.sender
            .send(RegistryCommand::Disconnect { client_id, reason })
            .await
            .map_err(|_| RegistryError::ChannelClosed)
    }

    /// Get a single client by id.
    ///
    /// Returns `None` if the client doesn't exist or if communication
    /// with the actor fails.
    pub async fn get_client(&self, client_id: ClientId) -> Option<ClientView> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::GetClient {
                client_id,
                respond_to: tx,
            })
            .await
            .ok()?;

        rx.await.ok()?
    }

    /// Get all clients in connection order.
    ///
    /// Returns an empty vector if no clients are registered or if
    /// communication with the actor fails.
    pub async fn get_all_clients(&self) -> Vec<ClientView> {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::GetAllClients { respond_to: tx })
            .await
            .is_err()
        {
            return Vec::new();
        }

        rx.await.unwrap_or_default()
    }

    /// Get the client currently holding the buzzer.
    pub async fn get_answerer(&self) -> Option<ClientView> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::GetAnswerer { respond_to: tx })
            .await
            .ok()?;

        rx.await.ok()?
    }

    /// Subscribe to registry events.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.event_sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_handle_clone() {
        let (cmd_tx, _cmd_rx) = mpsc::channel(10);
        let (event_tx, _) = broadcast::channel(10);
        let handle = RegistryHandle::new(cmd_tx, event_tx);
        let _cloned = handle.clone();
    }

    #[tokio::test]
    async fn test_channel_closed_error() {
        let (cmd_tx, cmd_rx) = mpsc::channel(10);
        let (event_tx, _) = broadcast::channel(10);
        let handle = RegistryHandle::new(cmd_tx, event_tx);
        drop(cmd_rx);

        let (out_tx, _out_rx) = mpsc::channel(1);
        let result = handle.connect(ClientId::new(1), None, out_tx).await;
        assert_eq!(result, Err(RegistryError::ChannelClosed));

        let result = handle.deliver(ClientId::new(1), InboundMessage::Buzz).await;
        assert_eq!(result, Err(RegistryError::ChannelClosed));
    }

    #[tokio::test]
    async fn test_queries_degrade_when_actor_gone() {
        let (cmd_tx, cmd_rx) = mpsc::channel(10);
        let (event_tx, _) = broadcast::channel(10);
        let handle = RegistryHandle::new(cmd_tx, event_tx);
        drop(cmd_rx);

        assert!(handle.get_client(ClientId::new(1)).await.is_none());
        assert!(handle.get_all_clients().await.is_empty());
        assert!(handle.get_answerer().await.is_none());
    }

    #[tokio::test]
    async fn test_subscribe() {
        let (cmd_tx, _cmd_rx) = mpsc::channel(10);
        let (event_tx, _) = broadcast::channel(10);
        let handle = RegistryHandle::new(cmd_tx, event_tx.clone());

        let mut rx = handle.subscribe();
        event_tx
            .send(RegistryEvent::RoundReset { unlocked: 0 })
            .unwrap();
        assert_eq!(rx.recv().await.unwrap(), RegistryEvent::RoundReset { unlocked: 0 });
    }
}
