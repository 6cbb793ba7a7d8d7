//! Connection handler for individual buzzer clients.
//!
//! Each client connection gets its own `ConnectionHandler` that:
//! - Registers the connection with the registry
//! - Decodes incoming reads and forwards messages to the registry
//! - Drains the client's outbound queue onto the socket
//! - Reports the disconnect, whatever ended the connection
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Connection errors are logged and result in graceful disconnect

use std::net::SocketAddr;
use std::time::Duration;

use quiz_core::ClientId;
use quiz_protocol::{decode, OutboundCommand, MAX_MESSAGE_SIZE};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::registry::{DisconnectReason, RegistryError, RegistryHandle, OUTBOUND_BUFFER};

/// Write timeout (10 seconds)
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of one wait in the connection loop.
enum Step {
    Shutdown,
    Read(std::io::Result<usize>),
    Outbound(Option<OutboundCommand>),
}

/// Connection handler for a single client.
pub struct ConnectionHandler {
    /// Read half of the socket
    reader: OwnedReadHalf,

    /// Write half of the socket
    writer: OwnedWriteHalf,

    /// Handle to the client registry
    registry: RegistryHandle,

    /// Identifier assigned at accept time
    client_id: ClientId,

    /// Remote address
    peer: Option<SocketAddr>,

    /// Server shutdown signal
    cancel_token: CancellationToken,
}

impl ConnectionHandler {
    /// Creates a new connection handler.
    ///
    /// # Arguments
    ///
    /// * `reader` - Read half of the TCP stream
    /// * `writer` - Write half of the TCP stream
    /// * `registry` - Handle to the client registry
    /// * `client_id` - Identifier assigned at accept time
    /// * `peer` - Remote address
    /// * `cancel_token` - Server shutdown signal
    pub fn new(
        reader: OwnedReadHalf,
        writer: OwnedWriteHalf,
        registry: RegistryHandle,
        client_id: ClientId,
        peer: Option<SocketAddr>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            reader,
            writer,
            registry,
            client_id,
            peer,
            cancel_token,
        }
    }

    /// Runs the connection handler.
    ///
    /// Registers with the registry, then serves the connection until it
    /// closes. Returns why the connection ended.
    pub async fn run(mut self) -> Result<DisconnectReason, ConnectionError> {
        debug!(client_id = %self.client_id, peer = ?self.peer, "New client connected");

        let (outbound_tx, mut outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);

        if let Err(e) = self
            .registry
            .connect(self.client_id, self.peer, outbound_tx)
            .await
        {
            warn!(client_id = %self.client_id, error = %e, "Connection rejected");
            return Err(ConnectionError::Rejected(e));
        }

        let reason = self.process(&mut outbound_rx).await;

        // The registry may already have dropped us; that's fine
        let _ = self.registry.disconnect(self.client_id, reason).await;
        info!(client_id = %self.client_id, reason = %reason, "Client connection closed");

        Ok(reason)
    }

    /// Main loop: socket reads, outbound commands and shutdown.
    async fn process(
        &mut self,
        outbound_rx: &mut mpsc::Receiver<OutboundCommand>,
    ) -> DisconnectReason {
        let mut buf = [0u8; MAX_MESSAGE_SIZE];

        loop {
            let step = tokio::select! {
                _ = self.cancel_token.cancelled() => Step::Shutdown,
                read = self.reader.read(&mut buf) => Step::Read(read),
                command = outbound_rx.recv() => Step::Outbound(command),
            };

            match step {
                Step::Shutdown => return DisconnectReason::Shutdown,

                Step::Read(Ok(0)) => {
                    debug!(client_id = %self.client_id, "Client sent EOF");
                    return DisconnectReason::Closed;
                }
                Step::Read(Ok(n)) => {
                    if let Err(e) = self.forward(buf.get(..n).unwrap_or_default()).await {
                        debug!(client_id = %self.client_id, error = %e, "Registry unavailable");
                        return DisconnectReason::Shutdown;
                    }
                }
                Step::Read(Err(e)) => {
                    info!(client_id = %self.client_id, error = %e, "Read failed");
                    return DisconnectReason::TransportError;
                }

                Step::Outbound(Some(command)) => {
                    if let Err(e) = self.send_command(command).await {
                        info!(client_id = %self.client_id, error = %e, "Write failed");
                        return DisconnectReason::TransportError;
                    }
                }
                Step::Outbound(None) => {
                    // Registry dropped our queue (idle, slow or failed)
                    debug!(client_id = %self.client_id, "Outbound queue closed by registry");
                    return DisconnectReason::TransportError;
                }
            }
        }
    }

    /// Decodes one read and forwards each message in order.
    ///
    /// Undecodable input is logged and dropped.
    async fn forward(&self, bytes: &[u8]) -> Result<(), RegistryError> {
        for decoded in decode(bytes) {
            match decoded {
                Ok(message) => {
                    debug!(
                        client_id = %self.client_id,
                        message_type = message.kind(),
                        "Received message"
                    );
                    self.registry.deliver(self.client_id, message).await?;
                }
                Err(e) => {
                    info!(client_id = %self.client_id, error = %e, "Ignoring client input");
                }
            }
        }
        Ok(())
    }

    /// Writes one command byte to the client.
    async fn send_command(&mut self, command: OutboundCommand) -> Result<(), ConnectionError> {
        let byte = [command.as_byte()];

        match timeout(WRITE_TIMEOUT, async {
            self.writer.write_all(&byte).await?;
            self.writer.flush().await?;
            Ok::<(), std::io::Error>(())
        })
        .await
        {
            Ok(Ok(())) => {
                debug!(client_id = %self.client_id, command = %command, "Sent command");
                Ok(())
            }
            Ok(Err(e)) => Err(ConnectionError::Io(e.to_string())),
            Err(_) => Err(ConnectionError::WriteTimeout),
        }
    }
}

/// Errors that can occur during connection handling.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Connection rejected by registry: {0}")]
    Rejected(#[from] RegistryError),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Write timeout")]
    WriteTimeout,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_error_display() {
        let err = ConnectionError::Rejected(RegistryError::RegistryFull { max: 2 });
        assert!(err.to_string().contains("max 2"));

        let err = ConnectionError::Io("broken pipe".to_string());
        assert_eq!(err.to_string(), "I/O error: broken pipe");
    }

    #[test]
    fn test_write_timeout_display() {
        assert_eq!(ConnectionError::WriteTimeout.to_string(), "Write timeout");
    }
}
