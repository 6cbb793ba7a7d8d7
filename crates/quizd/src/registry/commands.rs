//! Registry actor commands, errors, and events.
//!
//! This module defines the message types for communicating with the `RegistryActor`:
//! - `RegistryCommand`: Commands sent to the actor
//! - `RegistryError`: Errors that can occur during registry operations
//! - `RegistryEvent`: Events published by the registry for observers
//!
//! All types are designed for async message passing and follow the panic-free policy.

use std::fmt;
use std::net::SocketAddr;

use quiz_core::{ClientId, ClientView, DomainError};
use quiz_protocol::{InboundMessage, OutboundCommand};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Sending half of a client's outbound command queue.
///
/// The actor only ever `try_send`s on it; the connection task drains it.
pub type OutboundSender = mpsc::Sender<OutboundCommand>;

// ============================================================================
// Registry Commands
// ============================================================================

/// Commands sent to the registry actor.
///
/// Queries and registration use a oneshot channel for the response.
/// Inbound messages and disconnects are fire-and-forget so a connection
/// task never waits on arbitration; per-connection ordering is preserved
/// by the mpsc channel.
#[derive(Debug)]
pub enum RegistryCommand {
    /// Register a newly accepted connection.
    ///
    /// # Errors
    /// - `RegistryError::ClientAlreadyExists` if the id is already live
    /// - `RegistryError::RegistryFull` if at maximum capacity
    Connect {
        /// Identifier assigned at accept time
        client_id: ClientId,
        /// Remote address, if the transport has one
        peer: Option<SocketAddr>,
        /// Outbound queue for commands to this client
        outbound: OutboundSender,
        /// Channel to send the result
        respond_to: oneshot::Sender<Result<(), RegistryError>>,
    },

    /// A decoded message from a client.
    Inbound {
        /// Sender of the message
        client_id: ClientId,
        /// The decoded message
        message: InboundMessage,
    },

    /// The connection closed or failed.
    Disconnect {
        /// The departing client
        client_id: ClientId,
        /// Why the connection ended
        reason: DisconnectReason,
    },

    /// Get a single client by id.
    GetClient {
        /// Client to look up
        client_id: ClientId,
        /// Channel to send the result
        respond_to: oneshot::Sender<Option<ClientView>>,
    },

    /// Get all clients in connection order.
    GetAllClients {
        /// Channel to send the results
        respond_to: oneshot::Sender<Vec<ClientView>>,
    },

    /// Get the client currently holding the buzzer, if any.
    GetAnswerer {
        /// Channel to send the result
        respond_to: oneshot::Sender<Option<ClientView>>,
    },
}

// ============================================================================
// Registry Errors
// ============================================================================

/// Errors that can occur during registry operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A client with this id is already registered.
    #[error("client already exists: {0}")]
    ClientAlreadyExists(ClientId),

    /// The registry has reached its maximum capacity.
    #[error("registry full (max {max} clients)")]
    RegistryFull {
        /// Maximum number of clients allowed
        max: usize,
    },

    /// The actor's channel closed (actor stopped).
    #[error("registry channel closed")]
    ChannelClosed,

    /// Arbitration state failed verification. Fatal.
    #[error("internal error: {0}")]
    Internal(#[from] DomainError),
}

// ============================================================================
// Disconnect Reasons
// ============================================================================

/// Why a client left the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Peer closed the connection.
    Closed,

    /// Read or write on the connection failed.
    TransportError,

    /// The client's outbound queue stayed full.
    SlowConsumer,

    /// No message (including keep-alives) within the idle timeout.
    Idle,

    /// Daemon shutting down.
    Shutdown,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "connection closed by peer"),
            Self::TransportError => write!(f, "transport error"),
            Self::SlowConsumer => write!(f, "outbound queue full"),
            Self::Idle => write!(f, "idle timeout"),
            Self::Shutdown => write!(f, "daemon shutdown"),
        }
    }
}

// ============================================================================
// Registry Events
// ============================================================================

/// Events published by the registry for observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    /// A connection was registered.
    Connected { client_id: ClientId },

    /// A client registered (or changed) its display name.
    Named { client_id: ClientId, name: String },

    /// A client won the buzz for this round.
    BuzzWon {
        client_id: ClientId,
        /// Number of clients locked out as a result
        locked: usize,
    },

    /// A buzz arrived after the round was already taken.
    LateBuzz {
        client_id: ClientId,
        answerer: ClientId,
    },

    /// A buzz from a locked-out client was refused.
    BuzzRefused { client_id: ClientId },

    /// Operator lockout was serviced.
    LockedOut {
        /// The answerer that was locked, if there was one
        answerer: Option<ClientId>,
    },

    /// Operator reset was serviced.
    RoundReset {
        /// Number of clients that were sent unlock
        unlocked: usize,
    },

    /// A client left the registry.
    Disconnected {
        client_id: ClientId,
        reason: DisconnectReason,
        /// True if the client held the buzzer when it left
        was_answerer: bool,
    },
}
