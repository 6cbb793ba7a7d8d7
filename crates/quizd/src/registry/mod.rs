//! Client registry and buzzer arbitration using the Actor pattern.
//!
//! The registry is the single owner of every client record and of the
//! current-answerer slot. Connection tasks talk to it over a tokio mpsc
//! channel; it processes one command at a time, so buzz races are decided
//! purely by the order commands reach the channel.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │ConnectionHandler│────▶│  RegistryActor  │────▶│ outbound queues │
//! │  (per client)   │     │   (Arbiter)     │     │  (per client)   │
//! └─────────────────┘     └────────┬────────┘     └─────────────────┘
//!         │                        │  ▲
//!         │   RegistryCommand      │  │ drained at housekeeping
//!         │   (mpsc channel)       │  │
//!         ▼                        ▼  │
//!    connect/inbound/        RegistryEvent    ControlFlags
//!    disconnect              (broadcast)      (signals)
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All operations in this module follow the panic-free policy:
//! - No `.unwrap()` or `.expect()` in production code
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

mod actor;
mod arbiter;
mod clients;
mod commands;
mod handle;

pub use actor::RegistryActor;
pub use arbiter::{Arbiter, Delivery, Departure, Outcome, Transition};
pub use clients::{ClientRegistry, MAX_CLIENTS};
pub use commands::{
    DisconnectReason, OutboundSender, RegistryCommand, RegistryError, RegistryEvent,
};
pub use handle::RegistryHandle;

use crate::config::DaemonConfig;
use crate::control::ControlFlags;

/// Channel buffer sizes
const COMMAND_BUFFER: usize = 256;
const EVENT_BUFFER: usize = 100;

/// Outbound commands queued per client before it counts as stalled.
pub const OUTBOUND_BUFFER: usize = 32;

/// Spawn the registry actor and return a handle for interaction.
///
/// This function:
/// 1. Creates command and event channels
/// 2. Spawns the RegistryActor on a tokio task
/// 3. Returns a RegistryHandle and the actor's join handle
///
/// The join handle resolves to `Err(RegistryError::Internal)` if the actor
/// stopped on corrupted state; the caller should treat that as fatal.
///
/// # Example
///
/// ```no_run
/// use quizd::config::DaemonConfig;
/// use quizd::control::ControlFlags;
/// use quizd::registry::spawn_registry;
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() {
///     let (handle, _task) = spawn_registry(
///         &DaemonConfig::default(),
///         ControlFlags::new_shared(),
///         CancellationToken::new(),
///     );
///
///     let clients = handle.get_all_clients().await;
/// }
/// ```
pub fn spawn_registry(
    config: &DaemonConfig,
    control: Arc<ControlFlags>,
    cancel_token: CancellationToken,
) -> (RegistryHandle, JoinHandle<Result<(), RegistryError>>) {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

    let actor = RegistryActor::new(cmd_rx, event_tx.clone(), control, config, cancel_token);
    let task = tokio::spawn(actor.run());

    (RegistryHandle::new(cmd_tx, event_tx), task)
}
