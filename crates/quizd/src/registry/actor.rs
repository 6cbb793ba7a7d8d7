//! Registry actor - owns all client state and runs the event loop.
//!
//! The RegistryActor is the single owner of arbitration state in the system.
//! It receives commands via an mpsc channel, waits with a bounded deadline,
//! and runs housekeeping whenever the deadline passes.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Channel send failures are logged but don't panic

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use quiz_core::{ClientId, ClientView};
use quiz_protocol::InboundMessage;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::arbiter::{Arbiter, Delivery, Transition};
use super::commands::{
    DisconnectReason, OutboundSender, RegistryCommand, RegistryError, RegistryEvent,
};
use crate::config::DaemonConfig;
use crate::control::ControlFlags;

// ============================================================================
// Registry Actor
// ============================================================================

/// The registry actor - owns all client state.
///
/// Implements the actor pattern: receives commands via mpsc channel,
/// processes them sequentially, and publishes events to observers.
///
/// # Ownership
///
/// The actor owns:
/// - `arbiter`: client records and the current-answerer slot
/// - `links`: each client's outbound queue, keyed like the records
///
/// A client is in `links` exactly when it is in the arbiter's registry.
///
/// # Thread Safety
///
/// The actor runs in a single task and processes commands sequentially.
/// All state mutations happen within this single task, which is what
/// makes first-observed-wins arbitration race free without locks.
pub struct RegistryActor {
    /// Command receiver
    receiver: mpsc::Receiver<RegistryCommand>,

    /// Arbitration state
    arbiter: Arbiter,

    /// Outbound queue per client
    links: HashMap<ClientId, OutboundSender>,

    /// Operator requests, drained at housekeeping
    control: Arc<ControlFlags>,

    /// Event publisher for observers
    event_publisher: broadcast::Sender<RegistryEvent>,

    /// Bounded wait between housekeeping passes
    poll_interval: Duration,

    /// Silent clients are dropped after this long
    idle_timeout: Option<Duration>,

    /// Shutdown signal; cancelled by the actor itself on internal error
    cancel_token: CancellationToken,
}

impl RegistryActor {
    /// Creates a new registry actor.
    ///
    /// # Arguments
    ///
    /// * `receiver` - Channel for receiving commands
    /// * `event_publisher` - Broadcast channel for publishing events
    /// * `control` - Pending operator requests
    /// * `config` - Poll interval, idle timeout and capacity
    /// * `cancel_token` - Shutdown signal
    pub fn new(
        receiver: mpsc::Receiver<RegistryCommand>,
        event_publisher: broadcast::Sender<RegistryEvent>,
        control: Arc<ControlFlags>,
        config: &DaemonConfig,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            receiver,
            arbiter: Arbiter::new(config.max_clients),
            links: HashMap::new(),
            control,
            event_publisher,
            poll_interval: config.poll_interval(),
            idle_timeout: config.idle_timeout(),
            cancel_token,
        }
    }

    /// Runs the actor event loop.
    ///
    /// Each iteration waits for the next command, bounded by the housekeeping
    /// deadline. When the deadline passes, pending operator requests are
    /// serviced and the deadline is re-armed. Returns when cancelled, when
    /// all senders are dropped, or with `RegistryError::Internal` if the
    /// arbitration invariants fail, after cancelling the shutdown token.
    pub async fn run(mut self) -> Result<(), RegistryError> {
        info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Registry actor starting"
        );

        let mut next_tick = Instant::now() + self.poll_interval;

        let result = loop {
            let received = tokio::select! {
                biased;
                _ = self.cancel_token.cancelled() => break Ok(()),
                received = timeout_at(next_tick, self.receiver.recv()) => received,
            };

            match received {
                Ok(Some(cmd)) => self.handle_command(cmd),
                Ok(None) => break Ok(()),
                Err(_) => {}
            }

            // A channel that is never empty still gets housekeeping on time
            if Instant::now() >= next_tick {
                self.housekeeping();
                next_tick = Instant::now() + self.poll_interval;
            }

            if let Err(e) = self.arbiter.verify_invariants() {
                error!(error = %e, "Arbitration state corrupted, shutting down");
                self.cancel_token.cancel();
                break Err(RegistryError::Internal(e));
            }
        };

        info!(
            clients = self.arbiter.clients().len(),
            "Registry actor stopped"
        );
        result
    }

    /// Dispatches a command to the appropriate handler.
    pub(crate) fn handle_command(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::Connect {
                client_id,
                peer,
                outbound,
                respond_to,
            } => {
                let result = self.handle_connect(client_id, peer, outbound);
                // Ignore send error - connection task may be gone
                let _ = respond_to.send(result);
            }
            RegistryCommand::Inbound { client_id, message } => {
                self.handle_inbound(client_id, message);
            }
            RegistryCommand::Disconnect { client_id, reason } => {
                let deliveries = self.drop_client(client_id, reason);
                self.dispatch(deliveries);
            }
            RegistryCommand::GetClient {
                client_id,
                respond_to,
            } => {
                let view = self.arbiter.clients().get(client_id).map(ClientView::from);
                let _ = respond_to.send(view);
            }
            RegistryCommand::GetAllClients { respond_to } => {
                let views = self.arbiter.clients().iter().map(ClientView::from).collect();
                let _ = respond_to.send(views);
            }
            RegistryCommand::GetAnswerer { respond_to } => {
                let view = self
                    .arbiter
                    .current_answerer()
                    .and_then(|id| self.arbiter.clients().get(id))
                    .map(ClientView::from);
                let _ = respond_to.send(view);
            }
        }
    }

    // ========================================================================
    // Command Handlers
    // ========================================================================

    fn handle_connect(
        &mut self,
        client_id: ClientId,
        peer: Option<SocketAddr>,
        outbound: OutboundSender,
    ) -> Result<(), RegistryError> {
        self.arbiter.connect(client_id, peer)?;
        self.links.insert(client_id, outbound);

        info!(
            client_id = %client_id,
            peer = ?peer,
            total_clients = self.arbiter.clients().len(),
            "Client connected"
        );
        self.publish(RegistryEvent::Connected { client_id });
        Ok(())
    }

    fn handle_inbound(&mut self, client_id: ClientId, message: InboundMessage) {
        let outcome = self.arbiter.apply(client_id, message);

        match &outcome.transition {
            Transition::Named { name } => self.publish(RegistryEvent::Named {
                client_id,
                name: name.clone(),
            }),
            Transition::BuzzWon { locked } => self.publish(RegistryEvent::BuzzWon {
                client_id,
                locked: *locked,
            }),
            Transition::LateBuzz { answerer } => self.publish(RegistryEvent::LateBuzz {
                client_id,
                answerer: *answerer,
            }),
            Transition::BuzzRefused { .. } => {
                self.publish(RegistryEvent::BuzzRefused { client_id })
            }
            Transition::UnknownClient | Transition::KeepAlive | Transition::Probe { .. } => {}
        }

        self.dispatch(outcome.deliveries);
    }

    /// Removes a client and its outbound queue.
    ///
    /// Dropping the queue makes the connection task close the socket.
    /// Returns the unlocks owed if the client held the buzzer.
    fn drop_client(&mut self, client_id: ClientId, reason: DisconnectReason) -> Vec<Delivery> {
        self.links.remove(&client_id);

        let Some(departure) = self.arbiter.disconnect(client_id) else {
            debug!(client_id = %client_id, reason = %reason, "Disconnect for unknown client ignored");
            return Vec::new();
        };

        info!(
            client_id = %client_id,
            name = departure.record.display_name(),
            reason = %reason,
            was_answerer = departure.was_answerer,
            total_clients = self.arbiter.clients().len(),
            "Client disconnected"
        );
        self.publish(RegistryEvent::Disconnected {
            client_id,
            reason,
            was_answerer: departure.was_answerer,
        });

        departure.deliveries
    }

    /// Queues commands on each addressee's outbound queue.
    ///
    /// Never waits: a full or closed queue is a transport failure and the
    /// client is dropped, which may in turn owe unlocks to others.
    fn dispatch(&mut self, deliveries: Vec<Delivery>) {
        let mut queue = VecDeque::from(deliveries);

        while let Some(delivery) = queue.pop_front() {
            let Some(link) = self.links.get(&delivery.to) else {
                continue;
            };

            match link.try_send(delivery.command) {
                Ok(()) => {
                    debug!(client_id = %delivery.to, command = %delivery.command, "Command queued");
                }
                Err(TrySendError::Full(_)) => {
                    warn!(client_id = %delivery.to, command = %delivery.command, "Outbound queue full, dropping client");
                    queue.extend(self.drop_client(delivery.to, DisconnectReason::SlowConsumer));
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(client_id = %delivery.to, "Outbound queue closed");
                    queue.extend(self.drop_client(delivery.to, DisconnectReason::TransportError));
                }
            }
        }
    }

    // ========================================================================
    // Housekeeping
    // ========================================================================

    /// Services pending operator requests, then sweeps idle clients.
    ///
    /// Lockout is serviced before reset when both are pending.
    fn housekeeping(&mut self) {
        if self.control.take_lockout() {
            let answerer = self.arbiter.current_answerer();
            info!(answerer = ?answerer, "Lockout current answerer called");
            let deliveries = self.arbiter.lockout_current_answerer();
            self.publish(RegistryEvent::LockedOut { answerer });
            self.dispatch(deliveries);
        }

        if self.control.take_reset() {
            info!("Reset game called");
            let deliveries = self.arbiter.reset_round();
            self.publish(RegistryEvent::RoundReset {
                unlocked: deliveries.len(),
            });
            self.dispatch(deliveries);
        }

        self.sweep_idle();
    }

    fn sweep_idle(&mut self) {
        let Some(idle_timeout) = self.idle_timeout else {
            return;
        };
        let limit = idle_timeout.as_secs() as i64;
        let now = Utc::now();

        let idle: Vec<ClientId> = self
            .arbiter
            .clients()
            .iter()
            .filter(|record| record.idle_secs(now) >= limit)
            .map(|record| record.id)
            .collect();

        for client_id in idle {
            let deliveries = self.drop_client(client_id, DisconnectReason::Idle);
            self.dispatch(deliveries);
        }
    }

    fn publish(&self, event: RegistryEvent) {
        // No subscribers is normal
        let _ = self.event_publisher.send(event);
    }

    // ========================================================================
    // Test Helpers
    // ========================================================================

    #[cfg(test)]
    pub fn client_count(&self) -> usize {
        self.arbiter.clients().len()
    }

    #[cfg(test)]
    pub fn arbiter(&self) -> &Arbiter {
        &self.arbiter
    }
}
