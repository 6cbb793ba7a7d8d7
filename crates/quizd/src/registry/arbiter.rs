//! Buzzer arbitration.
//!
//! The `Arbiter` owns the client registry and the single current-answerer
//! slot. It interprets inbound messages per client, applies the operator
//! lockout and reset transitions, and reports which commands must go to
//! which clients. It performs no I/O; the actor delivers the commands.
//!
//! Exclusivity is first-observed-wins: whichever buzz the actor dispatches
//! first while the slot is empty takes the round. Buzzes that the
//! transport delivers later are no-ops, regardless of when they were
//! physically pressed.

use std::net::SocketAddr;

use quiz_core::{ClientId, ClientRecord, ClientStatus, DomainError, DomainResult};
use quiz_protocol::{InboundMessage, OutboundCommand};
use tracing::{debug, info, warn};

use super::clients::ClientRegistry;
use super::commands::RegistryError;

/// A command addressed to one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub to: ClientId,
    pub command: OutboundCommand,
}

impl Delivery {
    pub fn new(to: ClientId, command: OutboundCommand) -> Self {
        Self { to, command }
    }
}

/// What an inbound message did to the arbitration state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Sender is not registered (already torn down).
    UnknownClient,

    /// Keep-alive; liveness refreshed only.
    KeepAlive,

    /// Display name recorded.
    Named { name: String },

    /// Diagnostic probe echoed back to the sender.
    Probe { echoed: OutboundCommand },

    /// Sender took the buzzer; `locked` other clients were locked out.
    BuzzWon { locked: usize },

    /// The round already has an answerer.
    LateBuzz { answerer: ClientId },

    /// Sender is locked out and may not buzz.
    BuzzRefused { status: ClientStatus },
}

/// Result of applying an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub transition: Transition,
    pub deliveries: Vec<Delivery>,
}

impl Outcome {
    fn quiet(transition: Transition) -> Self {
        Self {
            transition,
            deliveries: Vec::new(),
        }
    }
}

/// A client removed from the registry.
#[derive(Debug, Clone)]
pub struct Departure {
    pub record: ClientRecord,
    pub was_answerer: bool,
    /// Unlocks owed to clients that were locked by the departed answerer
    pub deliveries: Vec<Delivery>,
}

/// Owner of the client registry and the current-answerer slot.
#[derive(Debug, Default)]
pub struct Arbiter {
    clients: ClientRegistry,
    current_answerer: Option<ClientId>,
}

impl Arbiter {
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: ClientRegistry::new(max_clients),
            current_answerer: None,
        }
    }

    /// Read-only view of the registry.
    pub fn clients(&self) -> &ClientRegistry {
        &self.clients
    }

    /// The client holding the buzzer this round.
    pub fn current_answerer(&self) -> Option<ClientId> {
        self.current_answerer
    }

    /// Registers a new connection with status `Connected`.
    pub fn connect(
        &mut self,
        client_id: ClientId,
        peer: Option<SocketAddr>,
    ) -> Result<(), RegistryError> {
        self.clients.register(client_id, peer)?;
        Ok(())
    }

    /// Removes a client. Frees the buzzer if it held it.
    ///
    /// Clients locked by the departing answerer are returned to `Named`
    /// and owed an unlock, since their lock only exists while the slot
    /// is held.
    pub fn disconnect(&mut self, client_id: ClientId) -> Option<Departure> {
        let record = self.clients.unregister(client_id)?;

        let was_answerer = self.current_answerer == Some(client_id);
        let deliveries = if was_answerer {
            self.current_answerer = None;
            info!(
                client_id = %client_id,
                name = record.display_name(),
                "Answerer disconnected, buzzer released"
            );
            self.release_locked_by_answerer()
        } else {
            Vec::new()
        };

        Some(Departure {
            record,
            was_answerer,
            deliveries,
        })
    }

    /// Applies one inbound message from `client_id`.
    pub fn apply(&mut self, client_id: ClientId, message: InboundMessage) -> Outcome {
        let Some(record) = self.clients.get_mut(client_id) else {
            debug!(client_id = %client_id, "Message from unregistered client dropped");
            return Outcome::quiet(Transition::UnknownClient);
        };
        record.touch();

        match message {
            InboundMessage::KeepAlive => {
                debug!(client_id = %client_id, "Keep-alive");
                Outcome::quiet(Transition::KeepAlive)
            }
            InboundMessage::Name(name) => {
                record.set_name(name.clone());
                info!(
                    client_id = %client_id,
                    name = %name,
                    status = %record.status,
                    "Name registered"
                );
                Outcome::quiet(Transition::Named { name })
            }
            // Probes only echo; the sender's status is left alone.
            InboundMessage::LockProbe => {
                debug!(client_id = %client_id, "Lock probe");
                Self::echo(client_id, OutboundCommand::Lock)
            }
            InboundMessage::UnlockProbe => {
                debug!(client_id = %client_id, "Unlock probe");
                Self::echo(client_id, OutboundCommand::Unlock)
            }
            InboundMessage::Buzz => self.buzz(client_id),
        }
    }

    fn echo(client_id: ClientId, command: OutboundCommand) -> Outcome {
        Outcome {
            transition: Transition::Probe { echoed: command },
            deliveries: vec![Delivery::new(client_id, command)],
        }
    }

    fn buzz(&mut self, client_id: ClientId) -> Outcome {
        let Some(record) = self.clients.get_mut(client_id) else {
            return Outcome::quiet(Transition::UnknownClient);
        };

        if let Some(answerer) = self.current_answerer {
            info!(
                client_id = %client_id,
                name = record.display_name(),
                answerer = %answerer,
                "Just too late"
            );
            return Outcome::quiet(Transition::LateBuzz { answerer });
        }

        if !record.status.accepts_buzz() {
            info!(
                client_id = %client_id,
                name = record.display_name(),
                status = %record.status,
                "Buzz refused, client is locked out"
            );
            return Outcome::quiet(Transition::BuzzRefused {
                status: record.status,
            });
        }

        record.status = ClientStatus::Answered;
        self.current_answerer = Some(client_id);
        info!(
            client_id = %client_id,
            name = record.display_name(),
            peer = ?record.peer,
            "Answered"
        );

        let mut deliveries = vec![Delivery::new(client_id, OutboundCommand::Accepted)];
        for other in self.clients.iter_mut() {
            if other.id != client_id && other.status == ClientStatus::Named {
                other.status = ClientStatus::LockedByAnswerer;
                deliveries.push(Delivery::new(other.id, OutboundCommand::Lock));
            }
        }

        let locked = deliveries.len() - 1;
        Outcome {
            transition: Transition::BuzzWon { locked },
            deliveries,
        }
    }

    /// Operator lockout after an incorrect answer.
    ///
    /// Locks the current answerer (`LockedBySelf`), unlocks everyone it
    /// had locked out and clears the slot.
    pub fn lockout_current_answerer(&mut self) -> Vec<Delivery> {
        let mut deliveries = Vec::new();

        match self.current_answerer.take() {
            Some(answerer) => {
                if let Some(record) = self.clients.get_mut(answerer) {
                    record.status = ClientStatus::LockedBySelf;
                    deliveries.push(Delivery::new(answerer, OutboundCommand::Lock));
                    info!(
                        client_id = %answerer,
                        name = record.display_name(),
                        "Answerer locked out"
                    );
                }
            }
            None => info!("Lockout requested with no current answerer"),
        }

        deliveries.extend(self.release_locked_by_answerer());
        deliveries
    }

    /// Operator reset for the next round.
    ///
    /// Every client in a round status is unlocked and returned to `Named`.
    /// With nobody in a round this produces no deliveries.
    pub fn reset_round(&mut self) -> Vec<Delivery> {
        self.current_answerer = None;

        let mut deliveries = Vec::new();
        for record in self.clients.iter_mut() {
            if record.status.is_in_round() {
                record.status = ClientStatus::Named;
                deliveries.push(Delivery::new(record.id, OutboundCommand::Unlock));
            }
        }

        info!(unlocked = deliveries.len(), "Round reset");
        deliveries
    }

    fn release_locked_by_answerer(&mut self) -> Vec<Delivery> {
        let mut deliveries = Vec::new();
        for record in self.clients.iter_mut() {
            if record.status == ClientStatus::LockedByAnswerer {
                record.status = ClientStatus::Named;
                deliveries.push(Delivery::new(record.id, OutboundCommand::Unlock));
            }
        }
        deliveries
    }

    /// Checks the arbitration invariants.
    ///
    /// - At most one client is `Answered`, and it is the current answerer.
    /// - The current answerer, if any, is registered and `Answered`.
    /// - `LockedByAnswerer` only exists while the slot is held.
    pub fn verify_invariants(&self) -> DomainResult<()> {
        let mut answered = self
            .clients
            .iter()
            .filter(|r| r.status == ClientStatus::Answered);

        match (self.current_answerer, answered.next()) {
            (None, Some(record)) => {
                return Err(DomainError::invariant(format!(
                    "{} is answered but the buzzer slot is empty",
                    record.id
                )));
            }
            (Some(holder), Some(record)) if holder != record.id => {
                return Err(DomainError::invariant(format!(
                    "{} is answered but {holder} holds the buzzer",
                    record.id
                )));
            }
            (Some(holder), None) => {
                return Err(DomainError::invariant(format!(
                    "{holder} holds the buzzer but is not answered"
                )));
            }
            _ => {}
        }

        if let Some(extra) = answered.next() {
            return Err(DomainError::invariant(format!(
                "more than one answered client ({} among them)",
                extra.id
            )));
        }

        if self.current_answerer.is_none() {
            let stale = self
                .clients
                .count_with_status(ClientStatus::LockedByAnswerer);
            if stale > 0 {
                warn!(stale, "Clients locked by an answerer that no longer exists");
                return Err(DomainError::invariant(format!(
                    "{stale} clients locked by answerer with empty buzzer slot"
                )));
            }
        }

        Ok(())
    }

    /// Overwrites a client's status without any transition checks.
    #[cfg(test)]
    pub(crate) fn force_status(&mut self, client_id: ClientId, status: ClientStatus) {
        if let Some(record) = self.clients.get_mut(client_id) {
            record.status = status;
        }
    }
}
