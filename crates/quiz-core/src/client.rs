//! Client domain entities and value objects.

use chrono::{DateTime, Utc};
use std::fmt;
use std::net::SocketAddr;

// ============================================================================
// Type-Safe Identifiers
// ============================================================================

/// Stable identifier for a connected buzzer client.
///
/// Assigned by the server in accept order, so ordering by `ClientId`
/// is ordering by connection time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientId(u64);

impl ClientId {
    /// Creates a new ClientId from a connection number.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

// ============================================================================
// Client Status
// ============================================================================

/// Where a client stands in the current round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ClientStatus {
    /// Connection accepted, no name registered yet.
    #[default]
    Connected,

    /// Name registered, in the game and free to buzz.
    Named,

    /// Holds the buzzer for this round.
    Answered,

    /// Locked out because another client buzzed first.
    LockedByAnswerer,

    /// Locked out after answering incorrectly. Stays locked until reset.
    LockedBySelf,
}

impl ClientStatus {
    /// Returns the display label for this status.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Named => "named",
            Self::Answered => "answered",
            Self::LockedByAnswerer => "locked (answerer)",
            Self::LockedBySelf => "locked (incorrect)",
        }
    }

    /// Returns true for the statuses a round reset moves back to `Named`.
    #[must_use]
    pub fn is_in_round(&self) -> bool {
        matches!(
            self,
            Self::Answered | Self::LockedByAnswerer | Self::LockedBySelf
        )
    }

    /// Returns true if a buzz from a client in this status may win the round.
    #[must_use]
    pub fn accepts_buzz(&self) -> bool {
        !matches!(self, Self::LockedByAnswerer | Self::LockedBySelf)
    }
}

impl fmt::Display for ClientStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// Client Record
// ============================================================================

/// Registry entry for one live connection.
///
/// Created when the connection is accepted and dropped with it.
/// Status is only ever mutated by the arbitration code in the daemon.
#[derive(Debug, Clone)]
pub struct ClientRecord {
    /// Connection identifier
    pub id: ClientId,

    /// Round status
    pub status: ClientStatus,

    /// Display name, once registered
    pub name: Option<String>,

    /// Remote address, when the transport has one
    pub peer: Option<SocketAddr>,

    /// When the connection was accepted
    pub connected_at: DateTime<Utc>,

    /// Last time any message arrived from this client
    pub last_seen: DateTime<Utc>,
}

impl ClientRecord {
    /// Creates a freshly connected record.
    pub fn new(id: ClientId, peer: Option<SocketAddr>) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: ClientStatus::Connected,
            name: None,
            peer,
            connected_at: now,
            last_seen: now,
        }
    }

    /// Refreshes liveness.
    pub fn touch(&mut self) {
        self.last_seen = Utc::now();
    }

    /// Applies a name registration.
    ///
    /// The name is always replaced. Status moves to `Named` only from
    /// `Connected`; a client already in a round keeps its lock state.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
        if self.status == ClientStatus::Connected {
            self.status = ClientStatus::Named;
        }
    }

    /// Returns the name for logging, or a placeholder.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<unnamed>")
    }

    /// Seconds since the last message from this client.
    #[must_use]
    pub fn idle_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.last_seen).num_seconds()
    }
}

/// Read-only snapshot of a client, handed out by registry lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientView {
    pub id: ClientId,
    pub status: ClientStatus,
    pub name: Option<String>,
    pub peer: Option<SocketAddr>,
    pub connected_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl ClientView {
    /// Creates a view from a record.
    pub fn from_record(record: &ClientRecord) -> Self {
        Self {
            id: record.id,
            status: record.status,
            name: record.name.clone(),
            peer: record.peer,
            connected_at: record.connected_at,
            last_seen: record.last_seen,
        }
    }
}

impl From<&ClientRecord> for ClientView {
    fn from(record: &ClientRecord) -> Self {
        Self::from_record(record)
    }
}
