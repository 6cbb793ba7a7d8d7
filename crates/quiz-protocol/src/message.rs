//! Protocol message types for buzzer communication.

use std::fmt;

/// Prefix of the name registration message.
pub const NAME_PREFIX: &str = "Name:";

/// Messages a buzzer client can send to the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    /// `ka` - liveness only
    KeepAlive,

    /// `0` - diagnostic probe, answered with a lock command
    LockProbe,

    /// `1` - diagnostic probe, answered with an unlock command
    UnlockProbe,

    /// `9` - answer button pressed
    Buzz,

    /// `Name:<text>` - display name of the quizzer on this client
    Name(String),
}

impl InboundMessage {
    /// Short name of the message kind, for structured logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::KeepAlive => "keep_alive",
            Self::LockProbe => "lock_probe",
            Self::UnlockProbe => "unlock_probe",
            Self::Buzz => "buzz",
            Self::Name(_) => "name",
        }
    }
}

/// Single-byte commands the daemon sends to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutboundCommand {
    /// `8` - disable the answer button
    Lock,

    /// `7` - re-enable the answer button
    Unlock,

    /// `9` - this client won the buzz
    Accepted,
}

impl OutboundCommand {
    /// Returns the wire byte for this command.
    #[must_use]
    pub const fn as_byte(&self) -> u8 {
        match self {
            Self::Lock => b'8',
            Self::Unlock => b'7',
            Self::Accepted => b'9',
        }
    }
}

impl fmt::Display for OutboundCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lock => write!(f, "lock"),
            Self::Unlock => write!(f, "unlock"),
            Self::Accepted => write!(f, "accepted"),
        }
    }
}
