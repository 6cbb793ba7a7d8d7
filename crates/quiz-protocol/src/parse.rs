//! Decoding of raw client reads into protocol messages.
//!
//! The buzzer apps write each message in a single short burst, so one
//! read is treated as one message. Line-oriented clients (netcat, test
//! harnesses) may batch several messages separated by newlines; each
//! non-empty line is then decoded on its own.

use thiserror::Error;

use crate::message::{InboundMessage, NAME_PREFIX};

/// Maximum number of bytes taken from a single read.
pub const MAX_MESSAGE_SIZE: usize = 1024;

/// Errors produced while decoding client input.
///
/// None of these are fatal: the caller logs and drops the input and
/// the connection stays open.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("message is not valid UTF-8")]
    InvalidUtf8,

    #[error("unrecognized message: {0:?}")]
    Unrecognized(String),

    #[error("name registration with empty name")]
    EmptyName,
}

/// Decodes one read from a client into zero or more messages.
///
/// Only newlines separate messages. Unterminated messages that arrive
/// together in one read are not split: `Name:Alice` immediately followed
/// by `9` decodes as the name `Alice9`.
pub fn decode(bytes: &[u8]) -> Vec<Result<InboundMessage, ProtocolError>> {
    let text = match std::str::from_utf8(bytes) {
        Ok(text) => text,
        Err(_) => return vec![Err(ProtocolError::InvalidUtf8)],
    };

    text.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .filter(|line| !line.is_empty())
        .map(parse_message)
        .collect()
}

/// Parses a single message with line terminators already removed.
pub fn parse_message(text: &str) -> Result<InboundMessage, ProtocolError> {
    match text {
        "ka" => Ok(InboundMessage::KeepAlive),
        "0" => Ok(InboundMessage::LockProbe),
        "1" => Ok(InboundMessage::UnlockProbe),
        "9" => Ok(InboundMessage::Buzz),
        other => match other.strip_prefix(NAME_PREFIX) {
            Some("") => Err(ProtocolError::EmptyName),
            Some(name) => Ok(InboundMessage::Name(name.to_string())),
            None => Err(ProtocolError::Unrecognized(other.to_string())),
        },
    }
}
