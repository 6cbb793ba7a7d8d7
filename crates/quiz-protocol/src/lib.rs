//! Quiz Protocol - Wire protocol for buzzer clients
//!
//! This crate provides the fixed short-text vocabulary buzzer clients
//! send, the single-byte commands the daemon sends back, and decoding
//! of raw reads into messages.

pub mod message;
pub mod parse;

pub use message::{InboundMessage, OutboundCommand, NAME_PREFIX};
pub use parse::{decode, parse_message, ProtocolError, MAX_MESSAGE_SIZE};
