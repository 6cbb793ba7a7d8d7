//! Quiz Core - Shared types for the buzzer controller
//!
//! This crate provides the client domain types shared between
//! the wire protocol and the daemon (quizd).
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod client;
pub mod error;

// Re-exports for convenience
pub use client::{ClientId, ClientRecord, ClientStatus, ClientView};
pub use error::{DomainError, DomainResult};
