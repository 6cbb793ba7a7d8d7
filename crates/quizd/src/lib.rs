//! Quiz Daemon - First-come-first-served buzzer arbitration
//!
//! This crate provides the core infrastructure for the quiz daemon:
//! - `registry` - Client registry actor and buzzer arbitration
//! - `server` - TCP server for buzzer client connections
//! - `control` - Operator lockout/reset requests and signal wiring
//! - `config` - Daemon configuration
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       quizd daemon                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │   QuizServer    │────▶│     RegistryActor           │   │
//! │  │ (TcpListener)   │     │  (sole owner of arbitration)│   │
//! │  └────────┬────────┘     └──────────────┬──────────────┘   │
//! │           │                             │                   │
//! │           │ connections                 │ housekeeping tick │
//! │           ▼                             ▼                   │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │ConnectionHandler│     │   ControlFlags              │   │
//! │  │  (per client)   │     │   (SIGUSR2 / SIGHUP)        │   │
//! │  └─────────────────┘     └─────────────────────────────┘   │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod config;
pub mod control;
pub mod registry;
pub mod server;
