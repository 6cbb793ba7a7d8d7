//! Operator control channel.
//!
//! Lockout and reset requests arrive out-of-band (process signals) and are
//! only deposited here. The registry actor drains them at its next
//! housekeeping tick, so repeated requests between ticks coalesce into one.
//!
//! | Signal           | Effect                                   |
//! |------------------|------------------------------------------|
//! | SIGUSR2          | lock out the current answerer            |
//! | SIGHUP           | reset the round for everyone             |
//! | SIGINT / SIGTERM | orderly shutdown                         |
//! | SIGUSR1          | logged, otherwise ignored                |

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Pending operator requests.
///
/// Single producer (signal task or admin caller), single consumer (the
/// registry actor).
#[derive(Debug, Default)]
pub struct ControlFlags {
    lockout: AtomicBool,
    reset: AtomicBool,
}

impl ControlFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates flags wrapped in Arc for sharing.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Requests a lockout of the current answerer.
    pub fn request_lockout(&self) {
        self.lockout.store(true, Ordering::Release);
    }

    /// Requests a round reset.
    pub fn request_reset(&self) {
        self.reset.store(true, Ordering::Release);
    }

    /// Consumes a pending lockout request.
    pub fn take_lockout(&self) -> bool {
        self.lockout.swap(false, Ordering::AcqRel)
    }

    /// Consumes a pending reset request.
    pub fn take_reset(&self) -> bool {
        self.reset.swap(false, Ordering::AcqRel)
    }

    /// Returns true if any request is waiting for a tick.
    pub fn is_pending(&self) -> bool {
        self.lockout.load(Ordering::Acquire) || self.reset.load(Ordering::Acquire)
    }
}

/// Spawns the task translating process signals into control requests.
///
/// Returns once the task is spawned; the task runs until `cancel_token`
/// fires. A terminate signal cancels the token.
#[cfg(unix)]
pub fn spawn_signal_listener(
    flags: Arc<ControlFlags>,
    cancel_token: CancellationToken,
) -> std::io::Result<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sighup = signal(SignalKind::hangup())?;
    let mut sigusr1 = signal(SignalKind::user_defined1())?;
    let mut sigusr2 = signal(SignalKind::user_defined2())?;

    Ok(tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => break,
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, terminating");
                    cancel_token.cancel();
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, terminating");
                    cancel_token.cancel();
                    break;
                }
                _ = sighup.recv() => {
                    info!("Received SIGHUP, round reset requested");
                    flags.request_reset();
                }
                _ = sigusr2.recv() => {
                    info!("Received SIGUSR2, lockout of current answerer requested");
                    flags.request_lockout();
                }
                _ = sigusr1.recv() => {
                    info!("Received SIGUSR1, ignored");
                }
            }
        }
    }))
}

/// Spawns the task translating Ctrl+C into shutdown.
///
/// Lockout and reset have no signal equivalent here.
#[cfg(not(unix))]
pub fn spawn_signal_listener(
    _flags: Arc<ControlFlags>,
    cancel_token: CancellationToken,
) -> std::io::Result<JoinHandle<()>> {
    Ok(tokio::spawn(async move {
        tokio::select! {
            _ = cancel_token.cancelled() => {}
            result = tokio::signal::ctrl_c() => {
                if result.is_ok() {
                    info!("Received Ctrl+C, terminating");
                }
                cancel_token.cancel();
            }
        }
    }))
}
