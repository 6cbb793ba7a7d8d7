//! Quiz Daemon - buzzer arbitration server
//!
//! This binary accepts buzzer client connections and grants answering
//! rights to the first client to buzz each round.
//!
//! # Usage
//!
//! ```bash
//! # Start the daemon (foreground)
//! quizd start
//!
//! # Start the daemon (background/daemonized)
//! quizd start -d
//!
//! # Lock out the current answerer (incorrect answer)
//! quizd lockout
//!
//! # Reset the round for everyone
//! quizd reset
//!
//! # Stop the daemon
//! quizd stop
//!
//! # Check daemon status
//! quizd status
//!
//! # Listen on a custom address
//! QUIZD_LISTEN=0.0.0.0:6000 quizd start
//!
//! # Enable debug logging
//! RUST_LOG=quizd=debug quizd start
//! ```
//!
//! # Signal Handling
//!
//! - SIGTERM/SIGINT: Graceful shutdown
//! - SIGUSR2: Lock out the current answerer
//! - SIGHUP: Reset the round

use std::fs::{self, File};
use std::io::{Read, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use quizd::config::DaemonConfig;
use quizd::control::{spawn_signal_listener, ControlFlags};
use quizd::registry::spawn_registry;
use quizd::server::QuizServer;

/// Quiz daemon - first-come-first-served buzzer controller
#[derive(Parser, Debug)]
#[command(name = "quizd", version, about)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the daemon
    Start {
        /// Run as a background daemon (fork to background)
        #[arg(short = 'd', long)]
        daemon: bool,

        /// Address to listen on (overrides config file and QUIZD_LISTEN)
        #[arg(short, long)]
        listen: Option<SocketAddr>,

        /// Path to a TOML config file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Stop the running daemon
    Stop,
    /// Show daemon status
    Status,
    /// Lock out the current answerer and release everyone else
    Lockout,
    /// Unlock all clients for the next round
    Reset,
}

/// Returns the state directory for pid and log files.
fn state_dir() -> PathBuf {
    dirs::state_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("quizd")
}

/// Returns the path to the PID file.
fn pid_file_path() -> PathBuf {
    state_dir().join("quizd.pid")
}

/// Returns the path to the log file.
fn log_file_path() -> PathBuf {
    state_dir().join("quizd.log")
}

/// Reads the PID from the PID file, if it exists.
fn read_pid() -> Option<u32> {
    let path = pid_file_path();
    let mut file = File::open(&path).ok()?;
    let mut contents = String::new();
    file.read_to_string(&mut contents).ok()?;
    contents.trim().parse().ok()
}

/// Writes the current PID to the PID file.
fn write_pid() -> Result<()> {
    let path = pid_file_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create state directory")?;
    }
    let mut file = File::create(&path).context("Failed to create PID file")?;
    write!(file, "{}", process::id()).context("Failed to write PID")?;
    Ok(())
}

/// Removes the PID file.
fn remove_pid_file() {
    let _ = fs::remove_file(pid_file_path());
}

/// Checks if a process with the given PID is running.
fn is_process_running(pid: u32) -> bool {
    // Linux-specific, like the rest of the pid handling
    PathBuf::from(format!("/proc/{}", pid)).exists()
}

/// Checks if the daemon is already running.
fn is_daemon_running() -> Option<u32> {
    if let Some(pid) = read_pid() {
        if is_process_running(pid) {
            return Some(pid);
        }
        // Stale PID file - remove it
        remove_pid_file();
    }
    None
}

/// Sends a signal to the daemon process.
#[cfg(unix)]
fn signal_daemon(pid: u32, signal: libc::c_int, name: &str) -> Result<()> {
    let result = unsafe { libc::kill(pid as i32, signal) };
    if result != 0 {
        bail!("Failed to send {} to process {}", name, pid);
    }
    Ok(())
}

/// Forwards an operator request to the running daemon.
fn request(signal_name: &str, done: &str) -> Result<()> {
    let Some(pid) = is_daemon_running() else {
        eprintln!("Daemon is not running.");
        process::exit(1);
    };

    #[cfg(unix)]
    {
        let signal = match signal_name {
            "SIGUSR2" => libc::SIGUSR2,
            "SIGHUP" => libc::SIGHUP,
            other => bail!("Unsupported signal {}", other),
        };
        signal_daemon(pid, signal, signal_name)?;
        println!("{} (applied within one poll interval).", done);
        Ok(())
    }
    #[cfg(not(unix))]
    {
        let _ = (pid, done);
        bail!("{} is only supported on Unix systems", signal_name);
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Default to 'start' if no subcommand given
    let command = args.command.unwrap_or(Command::Start {
        daemon: false,
        listen: None,
        config: None,
    });

    match command {
        Command::Start {
            daemon,
            listen,
            config,
        } => {
            // Check if already running
            if let Some(pid) = is_daemon_running() {
                eprintln!("Daemon is already running (PID {})", pid);
                eprintln!("Use 'quizd stop' to stop it first.");
                process::exit(1);
            }

            // Resolve before daemonizing so errors reach the terminal
            let mut config = DaemonConfig::resolve(config.as_deref())
                .context("Failed to load configuration")?;
            if let Some(listen) = listen {
                config.listen = listen;
            }

            if daemon {
                // Daemonize before starting tokio runtime
                daemonize()?;
            }

            write_pid()?;
            let result = run_daemon(config);
            remove_pid_file();

            result
        }
        Command::Stop => {
            if let Some(pid) = is_daemon_running() {
                println!("Stopping daemon (PID {})...", pid);
                #[cfg(unix)]
                signal_daemon(pid, libc::SIGTERM, "SIGTERM")?;
                #[cfg(not(unix))]
                bail!("Stop command is only supported on Unix systems");

                // Wait for process to exit (up to 5 seconds)
                for _ in 0..50 {
                    if !is_process_running(pid) {
                        println!("Daemon stopped.");
                        return Ok(());
                    }
                    std::thread::sleep(std::time::Duration::from_millis(100));
                }

                eprintln!("Daemon did not stop within 5 seconds.");
                process::exit(1);
            } else {
                println!("Daemon is not running.");
                Ok(())
            }
        }
        Command::Status => {
            if let Some(pid) = is_daemon_running() {
                println!("Daemon is running (PID {})", pid);
                Ok(())
            } else {
                println!("Daemon is not running.");
                process::exit(1);
            }
        }
        Command::Lockout => request("SIGUSR2", "Lockout requested"),
        Command::Reset => request("SIGHUP", "Reset requested"),
    }
}

/// Daemonizes the current process.
fn daemonize() -> Result<()> {
    use daemonize::Daemonize;

    let log_path = log_file_path();

    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).context("Failed to create log directory")?;
    }

    let stdout = File::create(&log_path).context("Failed to create log file for stdout")?;
    let stderr = File::create(&log_path).context("Failed to create log file for stderr")?;

    Daemonize::new()
        .working_directory("/")
        .stdout(stdout)
        .stderr(stderr)
        .start()
        .context("Failed to daemonize")?;

    Ok(())
}

/// Runs the daemon (async entry point).
#[tokio::main]
async fn run_daemon(config: DaemonConfig) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("quizd=info".parse()?)
                .add_directive("quiz_core=info".parse()?)
                .add_directive("quiz_protocol=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        listen = %config.listen,
        poll_interval_ms = config.poll_interval_ms,
        "Quiz daemon starting"
    );

    let cancel_token = CancellationToken::new();
    let control = ControlFlags::new_shared();

    let _signals = spawn_signal_listener(control.clone(), cancel_token.clone())
        .context("Failed to install signal handlers")?;

    let (registry, registry_task) = spawn_registry(&config, control, cancel_token.clone());
    info!("Client registry started");

    let server = QuizServer::bind(config.listen, registry, cancel_token.clone()).await?;
    server.run().await?;

    // The registry stops on cancellation; an error here means it stopped
    // the daemon because its state could no longer be trusted.
    match registry_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            error!(error = %e, "Registry failed");
            bail!("registry stopped on internal error: {e}");
        }
        Err(e) => {
            error!(error = %e, "Registry task panicked");
            bail!("registry task failed: {e}");
        }
    }

    info!("Quiz daemon stopped");
    Ok(())
}
