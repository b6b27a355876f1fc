//! Unix signal plumbing for the recorder daemon.
//!
//! A dedicated thread turns incoming signals into `SignalMessage` values on
//! one mpsc channel, so the daemon loop has a single place to wait on.
//! Companion commands drive a running daemon through these same signals,
//! addressed at the PID recorded in the lock file.

use anyhow::{Context, Result};
use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM, SIGUSR1, SIGUSR2};
use signal_hook::iterator::Signals;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::thread;

/// Messages the daemon loop can receive from the outside world.
#[derive(Debug, Clone)]
pub enum SignalMessage {
    /// Re-read the configuration (SIGUSR2, also sent by the config watcher)
    Reload,
    /// End the active trip and submit it (SIGUSR1)
    EndTrip,
    /// Stop the daemon (SIGTERM, SIGINT, SIGHUP)
    Shutdown,
}

/// Handles the daemon loop holds onto while signals are being watched.
pub struct SignalState {
    /// Cleared when a shutdown signal arrives
    pub running: Arc<AtomicBool>,
    /// Receiving end of the unified message channel
    pub signal_receiver: Receiver<SignalMessage>,
    /// Sending end, cloned by the config watcher
    pub signal_sender: Sender<SignalMessage>,
}

/// Spawn the signal-watching thread and hand back its channel.
pub fn setup_signal_handler(debug_enabled: bool) -> Result<SignalState> {
    let (tx, rx) = channel::<SignalMessage>();
    let running = Arc::new(AtomicBool::new(true));

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP, SIGUSR1, SIGUSR2])
        .context("failed to register signal handlers")?;

    let flag = Arc::clone(&running);
    let forward = tx.clone();

    thread::spawn(move || {
        for sig in signals.forever() {
            let message = match sig {
                SIGUSR1 => {
                    log_pipe!();
                    log_info!("Received end-trip signal");
                    SignalMessage::EndTrip
                }
                SIGUSR2 => {
                    log_pipe!();
                    log_info!("Received configuration reload signal");
                    SignalMessage::Reload
                }
                SIGINT | SIGTERM | SIGHUP => {
                    if debug_enabled {
                        log_pipe!();
                        log_debug!("Received shutdown signal ({sig})");
                    }
                    flag.store(false, Ordering::SeqCst);
                    SignalMessage::Shutdown
                }
                _ => continue,
            };

            let shutting_down = matches!(message, SignalMessage::Shutdown);
            if forward.send(message).is_err() || shutting_down {
                // Receiver gone or daemon winding down, stop watching
                break;
            }
        }
    });

    Ok(SignalState {
        running,
        signal_receiver: rx,
        signal_sender: tx,
    })
}
