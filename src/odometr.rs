//! Application coordinator that manages the complete lifecycle of the recorder.
//!
//! This module handles resource acquisition, initialization, and orchestration
//! of the trip engine. It manages:
//! - Configuration loading
//! - Provider detection and creation
//! - Lock file management for single-instance enforcement
//! - Signal handler setup
//! - Config watcher startup
//! - The recorder main loop

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::sync::mpsc::RecvTimeoutError;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::{
    acquisition::AcquisitionPipeline,
    api::SpoolTripApi,
    config::{self, Config},
    io::lock,
    io::signals::{SignalMessage, SignalState, setup_signal_handler},
    prompt::LogPrompt,
    provider::{create_provider, detect_provider},
    session::{SessionError, TripSession},
    store::FileKvStore,
};

/// How long the main loop waits for a signal before re-checking the
/// running flag
const MAIN_LOOP_POLL_MS: u64 = 500;

/// Runner for the trip recorder.
pub struct Odometr {
    debug_enabled: bool,
}

impl Odometr {
    pub fn new(debug_enabled: bool) -> Self {
        Self { debug_enabled }
    }

    /// Execute the recorder with the configured settings.
    ///
    /// Loads configuration, enforces single-instance operation, wires up
    /// signal handling and the config watcher, resumes or starts a trip, and
    /// runs the main loop until the trip ends or a shutdown signal arrives.
    pub fn run(self) -> Result<()> {
        log_version!();

        let config = match Config::load() {
            Ok(config) => config,
            Err(e) => {
                log_error_exit!("Configuration failed");
                eprintln!("{e:?}");
                std::process::exit(1);
            }
        };

        // Detect and validate the provider early, before taking the lock
        let provider_kind = match detect_provider(&config) {
            Ok(kind) => kind,
            Err(e) => {
                log_error_exit!("Location provider unavailable");
                eprintln!("{e:?}");
                std::process::exit(1);
            }
        };

        // Never returns when another recorder holds the lock
        let (lock_file, lock_path) = lock::acquire_lock()?;

        let signal_state = setup_signal_handler(self.debug_enabled)?;

        // Config watcher is best-effort; SIGUSR2 still reloads manually
        if let Err(e) =
            config::start_config_watcher(signal_state.signal_sender.clone(), self.debug_enabled)
            && self.debug_enabled
        {
            log_pipe!();
            log_warning!("Config file watching unavailable: {}", e);
            log_indented!("Hot config reload disabled, use SIGUSR2 for manual reload");
        }

        config.log_config(Some(&provider_kind));

        let session = build_session(&config)?;

        log_block_start!("Lock acquired, starting odometr...");

        let trip = match session.resume(&config.rider_id) {
            Ok(Some(trip)) => {
                log_block_start!("Resumed trip {}", trip.trip_id);
                log_indented!("Started: {}", trip.started_at.to_rfc3339());
                log_indented!("Distance so far: {:.2} km", trip.total_distance_km);
                trip
            }
            Ok(None) => match session.start(&config.rider_id) {
                Ok(trip) => {
                    log_block_start!("Started trip {}", trip.trip_id);
                    log_indented!("Rider: {}", trip.rider_id);
                    trip
                }
                Err(SessionError::PendingSubmission(trip_id)) => {
                    log_pipe!();
                    log_error!("Trip {trip_id} is still awaiting submission");
                    log_indented!("Submit it first: odometr retry-submit");
                    log_end!();
                    std::process::exit(1);
                }
                Err(e) => {
                    log_error_exit!("Could not start trip: {}", e);
                    std::process::exit(1);
                }
            },
            Err(e) => {
                log_error_exit!("Could not resume trip: {}", e);
                std::process::exit(1);
            }
        };

        log_block_start!("Recording trip {} until 'odometr end' or Ctrl+C", trip.trip_id);

        self.main_loop(&session, &signal_state);

        // Release and remove the lock so the next start is clean
        drop(lock_file);
        let _ = std::fs::remove_file(&lock_path);

        log_end!();
        Ok(())
    }

    /// Service signal messages until the trip ends or shutdown is requested.
    fn main_loop(&self, session: &Arc<TripSession>, signal_state: &SignalState) {
        while signal_state.running.load(Ordering::SeqCst) {
            let message = match signal_state
                .signal_receiver
                .recv_timeout(Duration::from_millis(MAIN_LOOP_POLL_MS))
            {
                Ok(message) => message,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };

            match message {
                SignalMessage::Reload => self.handle_reload(session),
                SignalMessage::EndTrip => {
                    self.handle_end_trip(session);
                    break;
                }
                SignalMessage::Shutdown => {
                    session.suspend();
                    log_block_start!("Trip suspended, resume with: odometr start");
                    break;
                }
            }
        }
    }

    /// Re-read the config file and apply acquisition tuning to the running
    /// session. An Active trip is never interrupted; provider changes need a
    /// restart.
    fn handle_reload(&self, session: &Arc<TripSession>) {
        let reloaded = match Config::load() {
            Ok(config) => config,
            Err(e) => {
                log_pipe!();
                log_warning!("Configuration reload failed, keeping current settings: {}", e);
                return;
            }
        };

        session.apply_reload(
            reloaded.foreground_interval_secs,
            reloaded.acquire_tuning(),
        );

        log_block_start!("Applied configuration reload");
        log_indented!(
            "Foreground interval: {}s",
            reloaded.foreground_interval_secs
        );
        log_indented!(
            "Timeouts: {}ms foreground, {}ms background",
            reloaded.foreground_timeout_ms,
            reloaded.background_timeout_ms
        );
        log_indented!("Provider changes take effect on the next start");
    }

    /// End the active trip and submit it. Submission failures leave the trip
    /// record and ledger on disk for retry-submit.
    fn handle_end_trip(&self, session: &Arc<TripSession>) {
        match session.end() {
            Ok(summary) => {
                log_block_start!("Trip {} complete", summary.trip_id);
                log_indented!("Distance: {:.2} km", summary.total_distance_km);
                log_indented!("Fixes recorded: {}", summary.fixes.len());
                log_indented!(
                    "Duration: {}",
                    format_duration(summary.ended_at - summary.started_at)
                );
            }
            Err(SessionError::Submit(e)) => {
                log_pipe!();
                log_error!("Trip ended but submission failed: {}", e);
                log_indented!("The trip is preserved, submit it with: odometr retry-submit");
            }
            Err(e) => {
                log_pipe!();
                log_error!("Could not end trip: {}", e);
            }
        }
    }
}

/// Assemble the trip engine from production collaborators.
///
/// Companion commands reuse this so `end` and `retry-submit` operate on the
/// same stores the recorder writes.
pub(crate) fn build_session(config: &Config) -> Result<Arc<TripSession>> {
    let provider_kind = detect_provider(config)?;
    let provider = create_provider(provider_kind, config)?;

    let pipeline = Arc::new(AcquisitionPipeline::new(
        Arc::from(provider),
        Arc::new(LogPrompt),
        config.acquire_tuning(),
    ));

    let store = Arc::new(FileKvStore::open_default().context("Failed to open trip store")?);
    let api = Arc::new(SpoolTripApi::open_default().context("Failed to open submission spool")?);

    Ok(TripSession::new(
        pipeline,
        api,
        store,
        config.foreground_interval_secs,
    ))
}

/// Render a chrono duration as `HhMMmSSs` for trip summaries.
pub(crate) fn format_duration(duration: chrono::Duration) -> String {
    let total_secs = duration.num_seconds().max(0);
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{hours}h{minutes:02}m{seconds:02}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds:02}s")
    } else {
        format!("{seconds}s")
    }
}
