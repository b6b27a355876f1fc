//! Implementation of the end command.
//!
//! Ends the active trip. When a recorder is running it gets an end-trip
//! signal and handles submission itself; otherwise the trip is ended
//! directly from the on-disk record and ledger.

use anyhow::Result;

use crate::config::Config;
use crate::io::instance;
use crate::odometr;
use crate::session::SessionError;
use crate::store::FileKvStore;
use crate::trip::{self, TripStatus};

/// Handle the end command to finish and submit the active trip.
pub fn handle_end_command(_debug_enabled: bool) -> Result<()> {
    log_version!();

    // A running recorder owns the trip; hand the end over to it
    if let Some(info) = instance::get_running_instance()? {
        log_block_start!("Signaling odometr to end the trip...");
        instance::send_end_trip_signal(info.pid)?;
        log_decorated!("Sent end-trip signal to odometr (PID: {})", info.pid);
        log_indented!("The recorder will submit the trip and exit");
        log_end!();
        return Ok(());
    }

    let config = Config::load()?;
    let store = FileKvStore::open_default()?;

    match trip::load_trip_record(&store, &config.rider_id)? {
        None => {
            log_pipe!();
            log_warning!("No active trip to end for rider {}", config.rider_id);
            log_end!();
            return Ok(());
        }
        Some(record) if record.status == TripStatus::Ended => {
            log_pipe!();
            log_warning!("Trip {} already ended but is awaiting submission", record.trip_id);
            log_indented!("Submit it with: odometr retry-submit");
            log_end!();
            return Ok(());
        }
        Some(_) => {}
    }

    // No recorder running: revive the suspended trip and end it here
    let session = odometr::build_session(&config)?;
    let trip = session
        .resume(&config.rider_id)
        .map_err(|e| anyhow::anyhow!("could not resume trip: {e}"))?
        .ok_or_else(|| anyhow::anyhow!("trip record disappeared while ending"))?;

    log_block_start!("Ending suspended trip {}", trip.trip_id);

    match session.end() {
        Ok(summary) => {
            log_block_start!("Trip {} complete", summary.trip_id);
            log_indented!("Distance: {:.2} km", summary.total_distance_km);
            log_indented!("Fixes recorded: {}", summary.fixes.len());
            log_indented!(
                "Duration: {}",
                odometr::format_duration(summary.ended_at - summary.started_at)
            );
            log_end!();
            Ok(())
        }
        Err(SessionError::Submit(e)) => {
            log_pipe!();
            log_error!("Trip ended but submission failed: {}", e);
            log_indented!("The trip is preserved, submit it with: odometr retry-submit");
            log_end!();
            Ok(())
        }
        Err(e) => {
            log_error_exit!("Could not end trip: {}", e);
            std::process::exit(1);
        }
    }
}
