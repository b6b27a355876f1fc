//! Implementation of the retry-submit command.
//!
//! Re-attempts submission of a trip that ended while the Trip API was
//! unreachable. The ledger and trip record were preserved exactly for this.

use anyhow::Result;

use crate::config::Config;
use crate::odometr;
use crate::session::SessionError;

/// Handle the retry-submit command.
pub fn handle_retry_submit_command(_debug_enabled: bool) -> Result<()> {
    log_version!();

    let config = Config::load()?;
    let session = odometr::build_session(&config)?;

    log_block_start!("Retrying trip submission for rider {}", config.rider_id);

    match session.retry_submit(&config.rider_id) {
        Ok(Some(summary)) => {
            log_block_start!("Trip {} submitted", summary.trip_id);
            log_indented!("Distance: {:.2} km", summary.total_distance_km);
            log_indented!("Fixes: {}", summary.fixes.len());
            log_end!();
            Ok(())
        }
        Ok(None) => {
            log_pipe!();
            log_warning!("No trip awaiting submission for rider {}", config.rider_id);
            log_end!();
            Ok(())
        }
        Err(SessionError::TripStillActive(trip_id)) => {
            log_pipe!();
            log_error!("Trip {trip_id} is still active");
            log_indented!("End it first: odometr end");
            log_end!();
            std::process::exit(1);
        }
        Err(SessionError::Submit(e)) => {
            log_pipe!();
            log_error!("Submission failed again: {}", e);
            log_indented!("The trip is still preserved, retry when the API is reachable");
            log_end!();
            std::process::exit(1);
        }
        Err(e) => {
            log_error_exit!("Could not retry submission: {}", e);
            std::process::exit(1);
        }
    }
}
