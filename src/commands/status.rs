//! Implementation of the status command.
//!
//! Reads trip progress straight from the on-disk record and ledger, so it
//! works whether or not a recorder is currently running.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::io::instance;
use crate::ledger::CoordinateLedger;
use crate::store::FileKvStore;
use crate::trip::{self, TripStatus};

/// Handle the status command to show active trip progress.
pub fn handle_status_command(_debug_enabled: bool) -> Result<()> {
    log_version!();

    // Restores a custom config dir recorded by the running daemon, if any
    let running = instance::get_running_instance()?;

    let config = Config::load()?;
    let store: Arc<dyn crate::store::KvStore> = Arc::new(FileKvStore::open_default()?);

    let record = trip::load_trip_record(store.as_ref(), &config.rider_id)?;

    let Some(record) = record else {
        log_block_start!("No trip in progress for rider {}", config.rider_id);
        match running {
            Some(info) => log_indented!("Recorder running (PID: {})", info.pid),
            None => log_indented!("Start one with: odometr start"),
        }
        log_end!();
        return Ok(());
    };

    let ledger = CoordinateLedger::new(Arc::clone(&store));
    let fixes = ledger
        .read_all(&record.trip_id)
        .map_err(|e| anyhow::anyhow!("could not read trip ledger: {e}"))?;

    match record.status {
        TripStatus::Active => log_block_start!("Trip {} is recording", record.trip_id),
        TripStatus::Ended => {
            log_block_start!("Trip {} has ended, awaiting submission", record.trip_id)
        }
    }
    log_indented!("Rider: {}", record.rider_id);
    log_indented!("Started: {}", record.started_at.to_rfc3339());
    if let Some(ended_at) = record.ended_at {
        log_indented!("Ended: {}", ended_at.to_rfc3339());
    }
    log_indented!("Distance: {:.2} km", record.total_distance_km);
    log_indented!("Fixes recorded: {}", fixes.len());
    if let Some(last) = fixes.last()
        && let Some(captured) = DateTime::<Utc>::from_timestamp_millis(last.captured_at_epoch_millis)
    {
        log_indented!("Last fix: {}", captured.to_rfc3339());
    }

    match (record.status, running) {
        (TripStatus::Active, Some(info)) => {
            log_block_start!("Recorder running (PID: {})", info.pid);
        }
        (TripStatus::Active, None) => {
            log_block_start!("Recorder not running, trip resumes on next start");
        }
        (TripStatus::Ended, _) => {
            log_block_start!("Submit with: odometr retry-submit");
        }
    }
    log_end!();

    Ok(())
}
