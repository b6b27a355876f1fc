//! Implementation of the simulate command.
//!
//! Replays a recorded fix log through the full trip engine against a
//! simulated clock, so a whole delivery route plays out in seconds. The
//! simulation runs on scratch stores and never touches real trip state.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;

use crate::acquisition::AcquisitionPipeline;
use crate::api::SpoolTripApi;
use crate::config::Config;
use crate::constants::DEFAULT_SIMULATION_MULTIPLIER;
use crate::odometr;
use crate::prompt::LogPrompt;
use crate::provider::{LocationProvider, replay::ReplayProvider};
use crate::session::TripSession;
use crate::store::FileKvStore;
use crate::time_source::{self, SimulatedTimeSource};

/// Real-time poll cadence while waiting for the replay to drain
const SIMULATE_POLL_MS: u64 = 50;

/// Give up after this many polls without a new fix
const SIMULATE_STALL_LIMIT: u32 = 200;

/// Handle the simulate command: drive the engine over a replay log with
/// accelerated time.
///
/// # Arguments
/// * `replay_path` - Path to a JSON fix log
/// * `multiplier` - Time acceleration factor (None = default 60x)
/// * `debug_enabled` - Whether debug mode is enabled
pub fn handle_simulate_command(
    replay_path: String,
    multiplier: Option<f64>,
    _debug_enabled: bool,
) -> Result<()> {
    let multiplier = multiplier.unwrap_or(DEFAULT_SIMULATION_MULTIPLIER);

    let config = Config::load()?;
    let interval = Duration::from_secs(config.foreground_interval_secs);

    let path = PathBuf::from(&replay_path);
    let provider = Arc::new(
        ReplayProvider::from_file(&path, interval).context("Failed to load replay log")?,
    );
    let total_fixes = provider.remaining();

    // Size the simulation window to the route: one watch interval per fix
    // plus slack for the initial acquisition
    let start = Local::now();
    let window_secs = config.foreground_interval_secs as i64 * (total_fixes as i64 + 2);
    let end = start + chrono::Duration::seconds(window_secs);

    // Install the simulated clock BEFORE any engine construction so every
    // sleep and timestamp runs on it
    time_source::init_time_source(Arc::new(SimulatedTimeSource::new(start, end, multiplier)));

    log_version!();
    log_block_start!("Simulation mode");
    log_indented!("Replaying {} fixes from {}", total_fixes, path.display());
    log_indented!("Watch cadence: {}s simulated", config.foreground_interval_secs);
    log_indented!("Time multiplier: {multiplier}x");

    // Scratch stores: the simulated trip must not collide with a real one
    let scratch = tempfile::tempdir().context("Failed to create simulation scratch dir")?;
    let store = Arc::new(FileKvStore::open(scratch.path().join("store"))?);
    let api = Arc::new(SpoolTripApi::open(scratch.path().join("outbox"))?);

    let pipeline = Arc::new(AcquisitionPipeline::new(
        Arc::clone(&provider) as Arc<dyn LocationProvider>,
        Arc::new(LogPrompt),
        config.acquire_tuning(),
    ));
    let session = TripSession::new(pipeline, api, store, config.foreground_interval_secs);

    let trip = session
        .start(&config.rider_id)
        .map_err(|e| anyhow::anyhow!("could not start simulated trip: {e}"))?;
    log_block_start!("Started simulated trip {}", trip.trip_id);

    wait_for_replay_drain(&session, total_fixes);

    let summary = session
        .end()
        .map_err(|e| anyhow::anyhow!("could not end simulated trip: {e}"))?;

    log_block_start!("Simulated trip {} complete", summary.trip_id);
    log_indented!("Distance: {:.2} km", summary.total_distance_km);
    log_indented!("Fixes recorded: {}", summary.fixes.len());
    log_indented!(
        "Simulated duration: {}",
        odometr::format_duration(summary.ended_at - summary.started_at)
    );
    log_end!();

    Ok(())
}

/// Block until the session has ingested the whole replay log, or no new fix
/// has arrived for a while (rejected fixes make an exact count unreachable).
fn wait_for_replay_drain(session: &Arc<TripSession>, expected: usize) {
    let mut last_count = 0usize;
    let mut stalled_polls = 0u32;

    loop {
        // Real sleep on purpose: the simulated clock is racing ahead
        std::thread::sleep(Duration::from_millis(SIMULATE_POLL_MS));

        let status = session.status();
        if status.fix_count >= expected {
            return;
        }

        if status.fix_count == last_count {
            stalled_polls += 1;
            if stalled_polls >= SIMULATE_STALL_LIMIT {
                log_pipe!();
                log_warning!(
                    "Replay stalled at {} of {} fixes, ending trip anyway",
                    status.fix_count,
                    expected
                );
                return;
            }
        } else {
            stalled_polls = 0;
            last_count = status.fix_count;
        }
    }
}
