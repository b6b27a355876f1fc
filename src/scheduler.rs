//! Background acquisition scheduler.
//!
//! Runs a dedicated thread that wakes on a fixed cadence and pulls one fix
//! through the acquisition pipeline in Background mode. The cadence is the
//! foreground interval doubled, floored so that a very chatty foreground
//! setting cannot turn the background path into a battery drain.
//!
//! The scheduler never terminates a trip on its own: a cycle that fails is
//! logged and the next cycle runs as scheduled. `stop()` joins the worker,
//! so once it returns no further fix will reach the sink.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::acquisition::{AcquireMode, AcquisitionPipeline};
use crate::geo::Fix;
use crate::provider::FixSink;

/// Compute the background cadence from the foreground interval.
///
/// Doubling keeps the background path strictly cheaper than the foreground
/// watch; the floor caps how often an unattended device wakes the radio.
pub fn background_interval(foreground_interval_secs: u64) -> Duration {
    let doubled = foreground_interval_secs.saturating_mul(2);
    Duration::from_secs(doubled.max(crate::constants::SCHEDULER_INTERVAL_FLOOR_SECS))
}

/// Handle to a running background scheduler thread.
pub struct SchedulerHandle {
    stopping: Arc<AtomicBool>,
    interval: Arc<Mutex<Duration>>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Start the scheduler with the cadence derived from config.
    pub fn start(
        pipeline: Arc<AcquisitionPipeline>,
        last_known: Arc<Mutex<Option<Fix>>>,
        sink: FixSink,
        foreground_interval_secs: u64,
    ) -> Self {
        Self::start_with_interval(
            pipeline,
            last_known,
            sink,
            background_interval(foreground_interval_secs),
        )
    }

    /// Start the scheduler with an explicit cadence.
    pub fn start_with_interval(
        pipeline: Arc<AcquisitionPipeline>,
        last_known: Arc<Mutex<Option<Fix>>>,
        sink: FixSink,
        interval: Duration,
    ) -> Self {
        let stopping = Arc::new(AtomicBool::new(false));
        let shared_interval = Arc::new(Mutex::new(interval));

        let thread_stopping = Arc::clone(&stopping);
        let thread_interval = Arc::clone(&shared_interval);
        let thread = std::thread::spawn(move || {
            run_loop(
                pipeline,
                last_known,
                sink,
                thread_stopping,
                thread_interval,
            );
        });

        Self {
            stopping,
            interval: shared_interval,
            thread: Some(thread),
        }
    }

    /// Replace the cadence, taking effect from the next wait.
    pub fn set_interval(&self, foreground_interval_secs: u64) {
        let interval = background_interval(foreground_interval_secs);
        *self.interval.lock().unwrap() = interval;
        log_debug!("Background cadence now {}s", interval.as_secs());
    }

    /// Stop the scheduler and join its thread.
    ///
    /// When this returns, no further fix will be delivered to the sink.
    pub fn stop(mut self) {
        self.stopping.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.stopping.store(true, Ordering::SeqCst);
    }
}

fn run_loop(
    pipeline: Arc<AcquisitionPipeline>,
    last_known: Arc<Mutex<Option<Fix>>>,
    sink: FixSink,
    stopping: Arc<AtomicBool>,
    interval: Arc<Mutex<Duration>>,
) {
    loop {
        let wait = *interval.lock().unwrap();
        if !sleep_unless_stopping(wait, &stopping) {
            return;
        }

        let cached = last_known.lock().unwrap().clone();
        match pipeline.acquire(AcquireMode::Background, cached.as_ref()) {
            Ok(fix) => {
                if stopping.load(Ordering::SeqCst) {
                    return;
                }
                sink(fix);
            }
            Err(e) => {
                // One failed cycle must not end the trip; the next wake
                // retries from scratch.
                log_pipe!();
                log_warning!("Background acquisition cycle failed: {}", e);
            }
        }
    }
}

/// Sleep in short slices so stop() is honored promptly.
///
/// Returns false when the scheduler was asked to stop during the wait.
fn sleep_unless_stopping(duration: Duration, stopping: &AtomicBool) -> bool {
    let slice = Duration::from_millis(crate::constants::SCHEDULER_SLEEP_SLICE_MS);
    let mut slept = Duration::ZERO;
    while slept < duration {
        if stopping.load(Ordering::SeqCst) {
            return false;
        }
        let step = slice.min(duration - slept);
        crate::time_source::sleep(step);
        slept += step;
    }
    !stopping.load(Ordering::SeqCst)
}
