//! Swappable clock behind the trip engine.
//!
//! Everything in the engine that reads or waits on time goes through the
//! process-wide source installed here. Production uses the real clock; the
//! `simulate` command and the clock-driven tests install an accelerated one
//! so scheduler cadences and acquisition backoff elapse without real waiting.

use chrono::{DateTime, Duration as ChronoDuration, Local};
use once_cell::sync::OnceCell;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};

/// Process-wide clock. First initialization wins; reads fall back to the
/// real clock when nothing was installed.
static TIME_SOURCE: OnceCell<Arc<dyn TimeSource>> = OnceCell::new();

/// Clock operations the engine is allowed to perform.
pub trait TimeSource: Send + Sync {
    /// Current wall-clock time.
    fn now(&self) -> DateTime<Local>;

    /// Current time as a SystemTime, for epoch arithmetic.
    fn system_now(&self) -> SystemTime;

    /// Block for the duration, as this clock measures it.
    fn sleep(&self, duration: Duration);

    /// Whether this clock is simulated.
    fn is_simulated(&self) -> bool;
}

/// The real system clock.
pub struct RealTimeSource;

impl TimeSource for RealTimeSource {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }

    fn system_now(&self) -> SystemTime {
        SystemTime::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }

    fn is_simulated(&self) -> bool {
        false
    }
}

/// Accelerated clock covering a fixed simulation window.
///
/// Two modes, selected by the multiplier:
/// - **Jump** (`multiplier <= 0.0`): every `sleep` advances the clock by
///   exactly the requested duration and yields for a millisecond of real
///   time. A whole route replays in however long its bookkeeping takes.
/// - **Scaled** (`multiplier > 0.0`): sleeps run on the real clock divided
///   by the multiplier, and `now()` advances smoothly through in-progress
///   sleeps so status output reads like a timeline.
///
/// The clock never leaves the window; sleeps that would cross the end are
/// clipped to it.
pub struct SimulatedTimeSource {
    window_start: DateTime<Local>,
    window_end: DateTime<Local>,
    multiplier: f64,
    /// Jump mode only: the manually advanced clock.
    jump_clock: Mutex<DateTime<Local>>,
    /// Scaled mode only: total simulated time of completed sleeps.
    slept: Mutex<Duration>,
    /// Scaled mode only: when the current sleep began and how much
    /// simulated time it covers.
    active_sleep: Mutex<Option<(Instant, Duration)>>,
}

impl SimulatedTimeSource {
    pub fn new(window_start: DateTime<Local>, window_end: DateTime<Local>, multiplier: f64) -> Self {
        Self {
            window_start,
            window_end,
            multiplier,
            jump_clock: Mutex::new(window_start),
            slept: Mutex::new(Duration::ZERO),
            active_sleep: Mutex::new(None),
        }
    }

    fn is_jump_mode(&self) -> bool {
        self.multiplier <= 0.0
    }

    /// Simulated time elapsed since the window start, including the
    /// already-covered portion of a sleep still in progress.
    fn simulated_elapsed(&self) -> Duration {
        let mut elapsed = *self.slept.lock().unwrap();
        if let Some((began, covers)) = *self.active_sleep.lock().unwrap() {
            let progressed = began.elapsed().as_secs_f64() * self.multiplier;
            elapsed += Duration::from_secs_f64(progressed.min(covers.as_secs_f64()));
        }
        elapsed
    }

    fn clock(&self) -> DateTime<Local> {
        if self.is_jump_mode() {
            return *self.jump_clock.lock().unwrap();
        }
        let advanced = ChronoDuration::from_std(self.simulated_elapsed())
            .unwrap_or(self.window_end - self.window_start);
        (self.window_start + advanced).min(self.window_end)
    }
}

impl TimeSource for SimulatedTimeSource {
    fn now(&self) -> DateTime<Local> {
        self.clock()
    }

    fn system_now(&self) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_millis(self.clock().timestamp_millis() as u64)
    }

    fn sleep(&self, duration: Duration) {
        if self.is_jump_mode() {
            {
                let mut clock = self.jump_clock.lock().unwrap();
                let advance = ChronoDuration::milliseconds(duration.as_millis() as i64);
                *clock = (*clock + advance).min(self.window_end);
            }
            // Yield so other threads interleave and output stays ordered
            std::thread::sleep(Duration::from_millis(1));
            return;
        }

        // Clip the request to what is left of the window
        let remaining = (self.window_end - self.clock())
            .to_std()
            .unwrap_or(Duration::ZERO);
        let covers = duration.min(remaining);
        if covers.is_zero() {
            return;
        }

        *self.active_sleep.lock().unwrap() = Some((Instant::now(), covers));
        std::thread::sleep(Duration::from_secs_f64(
            covers.as_secs_f64() / self.multiplier,
        ));
        *self.active_sleep.lock().unwrap() = None;

        // The clock only commits the full span once the sleep finished
        *self.slept.lock().unwrap() += covers;
    }

    fn is_simulated(&self) -> bool {
        true
    }
}

/// Install the process-wide time source. Only the first call takes effect.
pub fn init_time_source(source: Arc<dyn TimeSource>) {
    TIME_SOURCE.set(source).ok();
}

/// Whether a time source has been installed.
pub fn is_initialized() -> bool {
    TIME_SOURCE.get().is_some()
}

fn source() -> &'static Arc<dyn TimeSource> {
    TIME_SOURCE.get_or_init(|| Arc::new(RealTimeSource))
}

/// Current time from the process-wide source.
pub fn now() -> DateTime<Local> {
    source().now()
}

/// Current SystemTime from the process-wide source.
pub fn system_now() -> SystemTime {
    source().system_now()
}

/// Current time as milliseconds since the Unix epoch.
///
/// Fix capture timestamps use this so simulated runs produce coherent,
/// monotonically advancing timestamps.
pub fn now_millis() -> i64 {
    system_now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Sleep on the process-wide source.
pub fn sleep(duration: Duration) {
    source().sleep(duration)
}

/// Whether the process is running on a simulated clock.
pub fn is_simulated() -> bool {
    source().is_simulated()
}
