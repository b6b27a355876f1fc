//! Location provider abstraction layer.
//!
//! This module provides a unified interface for one-shot and continuous
//! location acquisition through the `LocationProvider` trait. It includes
//! automatic provider detection and supports GeoClue2 (system D-Bus) and
//! file-replay implementations.
//!
//! ## Supported Providers
//!
//! - **GeoClue Provider**: GeoClue2 over the system D-Bus
//! - **Replay Provider**: replays a recorded fix log from disk; also the
//!   backend for the `simulate` command
//! - **Scripted Provider** (testing-support): scripted outcomes for tests
//!
//! ## Provider Selection
//!
//! The provider can be selected automatically or explicitly:
//! - **Auto-detection**: GeoClue when the system bus is reachable
//! - **Explicit Configuration**: Set `provider = "geoclue"` or
//!   `provider = "replay"` in config
//!
//! ## Architecture
//!
//! Providers are thin, deterministic wrappers around their source. No retry
//! logic lives here; the acquisition pipeline owns retries, backoff, and
//! degradation. A provider reports exactly what happened once.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, mpsc};
use std::time::Duration;

use crate::config::{Config, ProviderChoice};
use crate::geo::Fix;

pub mod geoclue;
pub mod replay;
#[cfg(any(test, feature = "testing-support"))]
pub mod scripted;

/// Typed failure from a single provider interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderError {
    /// The location source is not available (service down, no bus, no data)
    Unavailable,
    /// The platform refused access
    PermissionDenied,
    /// No fix arrived within the requested timeout
    Timeout,
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Unavailable => write!(f, "location provider unavailable"),
            ProviderError::PermissionDenied => write!(f, "location permission denied"),
            ProviderError::Timeout => write!(f, "location request timed out"),
        }
    }
}

impl std::error::Error for ProviderError {}

/// Options for one acquisition or watch subscription.
#[derive(Debug, Clone)]
pub struct AcquireOptions {
    pub high_accuracy: bool,
    pub timeout: Duration,
    pub max_cache_age: Duration,
    pub min_distance_between_updates_meters: u32,
}

impl Default for AcquireOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout: Duration::from_millis(crate::constants::FOREGROUND_TIMEOUT_MS),
            max_cache_age: Duration::from_secs(
                crate::constants::FOREGROUND_MAX_CACHE_AGE_SECS as u64,
            ),
            min_distance_between_updates_meters: crate::constants::DEFAULT_MIN_DISTANCE_METERS,
        }
    }
}

/// Continuous fix delivery callback.
pub type FixSink = Arc<dyn Fn(Fix) + Send + Sync>;

/// Serialized delivery gate shared between a watch thread and its handle.
///
/// `deliver` refuses to invoke the sink once the watch is cancelled, and
/// `WatchHandle::cancel` waits out any in-flight delivery, which is what
/// makes the acknowledge-then-return contract hold: after `cancel()` returns
/// no further sink invocation is possible.
pub struct WatchSink {
    sink: FixSink,
    cancelled: Arc<AtomicBool>,
    gate: Arc<Mutex<()>>,
}

impl WatchSink {
    /// Deliver a fix unless the watch has been cancelled.
    ///
    /// Returns false once cancelled; the watch thread should exit.
    pub fn deliver(&self, fix: Fix) -> bool {
        let _guard = self.gate.lock().unwrap();
        if self.cancelled.load(Ordering::SeqCst) {
            return false;
        }
        (self.sink)(fix);
        true
    }

    /// Whether the watch has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Handle to a running continuous watch.
pub struct WatchHandle {
    cancelled: Arc<AtomicBool>,
    gate: Arc<Mutex<()>>,
    thread: Option<std::thread::JoinHandle<()>>,
    join_on_cancel: bool,
}

impl WatchHandle {
    /// Pair a new handle with its delivery-side sink.
    ///
    /// `join_on_cancel` should be true for providers whose watch thread
    /// notices cancellation promptly (timer loops); false for threads that
    /// may stay blocked on an external source, which are left to unwind on
    /// their own after delivery is gated off.
    pub fn new_pair(sink: FixSink, join_on_cancel: bool) -> (Self, WatchSink) {
        let cancelled = Arc::new(AtomicBool::new(false));
        let gate = Arc::new(Mutex::new(()));
        let handle = Self {
            cancelled: Arc::clone(&cancelled),
            gate: Arc::clone(&gate),
            thread: None,
            join_on_cancel,
        };
        let watch_sink = WatchSink {
            sink,
            cancelled,
            gate,
        };
        (handle, watch_sink)
    }

    /// Attach the watch thread after spawning it.
    pub fn attach(&mut self, thread: std::thread::JoinHandle<()>) {
        self.thread = Some(thread);
    }

    /// Cancel the watch. When this returns, no further fix will be delivered.
    pub fn cancel(mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
        // Wait out any delivery already past the cancellation check
        drop(self.gate.lock().unwrap());
        if self.join_on_cancel
            && let Some(thread) = self.thread.take()
        {
            let _ = thread.join();
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

/// Trait for location providers supplying one-shot fixes and watches.
///
/// Implementations must be deterministic wrappers: one call, one outcome,
/// no internal retries. An OS permission prompt triggered by a request is
/// surfaced as `PermissionDenied`, never silently retried.
pub trait LocationProvider: Send + Sync {
    /// Request a single fix within the options' timeout.
    fn request_once(&self, options: &AcquireOptions) -> Result<Fix, ProviderError>;

    /// Start a continuous watch delivering fixes to `sink`.
    fn watch(&self, options: &AcquireOptions, sink: FixSink) -> Result<WatchHandle, ProviderError>;

    /// Human-readable provider name for logs.
    fn provider_name(&self) -> &'static str;
}

/// Enum representing the selectable provider implementations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderKind {
    GeoClue,
    Replay,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::GeoClue => write!(f, "geoclue"),
            ProviderKind::Replay => write!(f, "replay"),
        }
    }
}

/// Detect the appropriate provider based on configuration and environment.
///
/// Explicit configuration wins. Auto-detection probes the system D-Bus for
/// GeoClue2 and errors with remediation hints when nothing is usable.
pub fn detect_provider(config: &Config) -> anyhow::Result<ProviderKind> {
    match config.provider {
        ProviderChoice::Geoclue => Ok(ProviderKind::GeoClue),
        ProviderChoice::Replay => {
            if config.replay_path.is_none() {
                anyhow::bail!(
                    "provider = \"replay\" requires replay_path to be set in odometr.toml"
                );
            }
            Ok(ProviderKind::Replay)
        }
        ProviderChoice::Auto => {
            if geoclue::is_available() {
                Ok(ProviderKind::GeoClue)
            } else if config.replay_path.is_some() {
                log_pipe!();
                log_warning!("GeoClue2 not reachable on the system bus; using replay provider");
                Ok(ProviderKind::Replay)
            } else {
                log_pipe!();
                log_error!("No usable location provider found");
                log_block_start!("To fix this, either:");
                log_indented!("• Install and start GeoClue2 (org.freedesktop.GeoClue2)");
                log_indented!("• Set provider = \"replay\" with a replay_path in odometr.toml");
                log_end!();
                anyhow::bail!("no usable location provider")
            }
        }
    }
}

/// Construct the provider for the detected kind.
pub fn create_provider(
    kind: ProviderKind,
    config: &Config,
) -> anyhow::Result<Box<dyn LocationProvider>> {
    match kind {
        ProviderKind::GeoClue => Ok(Box::new(geoclue::GeoClueProvider::new()?)),
        ProviderKind::Replay => {
            let path = config
                .replay_path
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("replay provider requires replay_path"))?;
            let interval = Duration::from_secs(config.foreground_interval_secs);
            Ok(Box::new(replay::ReplayProvider::from_file(path, interval)?))
        }
    }
}

/// Run a blocking provider interaction on a worker thread with a deadline.
///
/// zbus blocking signal iteration has no native timeout; this wraps any
/// closure in a channel + `recv_timeout` so `request_once` can honor the
/// options' timeout. The worker is left to unwind on its own after a
/// timeout; its result is discarded.
pub(crate) fn with_timeout<T: Send + 'static>(
    timeout: Duration,
    work: impl FnOnce() -> Result<T, ProviderError> + Send + 'static,
) -> Result<T, ProviderError> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let _ = tx.send(work());
    });
    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout),
    }
}
