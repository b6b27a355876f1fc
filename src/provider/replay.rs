//! File-replay location provider.
//!
//! Replays a recorded fix log from disk, one fix per request or on a timer
//! for watches. This is the backend for the `simulate` command and the
//! fallback when no live provider is reachable. Replayed fixes are
//! restamped with the current (possibly simulated) clock so monotonic
//! acceptance in the session behaves exactly as it would live.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Context;

use crate::geo::Fix;
use crate::provider::{AcquireOptions, FixSink, LocationProvider, ProviderError, WatchHandle};

/// Provider that serves fixes from a recorded log.
pub struct ReplayProvider {
    fixes: Vec<Fix>,
    cursor: Mutex<usize>,
    interval: Duration,
}

impl ReplayProvider {
    /// Load a replay log: a JSON array of fixes.
    pub fn from_file(path: &Path, interval: Duration) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read replay log {}", path.display()))?;
        let fixes: Vec<Fix> = serde_json::from_str(&content)
            .with_context(|| format!("Replay log {} is not a JSON fix array", path.display()))?;
        if fixes.is_empty() {
            anyhow::bail!("Replay log {} contains no fixes", path.display());
        }
        Ok(Self::from_fixes(fixes, interval))
    }

    pub fn from_fixes(fixes: Vec<Fix>, interval: Duration) -> Self {
        Self {
            fixes,
            cursor: Mutex::new(0),
            interval,
        }
    }

    /// Number of fixes remaining in the log.
    pub fn remaining(&self) -> usize {
        self.fixes.len() - *self.cursor.lock().unwrap()
    }

    fn next_fix(&self) -> Option<Fix> {
        let mut cursor = self.cursor.lock().unwrap();
        let fix = self.fixes.get(*cursor)?.clone();
        *cursor += 1;
        Some(fix)
    }
}

impl LocationProvider for ReplayProvider {
    fn request_once(&self, _options: &AcquireOptions) -> Result<Fix, ProviderError> {
        match self.next_fix() {
            Some(mut fix) => {
                fix.captured_at_epoch_millis = crate::time_source::now_millis();
                Ok(fix)
            }
            // Log exhausted: the recorded route has ended
            None => Err(ProviderError::Unavailable),
        }
    }

    fn watch(&self, _options: &AcquireOptions, sink: FixSink) -> Result<WatchHandle, ProviderError> {
        // Snapshot the remainder of the log for the watch thread; one-shot
        // requests and the watch never hand out the same fix twice.
        let mut fixes = Vec::new();
        {
            let mut cursor = self.cursor.lock().unwrap();
            fixes.extend_from_slice(&self.fixes[*cursor..]);
            *cursor = self.fixes.len();
        }
        if fixes.is_empty() {
            return Err(ProviderError::Unavailable);
        }

        let interval = self.interval;
        let (mut handle, watch_sink) = WatchHandle::new_pair(sink, true);
        let thread = std::thread::spawn(move || {
            for mut fix in fixes {
                // Sleep in short slices so cancellation is picked up promptly
                let mut slept = Duration::ZERO;
                let slice = Duration::from_millis(crate::constants::SCHEDULER_SLEEP_SLICE_MS);
                while slept < interval {
                    if watch_sink.is_cancelled() {
                        return;
                    }
                    let step = slice.min(interval - slept);
                    crate::time_source::sleep(step);
                    slept += step;
                }

                fix.captured_at_epoch_millis = crate::time_source::now_millis();
                if !watch_sink.deliver(fix) {
                    return;
                }
            }
        });
        handle.attach(thread);
        Ok(handle)
    }

    fn provider_name(&self) -> &'static str {
        "Replay"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn log() -> Vec<Fix> {
        vec![
            Fix::new(0.0, 0.0, 1),
            Fix::new(0.0, 0.5, 2),
            Fix::new(0.0, 1.0, 3),
        ]
    }

    #[test]
    fn test_request_once_walks_the_log_in_order() {
        let provider = ReplayProvider::from_fixes(log(), Duration::from_millis(1));
        let opts = AcquireOptions::default();

        let a = provider.request_once(&opts).unwrap();
        let b = provider.request_once(&opts).unwrap();
        assert_eq!((a.latitude, a.longitude), (0.0, 0.0));
        assert_eq!((b.latitude, b.longitude), (0.0, 0.5));
        assert_eq!(provider.remaining(), 1);
    }

    #[test]
    fn test_exhausted_log_reports_unavailable() {
        let provider = ReplayProvider::from_fixes(vec![Fix::new(1.0, 1.0, 1)], Duration::ZERO);
        let opts = AcquireOptions::default();
        provider.request_once(&opts).unwrap();
        assert_eq!(
            provider.request_once(&opts).unwrap_err(),
            ProviderError::Unavailable
        );
    }

    #[test]
    fn test_watch_delivers_remaining_fixes() {
        let provider = ReplayProvider::from_fixes(log(), Duration::from_millis(1));
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink_received = Arc::clone(&received);

        let handle = provider
            .watch(
                &AcquireOptions::default(),
                Arc::new(move |fix| sink_received.lock().unwrap().push(fix)),
            )
            .unwrap();

        // Wait for the thread to finish the short log
        std::thread::sleep(Duration::from_millis(100));
        handle.cancel();
        assert_eq!(received.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_cancel_stops_delivery() {
        let provider = ReplayProvider::from_fixes(log(), Duration::from_secs(60));
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink_received = Arc::clone(&received);

        let handle = provider
            .watch(
                &AcquireOptions::default(),
                Arc::new(move |fix| sink_received.lock().unwrap().push(fix)),
            )
            .unwrap();

        handle.cancel();
        let count = received.lock().unwrap().len();
        std::thread::sleep(Duration::from_millis(50));
        // Nothing may arrive after cancel() has returned
        assert_eq!(received.lock().unwrap().len(), count);
    }
}
