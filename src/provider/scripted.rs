//! Scripted location provider for deterministic tests.
//!
//! Each `request_once` pops the next scripted outcome; the acquisition
//! pipeline tests drive exact retry and degradation sequences with it.

use std::sync::Mutex;
use std::time::Duration;

use crate::geo::Fix;
use crate::provider::{AcquireOptions, FixSink, LocationProvider, ProviderError, WatchHandle};

/// One scripted result for a `request_once` call.
#[derive(Debug, Clone)]
pub enum ScriptedOutcome {
    Fix(Fix),
    Fail(ProviderError),
}

/// Provider that serves a pre-programmed outcome queue.
pub struct ScriptedProvider {
    outcomes: Mutex<std::collections::VecDeque<ScriptedOutcome>>,
    requests_seen: Mutex<Vec<AcquireOptions>>,
}

impl ScriptedProvider {
    pub fn new(outcomes: Vec<ScriptedOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            requests_seen: Mutex::new(Vec::new()),
        }
    }

    /// Options observed per request, in call order.
    pub fn requests_seen(&self) -> Vec<AcquireOptions> {
        self.requests_seen.lock().unwrap().clone()
    }
}

impl LocationProvider for ScriptedProvider {
    fn request_once(&self, options: &AcquireOptions) -> Result<Fix, ProviderError> {
        self.requests_seen.lock().unwrap().push(options.clone());
        match self.outcomes.lock().unwrap().pop_front() {
            Some(ScriptedOutcome::Fix(fix)) => Ok(fix),
            Some(ScriptedOutcome::Fail(e)) => Err(e),
            // Script exhausted: treat like a dead provider
            None => Err(ProviderError::Unavailable),
        }
    }

    fn watch(&self, _options: &AcquireOptions, sink: FixSink) -> Result<WatchHandle, ProviderError> {
        // Drain all scripted fixes immediately; failures are skipped since
        // a live watch surfaces only successful updates.
        let fixes: Vec<Fix> = {
            let mut outcomes = self.outcomes.lock().unwrap();
            let drained: Vec<ScriptedOutcome> = outcomes.drain(..).collect();
            drained
                .into_iter()
                .filter_map(|o| match o {
                    ScriptedOutcome::Fix(fix) => Some(fix),
                    ScriptedOutcome::Fail(_) => None,
                })
                .collect()
        };

        let (mut handle, watch_sink) = WatchHandle::new_pair(sink, true);
        let thread = std::thread::spawn(move || {
            for fix in fixes {
                // Tiny pause keeps delivery ordered after the caller has
                // finished wiring up
                std::thread::sleep(Duration::from_millis(5));
                if !watch_sink.deliver(fix) {
                    return;
                }
            }
        });
        handle.attach(thread);
        Ok(handle)
    }

    fn provider_name(&self) -> &'static str {
        "Scripted"
    }
}
