//! One-shot fix acquisition with retry, backoff, and degradation.
//!
//! Background execution windows are short and unreliable, so the pipeline
//! degrades toward "good enough" answers instead of guaranteeing a fresh
//! fix: timeouts relax linearly per retry, accuracy drops after the first
//! retry, and a recent-enough cached fix short-circuits further retries.
//! The pipeline itself is stateless between calls; everything about one
//! acquisition lives in its attempt loop.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::constants::{
    BACKGROUND_MAX_CACHE_AGE_SECS, BACKGROUND_STALENESS_CEILING_SECS, BACKGROUND_TIMEOUT_MS,
    DEFAULT_MIN_DISTANCE_METERS, FOREGROUND_MAX_CACHE_AGE_SECS, FOREGROUND_STALENESS_CEILING_SECS,
    FOREGROUND_TIMEOUT_MS, RETRY_CEILING, RETRY_DELAY_MS, RETRY_TIMEOUT_INCREMENT_MS,
};
use crate::geo::Fix;
use crate::prompt::{RemediationPrompt, RemediationReason};
use crate::provider::{AcquireOptions, LocationProvider, ProviderError};

/// Acquisition context: who is asking and under which constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireMode {
    /// Interactive path: short timeout, high accuracy, small cache tolerance
    Foreground,
    /// Scheduled path: longer timeout, lower accuracy, large cache tolerance
    Background,
}

impl fmt::Display for AcquireMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcquireMode::Foreground => write!(f, "foreground"),
            AcquireMode::Background => write!(f, "background"),
        }
    }
}

/// Terminal acquisition outcome surfaced to the session layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireError {
    /// The platform refused access; never retried
    PermissionDenied,
    /// The location service itself is off; retrying is pointless
    LocationServicesDisabled,
    /// Retries exhausted with no usable cached fallback
    Exhausted,
}

impl fmt::Display for AcquireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcquireError::PermissionDenied => write!(f, "location permission denied"),
            AcquireError::LocationServicesDisabled => {
                write!(f, "location services are disabled")
            }
            AcquireError::Exhausted => write!(f, "location acquisition retries exhausted"),
        }
    }
}

impl std::error::Error for AcquireError {}

/// Reloadable acquisition tuning, sourced from configuration.
#[derive(Debug, Clone)]
pub struct AcquireTuning {
    pub foreground_timeout_ms: u64,
    pub background_timeout_ms: u64,
    pub min_distance_meters: u32,
}

impl Default for AcquireTuning {
    fn default() -> Self {
        Self {
            foreground_timeout_ms: FOREGROUND_TIMEOUT_MS,
            background_timeout_ms: BACKGROUND_TIMEOUT_MS,
            min_distance_meters: DEFAULT_MIN_DISTANCE_METERS,
        }
    }
}

/// Retry/backoff pipeline over a location provider.
pub struct AcquisitionPipeline {
    provider: Arc<dyn LocationProvider>,
    prompt: Arc<dyn RemediationPrompt>,
    tuning: Mutex<AcquireTuning>,
}

impl AcquisitionPipeline {
    pub fn new(
        provider: Arc<dyn LocationProvider>,
        prompt: Arc<dyn RemediationPrompt>,
        tuning: AcquireTuning,
    ) -> Self {
        Self {
            provider,
            prompt,
            tuning: Mutex::new(tuning),
        }
    }

    /// Replace tuning after a config reload. Takes effect on the next call.
    pub fn set_tuning(&self, tuning: AcquireTuning) {
        *self.tuning.lock().unwrap() = tuning;
    }

    /// The provider this pipeline wraps.
    pub fn provider(&self) -> &Arc<dyn LocationProvider> {
        &self.provider
    }

    /// Watch options matching the current foreground tuning.
    pub fn watch_options(&self) -> AcquireOptions {
        self.options_for(AcquireMode::Foreground, 0)
    }

    /// Acquire one fix, retrying with degradation per the mode profile.
    ///
    /// `last_known_fix` is consulted as a fallback on transient failures:
    /// if it is younger than the mode's staleness ceiling it is returned
    /// instead of burning further retries.
    pub fn acquire(
        &self,
        mode: AcquireMode,
        last_known_fix: Option<&Fix>,
    ) -> Result<Fix, AcquireError> {
        for attempt in 0..=RETRY_CEILING {
            let options = self.options_for(mode, attempt);
            match self.provider.request_once(&options) {
                Ok(fix) => {
                    if attempt > 0 {
                        log_indented!("Fix acquired on retry {attempt}");
                    }
                    return Ok(fix);
                }
                Err(ProviderError::PermissionDenied) => {
                    self.prompt.prompt(RemediationReason::PermissionDenied);
                    return Err(AcquireError::PermissionDenied);
                }
                Err(ProviderError::Unavailable) if attempt == 0 => {
                    // Dead on the very first try means the service is off,
                    // not transient GPS noise
                    self.prompt
                        .prompt(RemediationReason::LocationServicesDisabled);
                    return Err(AcquireError::LocationServicesDisabled);
                }
                Err(ProviderError::Unavailable) | Err(ProviderError::Timeout) => {
                    if let Some(cached) = last_known_fix
                        && Self::fresh_enough(cached, mode)
                    {
                        log_indented!(
                            "Using cached fix ({}s old) after {} failure",
                            cached.age_seconds(crate::time_source::now_millis()),
                            mode
                        );
                        return Ok(cached.clone());
                    }
                    if attempt < RETRY_CEILING {
                        crate::time_source::sleep(Duration::from_millis(RETRY_DELAY_MS));
                    }
                }
            }
        }
        Err(AcquireError::Exhausted)
    }

    /// Build provider options for the given attempt number.
    ///
    /// Attempt 0 is the mode's base profile. Each retry relaxes timeout and
    /// cache tolerance upward; accuracy is lowered after the first retry.
    fn options_for(&self, mode: AcquireMode, attempt: u32) -> AcquireOptions {
        let tuning = self.tuning.lock().unwrap().clone();
        let (base_timeout_ms, base_cache_age_secs, base_high_accuracy) = match mode {
            AcquireMode::Foreground => (
                tuning.foreground_timeout_ms,
                FOREGROUND_MAX_CACHE_AGE_SECS,
                true,
            ),
            AcquireMode::Background => (
                tuning.background_timeout_ms,
                BACKGROUND_MAX_CACHE_AGE_SECS,
                false,
            ),
        };

        AcquireOptions {
            high_accuracy: base_high_accuracy && attempt < 2,
            timeout: Duration::from_millis(
                base_timeout_ms + u64::from(attempt) * RETRY_TIMEOUT_INCREMENT_MS,
            ),
            max_cache_age: Duration::from_secs(
                base_cache_age_secs as u64 * u64::from(attempt + 1),
            ),
            min_distance_between_updates_meters: tuning.min_distance_meters,
        }
    }

    fn fresh_enough(cached: &Fix, mode: AcquireMode) -> bool {
        let ceiling = match mode {
            AcquireMode::Foreground => FOREGROUND_STALENESS_CEILING_SECS,
            AcquireMode::Background => BACKGROUND_STALENESS_CEILING_SECS,
        };
        cached.age_seconds(crate::time_source::now_millis()) < ceiling
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::RecordingPrompt;
    use crate::provider::scripted::{ScriptedOutcome, ScriptedProvider};

    struct Rig {
        pipeline: AcquisitionPipeline,
        provider: Arc<ScriptedProvider>,
        prompt: Arc<RecordingPrompt>,
    }

    fn rig(outcomes: Vec<ScriptedOutcome>) -> Rig {
        let provider = Arc::new(ScriptedProvider::new(outcomes));
        let prompt = Arc::new(RecordingPrompt::new());
        let pipeline = AcquisitionPipeline::new(
            Arc::clone(&provider) as Arc<dyn LocationProvider>,
            Arc::clone(&prompt) as _,
            AcquireTuning::default(),
        );
        Rig {
            pipeline,
            provider,
            prompt,
        }
    }

    fn fresh_fix() -> Fix {
        Fix::new(10.0, 20.0, crate::time_source::now_millis())
    }

    #[test]
    fn test_first_attempt_success_needs_no_retry() {
        let r = rig(vec![ScriptedOutcome::Fix(fresh_fix())]);
        let fix = r.pipeline.acquire(AcquireMode::Foreground, None).unwrap();
        assert_eq!(fix.latitude, 10.0);
        assert_eq!(r.provider.requests_seen().len(), 1);
        assert!(r.prompt.recorded().is_empty());
    }

    #[test]
    fn test_permission_denied_fails_fast_and_prompts() {
        let r = rig(vec![
            ScriptedOutcome::Fail(ProviderError::PermissionDenied),
            ScriptedOutcome::Fix(fresh_fix()),
        ]);
        let err = r
            .pipeline
            .acquire(AcquireMode::Foreground, None)
            .unwrap_err();
        assert_eq!(err, AcquireError::PermissionDenied);
        // Exactly one provider call, never retried
        assert_eq!(r.provider.requests_seen().len(), 1);
        assert_eq!(r.prompt.recorded(), vec![RemediationReason::PermissionDenied]);
    }

    #[test]
    fn test_unavailable_on_first_attempt_is_services_disabled() {
        let r = rig(vec![
            ScriptedOutcome::Fail(ProviderError::Unavailable),
            ScriptedOutcome::Fix(fresh_fix()),
        ]);
        let err = r
            .pipeline
            .acquire(AcquireMode::Background, None)
            .unwrap_err();
        assert_eq!(err, AcquireError::LocationServicesDisabled);
        assert_eq!(r.provider.requests_seen().len(), 1);
        assert_eq!(
            r.prompt.recorded(),
            vec![RemediationReason::LocationServicesDisabled]
        );
    }

    #[test]
    fn test_timeout_retries_then_succeeds() {
        let r = rig(vec![
            ScriptedOutcome::Fail(ProviderError::Timeout),
            ScriptedOutcome::Fix(fresh_fix()),
        ]);
        let fix = r.pipeline.acquire(AcquireMode::Foreground, None).unwrap();
        assert_eq!(fix.latitude, 10.0);

        let requests = r.provider.requests_seen();
        assert_eq!(requests.len(), 2);
        // Linear backoff: the retry's timeout grew by the fixed increment
        assert_eq!(
            requests[1].timeout - requests[0].timeout,
            Duration::from_millis(RETRY_TIMEOUT_INCREMENT_MS)
        );
    }

    #[test]
    fn test_accuracy_downgrades_after_first_retry() {
        let r = rig(vec![
            ScriptedOutcome::Fail(ProviderError::Timeout),
            ScriptedOutcome::Fail(ProviderError::Timeout),
            ScriptedOutcome::Fix(fresh_fix()),
        ]);
        r.pipeline.acquire(AcquireMode::Foreground, None).unwrap();

        let requests = r.provider.requests_seen();
        assert_eq!(requests.len(), 3);
        assert!(requests[0].high_accuracy);
        assert!(requests[1].high_accuracy);
        // Third attempt (second retry) runs at lowered accuracy
        assert!(!requests[2].high_accuracy);
    }

    #[test]
    fn test_background_timeout_short_circuits_to_fresh_cache() {
        let r = rig(vec![
            ScriptedOutcome::Fail(ProviderError::Timeout),
            ScriptedOutcome::Fix(fresh_fix()),
        ]);
        // Cached fix is 5 minutes old, under the 10 minute background ceiling
        let cached = Fix::new(1.0, 2.0, crate::time_source::now_millis() - 300_000);

        let fix = r
            .pipeline
            .acquire(AcquireMode::Background, Some(&cached))
            .unwrap();
        assert_eq!((fix.latitude, fix.longitude), (1.0, 2.0));
        // Short-circuited after the first timeout
        assert_eq!(r.provider.requests_seen().len(), 1);
    }

    #[test]
    fn test_stale_cache_is_ignored_and_retries_exhaust() {
        let r = rig(vec![
            ScriptedOutcome::Fail(ProviderError::Timeout),
            ScriptedOutcome::Fail(ProviderError::Timeout),
            ScriptedOutcome::Fail(ProviderError::Timeout),
            ScriptedOutcome::Fail(ProviderError::Timeout),
        ]);
        // 20 minutes old: past the background staleness ceiling
        let stale = Fix::new(1.0, 2.0, crate::time_source::now_millis() - 1_200_000);

        let err = r
            .pipeline
            .acquire(AcquireMode::Background, Some(&stale))
            .unwrap_err();
        assert_eq!(err, AcquireError::Exhausted);
        // Initial attempt plus the full retry ceiling
        assert_eq!(
            r.provider.requests_seen().len(),
            (RETRY_CEILING + 1) as usize
        );
    }

    #[test]
    fn test_unavailable_after_first_attempt_is_transient() {
        let r = rig(vec![
            ScriptedOutcome::Fail(ProviderError::Timeout),
            ScriptedOutcome::Fail(ProviderError::Unavailable),
            ScriptedOutcome::Fix(fresh_fix()),
        ]);
        let fix = r.pipeline.acquire(AcquireMode::Foreground, None).unwrap();
        assert_eq!(fix.latitude, 10.0);
        assert!(r.prompt.recorded().is_empty());
    }

    #[test]
    fn test_reloaded_tuning_applies_to_next_acquisition() {
        let r = rig(vec![ScriptedOutcome::Fix(fresh_fix())]);
        r.pipeline.set_tuning(AcquireTuning {
            foreground_timeout_ms: 3_000,
            ..AcquireTuning::default()
        });
        r.pipeline.acquire(AcquireMode::Foreground, None).unwrap();
        let requests = r.provider.requests_seen();
        assert_eq!(requests[0].timeout, Duration::from_millis(3_000));
    }
}
