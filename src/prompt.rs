//! Remediation prompt collaborator.
//!
//! When acquisition fails in a way the rider can fix (permissions revoked,
//! location services switched off), the engine fires a prompt and moves on.
//! It never blocks on, or retries because of, the rider's response.

/// Why the rider is being prompted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemediationReason {
    PermissionDenied,
    LocationServicesDisabled,
}

/// Fire-and-forget remediation side channel.
pub trait RemediationPrompt: Send + Sync {
    fn prompt(&self, reason: RemediationReason);
}

/// Default implementation: route the hint through the logger.
pub struct LogPrompt;

impl RemediationPrompt for LogPrompt {
    fn prompt(&self, reason: RemediationReason) {
        log_pipe!();
        match reason {
            RemediationReason::PermissionDenied => {
                log_warning!("Location permission denied");
                log_indented!("Grant location access to this user and restart tracking");
            }
            RemediationReason::LocationServicesDisabled => {
                log_warning!("Location services appear to be disabled");
                log_indented!("Enable location services (e.g. start GeoClue) and retry");
            }
        }
    }
}

/// Prompt recorder for tests.
#[cfg(any(test, feature = "testing-support"))]
pub struct RecordingPrompt {
    reasons: std::sync::Mutex<Vec<RemediationReason>>,
}

#[cfg(any(test, feature = "testing-support"))]
impl RecordingPrompt {
    pub fn new() -> Self {
        Self {
            reasons: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn recorded(&self) -> Vec<RemediationReason> {
        self.reasons.lock().unwrap().clone()
    }
}

#[cfg(any(test, feature = "testing-support"))]
impl Default for RecordingPrompt {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "testing-support"))]
impl RemediationPrompt for RecordingPrompt {
    fn prompt(&self, reason: RemediationReason) {
        self.reasons.lock().unwrap().push(reason);
    }
}
