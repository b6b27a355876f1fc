//! Trip API collaborator contract.
//!
//! The engine never owns a wire format; it talks to the remote trip ledger
//! through this trait. The binary wires in a spool-backed implementation
//! that records summaries durably for a separate uploader, and tests use
//! the recording fake or mockall mocks.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::Fix;
use crate::trip::Trip;

/// End-of-trip submission payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripSummary {
    pub trip_id: String,
    pub rider_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub total_distance_km: f64,
    pub fixes: Vec<Fix>,
}

/// Failure submitting a trip or reaching the trip ledger.
#[derive(Debug)]
pub struct SubmitError {
    message: String,
}

impl SubmitError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "trip submission failed: {}", self.message)
    }
}

impl std::error::Error for SubmitError {}

/// Remote trip-ledger operations the engine depends on.
#[cfg_attr(test, mockall::automock)]
pub trait TripApi: Send + Sync {
    /// Create a new trip for the rider, returning its id.
    fn start_trip(&self, rider_id: &str) -> Result<String, SubmitError>;

    /// Submit the finished trip summary.
    fn end_trip(&self, summary: &TripSummary) -> Result<(), SubmitError>;

    /// Look up a still-active trip for the rider, if the remote knows one.
    fn get_active_trip(&self, rider_id: &str) -> Result<Option<Trip>, SubmitError>;
}

/// Spool-backed production implementation.
///
/// Started trips get locally generated ids; finished summaries are written
/// durably to a spool directory for an out-of-band uploader. This keeps the
/// engine free of any concrete HTTP transport while still exercising the
/// full submission path.
pub struct SpoolTripApi {
    spool_dir: std::path::PathBuf,
}

impl SpoolTripApi {
    pub fn open_default() -> anyhow::Result<Self> {
        let dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?
            .join("odometr")
            .join("outbox");
        Self::open(dir)
    }

    pub fn open(spool_dir: std::path::PathBuf) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&spool_dir)?;
        Ok(Self { spool_dir })
    }
}

impl TripApi for SpoolTripApi {
    fn start_trip(&self, rider_id: &str) -> Result<String, SubmitError> {
        // Millisecond timestamp plus pid keeps ids unique per rider without
        // pulling in a uuid dependency.
        let id = format!(
            "{}-{}-{}",
            rider_id,
            crate::time_source::now_millis(),
            std::process::id()
        );
        Ok(id)
    }

    fn end_trip(&self, summary: &TripSummary) -> Result<(), SubmitError> {
        let blob = serde_json::to_string_pretty(summary)
            .map_err(|e| SubmitError::new(format!("could not encode summary: {e}")))?;
        let path = self.spool_dir.join(format!("{}.json", summary.trip_id));

        let write = || -> std::io::Result<()> {
            use std::io::Write;
            let mut tmp = tempfile::NamedTempFile::new_in(&self.spool_dir)?;
            tmp.write_all(blob.as_bytes())?;
            tmp.as_file().sync_all()?;
            tmp.persist(&path).map_err(|e| e.error)?;
            Ok(())
        };
        write().map_err(|e| SubmitError::new(format!("could not spool summary: {e}")))
    }

    fn get_active_trip(&self, _rider_id: &str) -> Result<Option<Trip>, SubmitError> {
        // The spool has no notion of server-side active trips; resume relies
        // on the locally persisted trip record instead.
        Ok(None)
    }
}

/// In-memory fake that records every call, for integration tests.
#[cfg(any(test, feature = "testing-support"))]
pub struct RecordingTripApi {
    next_id: std::sync::atomic::AtomicU64,
    submitted: std::sync::Mutex<Vec<TripSummary>>,
    active: std::sync::Mutex<Option<Trip>>,
    fail_submissions: std::sync::atomic::AtomicBool,
    fail_starts: std::sync::atomic::AtomicBool,
}

#[cfg(any(test, feature = "testing-support"))]
impl RecordingTripApi {
    pub fn new() -> Self {
        Self {
            next_id: std::sync::atomic::AtomicU64::new(1),
            submitted: std::sync::Mutex::new(Vec::new()),
            active: std::sync::Mutex::new(None),
            fail_submissions: std::sync::atomic::AtomicBool::new(false),
            fail_starts: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Make subsequent `end_trip` calls fail.
    pub fn fail_submissions(&self, fail: bool) {
        self.fail_submissions
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    /// Make subsequent `start_trip` calls fail.
    pub fn fail_starts(&self, fail: bool) {
        self.fail_starts
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    /// Pre-seed a server-side active trip for the resume path.
    pub fn set_active_trip(&self, trip: Option<Trip>) {
        *self.active.lock().unwrap() = trip;
    }

    /// Summaries received so far, in submission order.
    pub fn submitted(&self) -> Vec<TripSummary> {
        self.submitted.lock().unwrap().clone()
    }
}

#[cfg(any(test, feature = "testing-support"))]
impl Default for RecordingTripApi {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "testing-support"))]
impl TripApi for RecordingTripApi {
    fn start_trip(&self, rider_id: &str) -> Result<String, SubmitError> {
        if self.fail_starts.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(SubmitError::new("trip ledger unreachable"));
        }
        let n = self
            .next_id
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(format!("{rider_id}-trip-{n}"))
    }

    fn end_trip(&self, summary: &TripSummary) -> Result<(), SubmitError> {
        if self
            .fail_submissions
            .load(std::sync::atomic::Ordering::SeqCst)
        {
            return Err(SubmitError::new("trip ledger unreachable"));
        }
        self.submitted.lock().unwrap().push(summary.clone());
        Ok(())
    }

    fn get_active_trip(&self, rider_id: &str) -> Result<Option<Trip>, SubmitError> {
        let active = self.active.lock().unwrap();
        Ok(active
            .as_ref()
            .filter(|t| t.rider_id == rider_id)
            .cloned())
    }
}
