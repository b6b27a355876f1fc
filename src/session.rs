//! Trip session state machine.
//!
//! One session owns the full life of a trip: initial acquisition, the
//! continuous watch, the background cadence, every ledger append, and the
//! final submission. All fix ingestion funnels through `ingest`, which is
//! the only place a coordinate can enter the ledger; that single serialized
//! entry point is what enforces monotonic timestamp acceptance.
//!
//! ## Lifecycle
//!
//! ```text
//! Idle -> Starting -> Active -> Ending -> Ended
//!                       ^                    |
//!                       |     (restart)      |
//!                       +---- resume() <-----+--> Failed (submission kept
//!                                                  on disk for retry)
//! ```
//!
//! A process restart lands directly back in Active via `resume`: the trip
//! record and ledger are the durable truth, the in-memory state is only a
//! mirror of them.

use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use chrono::{DateTime, Utc};

use crate::acquisition::{AcquireError, AcquireMode, AcquireTuning, AcquisitionPipeline};
use crate::api::{SubmitError, TripApi, TripSummary};
use crate::geo::{self, Fix};
use crate::ledger::CoordinateLedger;
use crate::provider::{FixSink, WatchHandle};
use crate::scheduler::SchedulerHandle;
use crate::store::KvStore;
use crate::trip::{self, Trip, TripStatus};

/// Where the session currently is in the trip lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Active,
    Ending,
    Ended,
    /// Trip ended but the summary could not be submitted; the ledger and
    /// trip record stay on disk until a retry succeeds
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Starting => write!(f, "starting"),
            SessionState::Active => write!(f, "active"),
            SessionState::Ending => write!(f, "ending"),
            SessionState::Ended => write!(f, "ended"),
            SessionState::Failed => write!(f, "failed"),
        }
    }
}

/// Failure surfaced by a session operation.
#[derive(Debug)]
pub enum SessionError {
    /// A trip is already running in this session
    AlreadyActive(String),
    /// An earlier trip is still awaiting submission; starting a new one
    /// would overwrite its record
    PendingSubmission(String),
    /// The requested transition needs an active trip and there is none
    NotActive,
    /// retry-submit was asked to push a trip that has not ended yet
    TripStillActive(String),
    Acquisition(AcquireError),
    Submit(SubmitError),
    Persistence(anyhow::Error),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::AlreadyActive(id) => write!(f, "trip {id} is already active"),
            SessionError::PendingSubmission(id) => {
                write!(f, "trip {id} is awaiting submission; run retry-submit first")
            }
            SessionError::NotActive => write!(f, "no active trip"),
            SessionError::TripStillActive(id) => {
                write!(f, "trip {id} is still active; end it before retrying submission")
            }
            SessionError::Acquisition(e) => write!(f, "could not acquire a fix: {e}"),
            SessionError::Submit(e) => write!(f, "{e}"),
            SessionError::Persistence(e) => write!(f, "trip persistence failure: {e}"),
        }
    }
}

impl std::error::Error for SessionError {}

/// Point-in-time view of the session for status reporting.
#[derive(Debug, Clone)]
pub struct SessionStatus {
    pub state: SessionState,
    pub trip: Option<Trip>,
    pub fix_count: usize,
    pub last_fix: Option<Fix>,
}

struct SessionInner {
    state: SessionState,
    trip: Option<Trip>,
    /// In-memory mirror of the ledger, in accepted order
    fixes: Vec<Fix>,
}

/// Fix producers owned by an active session.
///
/// Held in their own lock so `end` can stop them without holding the inner
/// state lock; their threads call back into `ingest`, which takes it.
#[derive(Default)]
struct Producers {
    watch: Option<WatchHandle>,
    scheduler: Option<SchedulerHandle>,
}

/// The trip session state machine.
pub struct TripSession {
    pipeline: Arc<AcquisitionPipeline>,
    api: Arc<dyn TripApi>,
    store: Arc<dyn KvStore>,
    ledger: CoordinateLedger,
    inner: Mutex<SessionInner>,
    producers: Mutex<Producers>,
    last_known: Arc<Mutex<Option<Fix>>>,
    foreground_interval_secs: Mutex<u64>,
}

impl TripSession {
    pub fn new(
        pipeline: Arc<AcquisitionPipeline>,
        api: Arc<dyn TripApi>,
        store: Arc<dyn KvStore>,
        foreground_interval_secs: u64,
    ) -> Arc<Self> {
        Arc::new(Self {
            pipeline,
            api,
            ledger: CoordinateLedger::new(Arc::clone(&store)),
            store,
            inner: Mutex::new(SessionInner {
                state: SessionState::Idle,
                trip: None,
                fixes: Vec::new(),
            }),
            producers: Mutex::new(Producers::default()),
            last_known: Arc::new(Mutex::new(None)),
            foreground_interval_secs: Mutex::new(foreground_interval_secs),
        })
    }

    /// Start a new trip for the rider.
    ///
    /// Acquires an initial foreground fix, registers the trip, persists the
    /// record, ledgers the first coordinate, and starts the fix producers.
    /// The session is only observable as Active once all of that held.
    pub fn start(self: &Arc<Self>, rider_id: &str) -> Result<Trip, SessionError> {
        self.begin_starting(rider_id)?;

        let cached = self.last_known.lock().unwrap().clone();
        let initial_fix = match self
            .pipeline
            .acquire(AcquireMode::Foreground, cached.as_ref())
        {
            Ok(fix) => fix,
            Err(e) => {
                self.abort_starting();
                return Err(SessionError::Acquisition(e));
            }
        };

        let trip_id = match self.api.start_trip(rider_id) {
            Ok(id) => id,
            Err(e) => {
                self.abort_starting();
                return Err(SessionError::Submit(e));
            }
        };

        let trip = Trip::new_active(trip_id, rider_id.to_string(), utc_now());
        if let Err(e) = trip::save_trip_record(self.store.as_ref(), &trip) {
            self.abort_starting();
            return Err(SessionError::Persistence(e));
        }

        {
            let mut inner = self.inner.lock().unwrap();
            inner.state = SessionState::Active;
            inner.trip = Some(trip.clone());
            inner.fixes.clear();
        }

        self.ingest(initial_fix);
        self.start_producers();

        log_block_start!("Trip {} started for {}", trip.trip_id, trip.rider_id);
        log_indented!("Provider: {}", self.pipeline.provider().provider_name());
        log_end!();

        Ok(trip)
    }

    /// Resume a persisted active trip after a process restart.
    ///
    /// Lands directly in Active: the ledger is replayed into memory, the
    /// running total recomputed from scratch, and the producers restarted.
    /// Returns `Ok(None)` when there is nothing to resume.
    pub fn resume(self: &Arc<Self>, rider_id: &str) -> Result<Option<Trip>, SessionError> {
        let record = trip::load_trip_record(self.store.as_ref(), rider_id)
            .map_err(SessionError::Persistence)?;
        let Some(mut trip) = record else {
            return Ok(None);
        };

        if trip.status == TripStatus::Ended {
            log_pipe!();
            log_warning!(
                "Trip {} ended but was never submitted; run retry-submit",
                trip.trip_id
            );
            return Ok(None);
        }

        let fixes = self
            .ledger
            .read_all(&trip.trip_id)
            .map_err(|e| SessionError::Persistence(anyhow::anyhow!(e)))?;
        trip.total_distance_km = geo::total_distance(&fixes);

        {
            let mut inner = self.inner.lock().unwrap();
            match inner.state {
                SessionState::Idle => {}
                _ => return Err(SessionError::AlreadyActive(trip.trip_id)),
            }
            inner.state = SessionState::Active;
            inner.trip = Some(trip.clone());
            *self.last_known.lock().unwrap() = fixes.last().cloned();
            inner.fixes = fixes;
        }

        self.start_producers();

        log_block_start!("Resumed trip {} for {}", trip.trip_id, trip.rider_id);
        log_indented!(
            "{} ledgered fixes, {:.2} km so far",
            self.inner.lock().unwrap().fixes.len(),
            trip.total_distance_km
        );
        log_end!();

        Ok(Some(trip))
    }

    /// Ingest one fix into the active trip.
    ///
    /// This is the single serialized entry point for coordinates. A fix is
    /// accepted only when the session is Active, its coordinates are valid,
    /// and its timestamp is not older than the last accepted one. Equal
    /// timestamps are accepted; a duplicate coordinate simply contributes
    /// zero distance. The fix is durably ledgered before the in-memory
    /// mirror and running total are updated.
    pub fn ingest(&self, fix: Fix) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state != SessionState::Active {
            return;
        }
        let Some(trip_id) = inner.trip.as_ref().map(|t| t.trip_id.clone()) else {
            return;
        };

        if !fix.has_valid_coordinates() {
            log_debug!(
                "Dropped fix with invalid coordinates ({}, {})",
                fix.latitude,
                fix.longitude
            );
            return;
        }

        if let Some(last) = inner.fixes.last()
            && fix.captured_at_epoch_millis < last.captured_at_epoch_millis
        {
            log_debug!(
                "Dropped out-of-order fix ({}ms behind the ledger head)",
                last.captured_at_epoch_millis - fix.captured_at_epoch_millis
            );
            return;
        }

        if let Err(e) = self.ledger.append(&trip_id, &fix) {
            // A fix that could not be made durable is not part of the trip
            log_pipe!();
            log_warning!("Fix dropped, ledger append failed: {}", e);
            return;
        }

        inner.fixes.push(fix.clone());
        let total = geo::total_distance(&inner.fixes);
        if let Some(trip) = inner.trip.as_mut() {
            trip.total_distance_km = total;
        }
        *self.last_known.lock().unwrap() = Some(fix);
    }

    /// End the active trip and submit its summary.
    ///
    /// Producers are stopped first; any fix still in flight when the state
    /// leaves Active is dropped by `ingest`. The summary is built from the
    /// ledger, not the in-memory mirror, so what is submitted is exactly
    /// what was made durable. On submission failure the session parks in
    /// Failed with the ledger and record preserved for retry-submit.
    pub fn end(&self) -> Result<TripSummary, SessionError> {
        {
            let mut inner = self.inner.lock().unwrap();
            match inner.state {
                SessionState::Active => inner.state = SessionState::Ending,
                _ => return Err(SessionError::NotActive),
            }
        }

        self.stop_producers();

        let mut inner = self.inner.lock().unwrap();
        let Some(mut trip) = inner.trip.clone() else {
            inner.state = SessionState::Idle;
            return Err(SessionError::NotActive);
        };

        let fixes = match self.ledger.read_all(&trip.trip_id) {
            Ok(fixes) => fixes,
            Err(e) => {
                inner.state = SessionState::Failed;
                return Err(SessionError::Persistence(anyhow::anyhow!(e)));
            }
        };

        trip.ended_at = Some(utc_now());
        trip.status = TripStatus::Ended;
        trip.total_distance_km = geo::total_distance(&fixes);

        // Persist the ended record before submitting so a crash between the
        // two leaves a retryable trip rather than a phantom active one
        if let Err(e) = trip::save_trip_record(self.store.as_ref(), &trip) {
            inner.state = SessionState::Failed;
            return Err(SessionError::Persistence(e));
        }

        let summary = TripSummary {
            trip_id: trip.trip_id.clone(),
            rider_id: trip.rider_id.clone(),
            started_at: trip.started_at,
            ended_at: trip.ended_at.unwrap_or_else(utc_now),
            total_distance_km: trip.total_distance_km,
            fixes,
        };

        match self.api.end_trip(&summary) {
            Ok(()) => {
                if let Err(e) = self.ledger.clear(&trip.trip_id) {
                    log_pipe!();
                    log_warning!("Could not clear submitted ledger: {}", e);
                }
                if let Err(e) = trip::remove_trip_record(self.store.as_ref(), &trip.rider_id) {
                    log_pipe!();
                    log_warning!("Could not remove submitted trip record: {}", e);
                }
                inner.state = SessionState::Ended;
                inner.trip = None;
                inner.fixes.clear();

                log_block_start!(
                    "Trip {} ended: {:.2} km over {} fixes",
                    summary.trip_id,
                    summary.total_distance_km,
                    summary.fixes.len()
                );
                log_end!();
                Ok(summary)
            }
            Err(e) => {
                inner.state = SessionState::Failed;
                inner.trip = Some(trip);
                log_pipe!();
                log_warning!("Trip submission failed, kept on disk for retry: {}", e);
                Err(SessionError::Submit(e))
            }
        }
    }

    /// Retry submission of an ended-but-unsubmitted trip.
    ///
    /// Works from disk so it also covers trips orphaned by a crash after
    /// `end` persisted the record but before submission succeeded. Returns
    /// `Ok(None)` when nothing is pending.
    pub fn retry_submit(&self, rider_id: &str) -> Result<Option<TripSummary>, SessionError> {
        let record = trip::load_trip_record(self.store.as_ref(), rider_id)
            .map_err(SessionError::Persistence)?;
        let Some(trip) = record else {
            return Ok(None);
        };
        if trip.status == TripStatus::Active {
            return Err(SessionError::TripStillActive(trip.trip_id));
        }

        let fixes = self
            .ledger
            .read_all(&trip.trip_id)
            .map_err(|e| SessionError::Persistence(anyhow::anyhow!(e)))?;

        let summary = TripSummary {
            trip_id: trip.trip_id.clone(),
            rider_id: trip.rider_id.clone(),
            started_at: trip.started_at,
            ended_at: trip.ended_at.unwrap_or_else(utc_now),
            total_distance_km: geo::total_distance(&fixes),
            fixes,
        };

        self.api.end_trip(&summary).map_err(SessionError::Submit)?;

        if let Err(e) = self.ledger.clear(&trip.trip_id) {
            log_pipe!();
            log_warning!("Could not clear submitted ledger: {}", e);
        }
        trip::remove_trip_record(self.store.as_ref(), rider_id)
            .map_err(SessionError::Persistence)?;

        let mut inner = self.inner.lock().unwrap();
        if inner.state == SessionState::Failed {
            inner.state = SessionState::Ended;
            inner.trip = None;
            inner.fixes.clear();
        }

        Ok(Some(summary))
    }

    /// Snapshot the session for status reporting.
    pub fn status(&self) -> SessionStatus {
        let inner = self.inner.lock().unwrap();
        SessionStatus {
            state: inner.state,
            trip: inner.trip.clone(),
            fix_count: inner.fixes.len(),
            last_fix: inner.fixes.last().cloned(),
        }
    }

    /// Apply reloaded configuration to the running producers.
    pub fn apply_reload(&self, foreground_interval_secs: u64, tuning: AcquireTuning) {
        self.pipeline.set_tuning(tuning);
        *self.foreground_interval_secs.lock().unwrap() = foreground_interval_secs;
        if let Some(scheduler) = self.producers.lock().unwrap().scheduler.as_ref() {
            scheduler.set_interval(foreground_interval_secs);
        }
    }

    /// Stop producers without ending the trip. Used on daemon shutdown;
    /// the persisted record keeps the trip resumable.
    pub fn suspend(&self) {
        self.stop_producers();
    }

    fn begin_starting(&self, rider_id: &str) -> Result<(), SessionError> {
        // The on-disk record is authoritative across processes; check it
        // before committing to Starting
        let record = trip::load_trip_record(self.store.as_ref(), rider_id)
            .map_err(SessionError::Persistence)?;
        if let Some(existing) = record {
            return Err(match existing.status {
                TripStatus::Active => SessionError::AlreadyActive(existing.trip_id),
                TripStatus::Ended => SessionError::PendingSubmission(existing.trip_id),
            });
        }

        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            SessionState::Idle | SessionState::Ended => {
                inner.state = SessionState::Starting;
                Ok(())
            }
            SessionState::Starting | SessionState::Active | SessionState::Ending => Err(
                SessionError::AlreadyActive(
                    inner
                        .trip
                        .as_ref()
                        .map(|t| t.trip_id.clone())
                        .unwrap_or_default(),
                ),
            ),
            SessionState::Failed => Err(SessionError::PendingSubmission(
                inner
                    .trip
                    .as_ref()
                    .map(|t| t.trip_id.clone())
                    .unwrap_or_default(),
            )),
        }
    }

    fn abort_starting(&self) {
        self.inner.lock().unwrap().state = SessionState::Idle;
    }

    fn start_producers(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let sink: FixSink = Arc::new(move |fix| {
            if let Some(session) = Weak::upgrade(&weak) {
                session.ingest(fix);
            }
        });

        let watch = match self
            .pipeline
            .provider()
            .watch(&self.pipeline.watch_options(), Arc::clone(&sink))
        {
            Ok(handle) => Some(handle),
            Err(e) => {
                log_pipe!();
                log_warning!(
                    "Continuous watch unavailable ({}); relying on background cadence",
                    e
                );
                None
            }
        };

        let scheduler = SchedulerHandle::start(
            Arc::clone(&self.pipeline),
            Arc::clone(&self.last_known),
            sink,
            *self.foreground_interval_secs.lock().unwrap(),
        );

        let mut producers = self.producers.lock().unwrap();
        producers.watch = watch;
        producers.scheduler = Some(scheduler);
    }

    /// Stop the watch and the scheduler. When this returns neither will
    /// deliver another fix.
    fn stop_producers(&self) {
        let (watch, scheduler) = {
            let mut producers = self.producers.lock().unwrap();
            (producers.watch.take(), producers.scheduler.take())
        };
        if let Some(watch) = watch {
            watch.cancel();
        }
        if let Some(scheduler) = scheduler {
            scheduler.stop();
        }
    }
}

fn utc_now() -> DateTime<Utc> {
    DateTime::<Utc>::from(crate::time_source::system_now())
}
