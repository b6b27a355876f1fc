use std::sync::Arc;

use odometr::acquisition::{AcquireTuning, AcquisitionPipeline};
use odometr::api::{RecordingTripApi, TripApi};
use odometr::geo::Fix;
use odometr::ledger::CoordinateLedger;
use odometr::prompt::RecordingPrompt;
use odometr::provider::scripted::{ScriptedOutcome, ScriptedProvider};
use odometr::session::{SessionError, SessionState, TripSession};
use odometr::store::{FileKvStore, KvStore};
use odometr::trip::{self, TripStatus};

const RIDER: &str = "rider-7";

/// Silence the session's console logging for the whole test binary
fn quiet_logs() {
    static QUIET: std::sync::Once = std::sync::Once::new();
    QUIET.call_once(|| odometr::logger::Log::set_enabled(false));
}

// Helper to build a session over a file-backed store, wired the way the
// daemon wires it. Each call over the same directory models one process.
fn build_session(
    dir: &std::path::Path,
    api: Arc<RecordingTripApi>,
    outcomes: Vec<ScriptedOutcome>,
) -> Arc<TripSession> {
    quiet_logs();
    let store = Arc::new(FileKvStore::open(dir.to_path_buf()).unwrap());
    let pipeline = Arc::new(AcquisitionPipeline::new(
        Arc::new(ScriptedProvider::new(outcomes)),
        Arc::new(RecordingPrompt::new()),
        AcquireTuning::default(),
    ));
    TripSession::new(
        pipeline,
        api as Arc<dyn TripApi>,
        store as Arc<dyn KvStore>,
        60,
    )
}

fn ledger_over(dir: &std::path::Path) -> CoordinateLedger {
    let store = Arc::new(FileKvStore::open(dir.to_path_buf()).unwrap());
    CoordinateLedger::new(store as Arc<dyn KvStore>)
}

fn equator_fix(lon: f64, t: i64) -> Fix {
    Fix::new(0.0, lon, t)
}

#[test]
fn test_full_lifecycle_start_ingest_end_submit() {
    let dir = tempfile::tempdir().unwrap();
    let api = Arc::new(RecordingTripApi::new());
    let session = build_session(
        dir.path(),
        Arc::clone(&api),
        vec![ScriptedOutcome::Fix(equator_fix(0.0, 1_000))],
    );

    let started = session.start(RIDER).unwrap();
    session.ingest(equator_fix(1.0, 2_000));
    session.ingest(equator_fix(2.0, 3_000));

    let summary = session.end().unwrap();
    assert_eq!(summary.trip_id, started.trip_id);
    assert_eq!(summary.rider_id, RIDER);
    assert_eq!(summary.fixes.len(), 3);
    // Two one-degree hops along the equator
    assert!((summary.total_distance_km - 222.39).abs() < 0.2);

    assert_eq!(api.submitted().len(), 1);
    assert_eq!(api.submitted()[0].trip_id, started.trip_id);

    // The submitted trip leaves nothing behind on disk
    let store = FileKvStore::open(dir.path().to_path_buf()).unwrap();
    assert!(trip::load_trip_record(&store, RIDER).unwrap().is_none());
    assert!(
        ledger_over(dir.path())
            .read_all(&summary.trip_id)
            .unwrap()
            .is_empty()
    );
}

#[test]
fn test_ledger_is_durable_while_the_trip_is_active() {
    let dir = tempfile::tempdir().unwrap();
    let api = Arc::new(RecordingTripApi::new());
    let session = build_session(
        dir.path(),
        api,
        vec![ScriptedOutcome::Fix(equator_fix(0.0, 1_000))],
    );

    let started = session.start(RIDER).unwrap();
    session.ingest(equator_fix(0.5, 2_000));
    session.ingest(equator_fix(1.0, 3_000));

    // A completely separate store handle sees every accepted fix, in order
    let fixes = ledger_over(dir.path()).read_all(&started.trip_id).unwrap();
    let timestamps: Vec<i64> = fixes.iter().map(|f| f.captured_at_epoch_millis).collect();
    assert_eq!(timestamps, vec![1_000, 2_000, 3_000]);

    // The on-disk record is marked active for the rider
    let store = FileKvStore::open(dir.path().to_path_buf()).unwrap();
    let record = trip::load_trip_record(&store, RIDER).unwrap().unwrap();
    assert_eq!(record.status, TripStatus::Active);
    assert_eq!(record.trip_id, started.trip_id);

    session.suspend();
}

#[test]
fn test_restart_resumes_the_trip_from_disk() {
    let dir = tempfile::tempdir().unwrap();

    // First process: record two fixes, then shut down without ending
    let api_one = Arc::new(RecordingTripApi::new());
    let first = build_session(
        dir.path(),
        api_one,
        vec![ScriptedOutcome::Fix(equator_fix(0.0, 1_000))],
    );
    first.start(RIDER).unwrap();
    first.ingest(equator_fix(1.0, 2_000));
    first.suspend();
    drop(first);

    // Second process over the same directory picks the trip back up
    let api_two = Arc::new(RecordingTripApi::new());
    let second = build_session(dir.path(), Arc::clone(&api_two), vec![]);
    let resumed = second.resume(RIDER).unwrap().unwrap();

    let status = second.status();
    assert_eq!(status.state, SessionState::Active);
    assert_eq!(status.fix_count, 2);
    assert!((resumed.total_distance_km - 111.19).abs() < 0.1);

    // Monotonic acceptance continues from the ledger head, not from zero
    second.ingest(equator_fix(1.5, 1_500));
    assert_eq!(second.status().fix_count, 2);
    second.ingest(equator_fix(2.0, 3_000));
    assert_eq!(second.status().fix_count, 3);

    let summary = second.end().unwrap();
    assert_eq!(summary.fixes.len(), 3);
    assert!((summary.total_distance_km - 222.39).abs() < 0.2);
    assert_eq!(api_two.submitted().len(), 1);
}

#[test]
fn test_failed_submission_survives_a_restart_and_retries() {
    let dir = tempfile::tempdir().unwrap();

    let api_one = Arc::new(RecordingTripApi::new());
    let first = build_session(
        dir.path(),
        Arc::clone(&api_one),
        vec![ScriptedOutcome::Fix(equator_fix(0.0, 1_000))],
    );
    let started = first.start(RIDER).unwrap();
    first.ingest(equator_fix(1.0, 2_000));

    api_one.fail_submissions(true);
    assert!(matches!(
        first.end().unwrap_err(),
        SessionError::Submit(_)
    ));
    assert_eq!(first.status().state, SessionState::Failed);
    drop(first);

    // The ended-but-unsubmitted record is still on disk
    let store = FileKvStore::open(dir.path().to_path_buf()).unwrap();
    let record = trip::load_trip_record(&store, RIDER).unwrap().unwrap();
    assert_eq!(record.status, TripStatus::Ended);
    assert_eq!(record.trip_id, started.trip_id);

    // A fresh process pushes it through once the API is reachable again
    let api_two = Arc::new(RecordingTripApi::new());
    let second = build_session(dir.path(), Arc::clone(&api_two), vec![]);
    let summary = second.retry_submit(RIDER).unwrap().unwrap();
    assert_eq!(summary.trip_id, started.trip_id);
    assert_eq!(summary.fixes.len(), 2);
    assert_eq!(api_two.submitted().len(), 1);

    assert!(trip::load_trip_record(&store, RIDER).unwrap().is_none());
    assert!(
        ledger_over(dir.path())
            .read_all(&started.trip_id)
            .unwrap()
            .is_empty()
    );
}

#[test]
fn test_pending_submission_blocks_a_new_trip_across_restarts() {
    let dir = tempfile::tempdir().unwrap();

    let api_one = Arc::new(RecordingTripApi::new());
    let first = build_session(
        dir.path(),
        Arc::clone(&api_one),
        vec![ScriptedOutcome::Fix(equator_fix(0.0, 1_000))],
    );
    first.start(RIDER).unwrap();
    api_one.fail_submissions(true);
    let _ = first.end();
    drop(first);

    // Starting again in a new process must not overwrite the pending trip
    let api_two = Arc::new(RecordingTripApi::new());
    let second = build_session(
        dir.path(),
        api_two,
        vec![ScriptedOutcome::Fix(equator_fix(0.0, 5_000))],
    );
    assert!(matches!(
        second.start(RIDER).unwrap_err(),
        SessionError::PendingSubmission(_)
    ));

    // And resume refuses it too, pointing at retry-submit instead
    assert!(second.resume(RIDER).unwrap().is_none());
    assert_eq!(second.status().state, SessionState::Idle);
}

#[test]
fn test_riders_do_not_share_trip_records() {
    let dir = tempfile::tempdir().unwrap();
    let api = Arc::new(RecordingTripApi::new());
    let session = build_session(
        dir.path(),
        api,
        vec![ScriptedOutcome::Fix(equator_fix(0.0, 1_000))],
    );
    session.start(RIDER).unwrap();

    let store = FileKvStore::open(dir.path().to_path_buf()).unwrap();
    assert!(trip::load_trip_record(&store, RIDER).unwrap().is_some());
    assert!(trip::load_trip_record(&store, "someone-else").unwrap().is_none());

    session.suspend();
}
