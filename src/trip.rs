//! Trip records and their persistence keys.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::KvStore;

/// Lifecycle status of a persisted trip record.
///
/// Only Active and Ended are ever persisted; the in-flight session states
/// (Starting, Ending, Failed) live in the state machine, not on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TripStatus {
    Active,
    Ended,
}

/// One tracked delivery session from start to end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    pub trip_id: String,
    pub rider_id: String,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    pub status: TripStatus,
    pub total_distance_km: f64,
}

impl Trip {
    pub fn new_active(trip_id: String, rider_id: String, started_at: DateTime<Utc>) -> Self {
        Self {
            trip_id,
            rider_id,
            started_at,
            ended_at: None,
            status: TripStatus::Active,
            total_distance_km: 0.0,
        }
    }
}

/// Store key for the current trip record of a rider.
pub fn trip_record_key(rider_id: &str) -> String {
    format!("trip.{rider_id}")
}

/// Load the persisted trip record for a rider, if any.
pub fn load_trip_record(store: &dyn KvStore, rider_id: &str) -> anyhow::Result<Option<Trip>> {
    match store.get(&trip_record_key(rider_id))? {
        Some(blob) => {
            let trip: Trip = serde_json::from_str(&blob)
                .map_err(|e| anyhow::anyhow!("Corrupt trip record for rider {rider_id}: {e}"))?;
            Ok(Some(trip))
        }
        None => Ok(None),
    }
}

/// Persist the trip record for its rider.
pub fn save_trip_record(store: &dyn KvStore, trip: &Trip) -> anyhow::Result<()> {
    let blob = serde_json::to_string(trip)?;
    store.set(&trip_record_key(&trip.rider_id), &blob)
}

/// Remove the persisted trip record for a rider.
pub fn remove_trip_record(store: &dyn KvStore, rider_id: &str) -> anyhow::Result<()> {
    store.remove(&trip_record_key(rider_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryKvStore;

    #[test]
    fn test_trip_record_round_trip() {
        let store = MemoryKvStore::new();
        let trip = Trip::new_active("t-1".into(), "rider-9".into(), Utc::now());

        assert!(load_trip_record(&store, "rider-9").unwrap().is_none());
        save_trip_record(&store, &trip).unwrap();
        let loaded = load_trip_record(&store, "rider-9").unwrap().unwrap();
        assert_eq!(loaded, trip);

        remove_trip_record(&store, "rider-9").unwrap();
        assert!(load_trip_record(&store, "rider-9").unwrap().is_none());
    }

    #[test]
    fn test_corrupt_trip_record_is_an_error_not_none() {
        let store = MemoryKvStore::new();
        store.set(&trip_record_key("r"), "not json").unwrap();
        assert!(load_trip_record(&store, "r").is_err());
    }
}
