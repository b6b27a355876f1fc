//! Location fixes and great-circle distance aggregation.
//!
//! This module owns the `Fix` data type shared across the whole engine and the
//! pure distance math that turns an ordered fix sequence into a trip total.
//!
//! ## Module Structure
//!
//! - [`distance`]: haversine segment distance and running-total computation
//!
//! Coordinate validity is checked here rather than at every call site: a fix
//! with non-finite or out-of-range coordinates is carried through the system
//! but contributes an undefined (skipped) segment to distance totals.

pub mod distance;

// Re-exports for public API
pub use distance::{distance_between, total_distance};


use serde::{Deserialize, Serialize};

/// One location sample as delivered by a provider.
///
/// `captured_at_epoch_millis` orders fixes within a trip's ledger; the session
/// state machine rejects fixes older than the last ledgered one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy_meters: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude_meters: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed_meters_per_second: Option<f64>,
    pub captured_at_epoch_millis: i64,
}

impl Fix {
    /// Create a bare fix from coordinates and a capture timestamp.
    pub fn new(latitude: f64, longitude: f64, captured_at_epoch_millis: i64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy_meters: None,
            altitude_meters: None,
            speed_meters_per_second: None,
            captured_at_epoch_millis,
        }
    }

    /// Whether both coordinates are finite and within geographic range.
    ///
    /// Latitude must lie in [-90, 90] and longitude in [-180, 180].
    pub fn has_valid_coordinates(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Age of this fix relative to `now_millis`, in seconds.
    ///
    /// A fix with a future timestamp reports age 0.
    pub fn age_seconds(&self, now_millis: i64) -> i64 {
        ((now_millis - self.captured_at_epoch_millis) / 1000).max(0)
    }
}
