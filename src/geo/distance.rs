//! Haversine distance between fixes and running totals over fix sequences.
//!
//! All distances are kilometers. Individual segment results are rounded to
//! 2 decimal places; totals sum unrounded segments and round once at the end
//! so per-segment rounding error does not accumulate over long trips.

use crate::constants::EARTH_RADIUS_KM;
use crate::geo::Fix;

/// Great-circle distance between two fixes, rounded to 2 decimal places.
///
/// Returns `None` when either fix carries non-finite or out-of-range
/// coordinates. Identical coordinates return exactly 0.0 without entering
/// the trig path, so duplicate samples never contribute float noise.
pub fn distance_between(a: &Fix, b: &Fix) -> Option<f64> {
    segment_km(a, b).map(round_2dp)
}

/// Total distance over consecutive fix pairs, rounded once at the end.
///
/// Segments with undefined distance (invalid coordinates on either end) are
/// skipped. Sequences shorter than two fixes total 0.0. Recomputing over the
/// same sequence, or over its reverse, always yields the same result.
pub fn total_distance(fixes: &[Fix]) -> f64 {
    let mut total = 0.0;
    for pair in fixes.windows(2) {
        if let Some(km) = segment_km(&pair[0], &pair[1]) {
            total += km;
        }
    }
    round_2dp(total)
}

/// Unrounded haversine segment, `None` for invalid coordinates.
fn segment_km(a: &Fix, b: &Fix) -> Option<f64> {
    if !a.has_valid_coordinates() || !b.has_valid_coordinates() {
        return None;
    }

    // Exact zero for identical coordinates, skipping the trig path
    if a.latitude == b.latitude && a.longitude == b.longitude {
        return Some(0.0);
    }

    let lat_a = a.latitude.to_radians();
    let lat_b = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().asin();

    Some(EARTH_RADIUS_KM * c)
}

fn round_2dp(km: f64) -> f64 {
    (km * 100.0).round() / 100.0
}
