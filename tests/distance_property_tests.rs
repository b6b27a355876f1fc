use odometr::geo::{Fix, distance_between, total_distance};
use proptest::prelude::*;

/// Generate valid latitude values
fn latitude_strategy() -> impl Strategy<Value = f64> {
    -90.0..=90.0
}

/// Generate valid longitude values
fn longitude_strategy() -> impl Strategy<Value = f64> {
    -180.0..=180.0
}

/// Generate a fix with valid coordinates and a plausible capture timestamp
fn valid_fix_strategy() -> impl Strategy<Value = Fix> {
    (
        latitude_strategy(),
        longitude_strategy(),
        0i64..2_000_000_000_000i64,
    )
        .prop_map(|(lat, lon, t)| Fix::new(lat, lon, t))
}

/// Generate latitudes that are out of range or non-finite
fn invalid_latitude_strategy() -> impl Strategy<Value = f64> {
    prop_oneof![
        90.001..10_000.0,
        -10_000.0..-90.001,
        Just(f64::NAN),
        Just(f64::INFINITY),
        Just(f64::NEG_INFINITY),
    ]
}

/// Generate longitudes that are out of range or non-finite
fn invalid_longitude_strategy() -> impl Strategy<Value = f64> {
    prop_oneof![
        180.001..10_000.0,
        -10_000.0..-180.001,
        Just(f64::NAN),
        Just(f64::INFINITY),
    ]
}

/// Property tests for the pairwise haversine distance
#[cfg(test)]
mod segment_distance_tests {
    use super::*;

    // Half the Earth's circumference: no two points can be further apart
    const MAX_POSSIBLE_KM: f64 = 20_016.0;

    proptest! {
        /// Distance is defined, non-negative, and bounded for any pair of
        /// valid fixes
        #[test]
        fn test_distance_is_bounded_for_valid_fixes(
            a in valid_fix_strategy(),
            b in valid_fix_strategy()
        ) {
            let d = distance_between(&a, &b);
            prop_assert!(d.is_some(), "valid coordinates must yield a distance");
            let d = d.unwrap();
            prop_assert!(d >= 0.0, "distance must be non-negative, got {d}");
            prop_assert!(d <= MAX_POSSIBLE_KM,
                "distance {d} exceeds half the Earth's circumference");
        }

        /// Distance does not depend on argument order
        #[test]
        fn test_distance_is_symmetric(
            a in valid_fix_strategy(),
            b in valid_fix_strategy()
        ) {
            let ab = distance_between(&a, &b).unwrap();
            let ba = distance_between(&b, &a).unwrap();
            prop_assert!((ab - ba).abs() < 1e-9,
                "asymmetric distance: {ab} vs {ba}");
        }

        /// A fix is at distance exactly zero from itself, regardless of its
        /// timestamp or optional fields
        #[test]
        fn test_distance_to_self_is_exactly_zero(
            fix in valid_fix_strategy(),
            later_t in 0i64..2_000_000_000_000i64
        ) {
            let mut same_place = fix.clone();
            same_place.captured_at_epoch_millis = later_t;

            prop_assert_eq!(distance_between(&fix, &fix), Some(0.0));
            prop_assert_eq!(distance_between(&fix, &same_place), Some(0.0));
        }

        /// Results carry at most two decimal places
        #[test]
        fn test_distance_is_rounded_to_two_decimals(
            a in valid_fix_strategy(),
            b in valid_fix_strategy()
        ) {
            let d = distance_between(&a, &b).unwrap();
            let scaled = d * 100.0;
            prop_assert!((scaled - scaled.round()).abs() < 1e-6,
                "distance {d} is not rounded to 2 decimal places");
        }

        /// An invalid latitude on either end makes the distance undefined
        #[test]
        fn test_invalid_latitude_yields_no_distance(
            bad_lat in invalid_latitude_strategy(),
            lon in longitude_strategy(),
            other in valid_fix_strategy()
        ) {
            let bad = Fix::new(bad_lat, lon, 0);
            prop_assert_eq!(distance_between(&bad, &other), None);
            prop_assert_eq!(distance_between(&other, &bad), None);
        }

        /// An invalid longitude on either end makes the distance undefined
        #[test]
        fn test_invalid_longitude_yields_no_distance(
            lat in latitude_strategy(),
            bad_lon in invalid_longitude_strategy(),
            other in valid_fix_strategy()
        ) {
            let bad = Fix::new(lat, bad_lon, 0);
            prop_assert_eq!(distance_between(&bad, &other), None);
            prop_assert_eq!(distance_between(&other, &bad), None);
        }
    }
}

/// Property tests for the running trip total
#[cfg(test)]
mod total_distance_tests {
    use super::*;

    fn route_strategy() -> impl Strategy<Value = Vec<Fix>> {
        prop::collection::vec(valid_fix_strategy(), 0..12)
    }

    proptest! {
        /// Totals are non-negative and zero for fewer than two fixes
        #[test]
        fn test_total_is_non_negative(route in route_strategy()) {
            let total = total_distance(&route);
            prop_assert!(total >= 0.0);
            if route.len() < 2 {
                prop_assert_eq!(total, 0.0);
            }
        }

        /// Walking the route backwards covers the same distance
        #[test]
        fn test_total_is_reversal_invariant(route in route_strategy()) {
            let forward = total_distance(&route);
            let mut reversed = route.clone();
            reversed.reverse();
            let backward = total_distance(&reversed);
            prop_assert!((forward - backward).abs() < 0.011,
                "reversal changed the total: {forward} vs {backward}");
        }

        /// Appending a fix never shrinks the total
        #[test]
        fn test_total_grows_monotonically(
            route in route_strategy(),
            extra in valid_fix_strategy()
        ) {
            let before = total_distance(&route);
            let mut extended = route.clone();
            extended.push(extra);
            prop_assert!(total_distance(&extended) >= before);
        }

        /// A single-segment total agrees exactly with the pairwise distance
        #[test]
        fn test_single_segment_total_matches_pairwise(
            a in valid_fix_strategy(),
            b in valid_fix_strategy()
        ) {
            let total = total_distance(&[a.clone(), b.clone()]);
            prop_assert_eq!(Some(total), distance_between(&a, &b));
        }

        /// A duplicated fix contributes nothing to the total
        #[test]
        fn test_duplicate_fix_adds_zero(
            a in valid_fix_strategy(),
            b in valid_fix_strategy()
        ) {
            let plain = total_distance(&[a.clone(), b.clone()]);
            let doubled = total_distance(&[a.clone(), a.clone(), b.clone()]);
            prop_assert!((plain - doubled).abs() < 1e-9);
        }

        /// Segments touching a corrupt fix are skipped, not counted
        #[test]
        fn test_invalid_fix_voids_its_segments(
            a in valid_fix_strategy(),
            bad_lat in invalid_latitude_strategy(),
            b in valid_fix_strategy()
        ) {
            let bad = Fix::new(bad_lat, 0.0, 0);
            // Both segments touch the corrupt fix, so nothing is counted
            prop_assert_eq!(total_distance(&[a, bad, b]), 0.0);
        }
    }
}

/// Spot checks against routes with well-known lengths
#[cfg(test)]
mod known_route_tests {
    use super::*;

    fn at(lat: f64, lon: f64) -> Fix {
        Fix::new(lat, lon, 0)
    }

    #[test]
    fn test_one_degree_of_longitude_on_the_equator() {
        let d = distance_between(&at(0.0, 0.0), &at(0.0, 1.0)).unwrap();
        // 2 * pi * 6371 / 360
        assert!((d - 111.19).abs() < 0.05, "got {d}");
    }

    #[test]
    fn test_paris_to_london() {
        let paris = at(48.8566, 2.3522);
        let london = at(51.5074, -0.1278);
        let d = distance_between(&paris, &london).unwrap();
        assert!((d - 343.6).abs() < 1.5, "got {d}");
    }

    #[test]
    fn test_pole_to_pole_is_half_the_circumference() {
        let d = distance_between(&at(90.0, 0.0), &at(-90.0, 0.0)).unwrap();
        assert!((d - 20_015.09).abs() < 0.5, "got {d}");
    }

    #[test]
    fn test_equatorial_route_total() {
        let route = vec![
            at(0.0, 0.0),
            at(0.0, 1.0),
            at(0.0, 2.0),
            at(0.0, 3.0),
        ];
        let total = total_distance(&route);
        assert!((total - 333.58).abs() < 0.2, "got {total}");
    }
}
