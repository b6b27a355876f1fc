//! Centralized constants for timing, retry tuning, and configuration defaults.

// # Acquisition pipeline tuning

/// Maximum number of retries after the initial acquisition attempt
pub const RETRY_CEILING: u32 = 3;

/// Added to the provider timeout on each retry (linear backoff)
pub const RETRY_TIMEOUT_INCREMENT_MS: u64 = 2_000;

/// Delay between acquisition attempts
pub const RETRY_DELAY_MS: u64 = 500;

/// Oldest cached fix Background mode will accept instead of a fresh reading
pub const BACKGROUND_STALENESS_CEILING_SECS: i64 = 600;

/// Oldest cached fix Foreground mode will accept
pub const FOREGROUND_STALENESS_CEILING_SECS: i64 = 60;

// # Acquisition mode profiles

/// Foreground profile: provider timeout
pub const FOREGROUND_TIMEOUT_MS: u64 = 8_000;

/// Foreground profile: provider-side cache tolerance
pub const FOREGROUND_MAX_CACHE_AGE_SECS: i64 = 30;

/// Background profile: provider timeout
pub const BACKGROUND_TIMEOUT_MS: u64 = 20_000;

/// Background profile: provider-side cache tolerance
pub const BACKGROUND_MAX_CACHE_AGE_SECS: i64 = 300;

// # Scheduler

/// Lower bound for the background polling interval
pub const SCHEDULER_INTERVAL_FLOOR_SECS: u64 = 120;

/// Scheduler sleeps in short slices so stop() is acknowledged promptly
pub const SCHEDULER_SLEEP_SLICE_MS: u64 = 250;

// # Configuration defaults and ranges

/// Default interval between continuous watch updates
pub const DEFAULT_FOREGROUND_INTERVAL_SECS: u64 = 15;
pub const MIN_FOREGROUND_INTERVAL_SECS: u64 = 5;
pub const MAX_FOREGROUND_INTERVAL_SECS: u64 = 300;

pub const MIN_PROVIDER_TIMEOUT_MS: u64 = 1_000;
pub const MAX_FOREGROUND_TIMEOUT_MS: u64 = 60_000;
pub const MAX_BACKGROUND_TIMEOUT_MS: u64 = 120_000;

/// Default minimum movement between watch updates
pub const DEFAULT_MIN_DISTANCE_METERS: u32 = 10;
pub const MAX_MIN_DISTANCE_METERS: u32 = 500;

// # Geodesy

/// Mean Earth radius used by the haversine distance calculation
pub const EARTH_RADIUS_KM: f64 = 6371.0;

// # Config watcher

/// Debounce window for config file change events
pub const CONFIG_WATCHER_DEBOUNCE_MS: u64 = 500;

// # Simulation

/// Default acceleration for the simulate command (1 simulated minute per second)
pub const DEFAULT_SIMULATION_MULTIPLIER: f64 = 60.0;
