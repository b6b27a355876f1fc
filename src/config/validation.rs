//! Configuration validation functionality.
//!
//! Range-checks every tunable so the engine never runs with a cadence or
//! timeout outside what the acquisition profiles were designed for.

use anyhow::Result;

use super::{Config, ProviderChoice};
use crate::constants::*;

/// Validate a parsed configuration before it is handed to the engine.
pub fn validate_config(config: &Config) -> Result<()> {
    if config.rider_id.trim().is_empty() {
        anyhow::bail!("rider_id must be set in odometr.toml");
    }

    if !(MIN_FOREGROUND_INTERVAL_SECS..=MAX_FOREGROUND_INTERVAL_SECS)
        .contains(&config.foreground_interval_secs)
    {
        anyhow::bail!(
            "foreground_interval_secs ({}) must be between {} and {} seconds",
            config.foreground_interval_secs,
            MIN_FOREGROUND_INTERVAL_SECS,
            MAX_FOREGROUND_INTERVAL_SECS
        );
    }

    if !(MIN_PROVIDER_TIMEOUT_MS..=MAX_FOREGROUND_TIMEOUT_MS)
        .contains(&config.foreground_timeout_ms)
    {
        anyhow::bail!(
            "foreground_timeout_ms ({}) must be between {} and {} milliseconds",
            config.foreground_timeout_ms,
            MIN_PROVIDER_TIMEOUT_MS,
            MAX_FOREGROUND_TIMEOUT_MS
        );
    }

    if !(MIN_PROVIDER_TIMEOUT_MS..=MAX_BACKGROUND_TIMEOUT_MS)
        .contains(&config.background_timeout_ms)
    {
        anyhow::bail!(
            "background_timeout_ms ({}) must be between {} and {} milliseconds",
            config.background_timeout_ms,
            MIN_PROVIDER_TIMEOUT_MS,
            MAX_BACKGROUND_TIMEOUT_MS
        );
    }

    if config.min_distance_meters > MAX_MIN_DISTANCE_METERS {
        anyhow::bail!(
            "min_distance_meters ({}) must be at most {} meters",
            config.min_distance_meters,
            MAX_MIN_DISTANCE_METERS
        );
    }

    if config.provider == ProviderChoice::Replay && config.replay_path.is_none() {
        anyhow::bail!("provider = \"replay\" requires replay_path to be set");
    }

    if let Some(ref path) = config.replay_path
        && config.provider != ProviderChoice::Geoclue
        && !path.exists()
    {
        anyhow::bail!("replay_path does not exist: {}", path.display());
    }

    Ok(())
}
