//! Configuration system for odometr with validation and hot reload.
//!
//! This module provides configuration management for the trip recorder,
//! handling the TOML configuration file, validation, default value
//! generation, and change watching.
//!
//! ## Configuration Sources
//!
//! The configuration is read from `odometr.toml`:
//! 1. **--config DIR**/odometr.toml when a custom directory is given
//! 2. **XDG_CONFIG_HOME**/odometr/odometr.toml otherwise
//!
//! A missing file is created with commented defaults on first load.
//!
//! ## Configuration Structure
//!
//! ```toml
//! #[Rider]
//! rider_id = "rider-42"        # Rider this device records for
//!
//! #[Provider]
//! provider = "auto"            # Select: "auto", "geoclue", "replay"
//! # replay_path = "/var/lib/odometr/route.json"
//!
//! #[Acquisition]
//! foreground_interval_secs = 15  # Watch cadence in seconds (5-300)
//! foreground_timeout_ms = 8000   # Interactive fix timeout (1000-60000) ms
//! background_timeout_ms = 20000  # Scheduled fix timeout (1000-120000) ms
//! min_distance_meters = 10       # Movement threshold between updates (0-500)
//! ```
//!
//! ## Validation and Error Handling
//!
//! All values are range-checked at load time; an invalid file fails the
//! load with a message naming the offending field and its allowed range.

pub mod builder;
pub mod loading;
pub mod validation;
pub mod watcher;

use std::path::PathBuf;

use anyhow::Result;
use serde::Deserialize;

use crate::constants::*;

// Re-export public API
pub use builder::create_default_config;
pub use loading::{get_config_path, load, load_from_path, set_config_dir};
pub use watcher::start_config_watcher;

/// Location provider selection.
///
/// Determines which provider implementation supplies fixes. `Auto` probes
/// the environment and picks the best available source.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderChoice {
    /// Probe for GeoClue2 first, then fall back to replay when configured
    Auto,
    /// GeoClue2 over the system D-Bus
    Geoclue,
    /// Recorded fix log from `replay_path`
    Replay,
}

impl ProviderChoice {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderChoice::Auto => "auto",
            ProviderChoice::Geoclue => "geoclue",
            ProviderChoice::Replay => "replay",
        }
    }
}

/// Configuration for the trip recorder.
///
/// Loaded from `odometr.toml`. Every field except `rider_id` and
/// `replay_path` has a default, so a minimal file of one line is valid.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Rider this device records trips for. Required, non-empty.
    pub rider_id: String,

    /// Which location provider to use.
    pub provider: ProviderChoice,

    /// Recorded fix log for the replay provider.
    pub replay_path: Option<PathBuf>,

    /// Continuous watch cadence in seconds. The background cadence is
    /// derived from this by doubling and flooring.
    pub foreground_interval_secs: u64,

    /// Timeout for interactive one-shot acquisitions in milliseconds.
    pub foreground_timeout_ms: u64,

    /// Timeout for scheduled background acquisitions in milliseconds.
    pub background_timeout_ms: u64,

    /// Minimum movement between continuous updates in meters.
    pub min_distance_meters: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rider_id: String::new(),
            provider: ProviderChoice::Auto,
            replay_path: None,
            foreground_interval_secs: DEFAULT_FOREGROUND_INTERVAL_SECS,
            foreground_timeout_ms: FOREGROUND_TIMEOUT_MS,
            background_timeout_ms: BACKGROUND_TIMEOUT_MS,
            min_distance_meters: DEFAULT_MIN_DISTANCE_METERS,
        }
    }
}

impl Config {
    /// Load configuration using the module's load function
    pub fn load() -> Result<Self> {
        load()
    }

    /// Load from path using the module's load_from_path function
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        load_from_path(path)
    }

    /// Get configuration path using the module's get_config_path function
    pub fn get_config_path() -> Result<PathBuf> {
        get_config_path()
    }

    /// Acquisition tuning derived from this configuration.
    pub fn acquire_tuning(&self) -> crate::acquisition::AcquireTuning {
        crate::acquisition::AcquireTuning {
            foreground_timeout_ms: self.foreground_timeout_ms,
            background_timeout_ms: self.background_timeout_ms,
            min_distance_meters: self.min_distance_meters,
        }
    }

    pub fn log_config(&self, resolved_provider: Option<&crate::provider::ProviderKind>) {
        log_block_start!("Loaded configuration");
        log_indented!("Rider: {}", self.rider_id);

        let provider_display = match (self.provider, resolved_provider) {
            (ProviderChoice::Auto, Some(resolved)) => format!("Provider: Auto ({resolved})"),
            (choice, _) => format!("Provider: {}", choice.as_str()),
        };
        log_indented!("{}", provider_display);
        if let Some(ref path) = self.replay_path {
            log_indented!("Replay log: {}", path.display());
        }

        log_indented!("Watch cadence: {} seconds", self.foreground_interval_secs);
        log_indented!(
            "Background cadence: {} seconds",
            crate::scheduler::background_interval(self.foreground_interval_secs).as_secs()
        );
        log_indented!(
            "Timeouts: {} ms foreground, {} ms background",
            self.foreground_timeout_ms,
            self.background_timeout_ms
        );
        log_indented!("Movement threshold: {} meters", self.min_distance_meters);
    }
}

#[cfg(test)]
mod tests;
