//! Default configuration file creation.
//!
//! Builds a commented `odometr.toml` with aligned inline documentation so
//! the generated file reads like a hand-written one.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::constants::*;

/// Create a default config file at the given path.
///
/// The rider_id is left empty on purpose; validation refuses to run with
/// it unset, which points new installs at the one field they must fill in.
pub fn create_default_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create config directory")?;
    }

    let sections = [
        Section::new("Rider").setting("rider_id", "\"\"", "Rider this device records trips for"),
        Section::new("Provider")
            .setting(
                "provider",
                "\"auto\"",
                "Select: \"auto\", \"geoclue\", \"replay\"",
            )
            .setting(
                "# replay_path",
                "\"/var/lib/odometr/route.json\"",
                "Fix log for the replay provider",
            ),
        Section::new("Acquisition")
            .setting(
                "foreground_interval_secs",
                &DEFAULT_FOREGROUND_INTERVAL_SECS.to_string(),
                &format!(
                    "Watch cadence in seconds ({MIN_FOREGROUND_INTERVAL_SECS}-{MAX_FOREGROUND_INTERVAL_SECS})"
                ),
            )
            .setting(
                "foreground_timeout_ms",
                &FOREGROUND_TIMEOUT_MS.to_string(),
                &format!(
                    "Interactive fix timeout ({MIN_PROVIDER_TIMEOUT_MS}-{MAX_FOREGROUND_TIMEOUT_MS}) ms"
                ),
            )
            .setting(
                "background_timeout_ms",
                &BACKGROUND_TIMEOUT_MS.to_string(),
                &format!(
                    "Scheduled fix timeout ({MIN_PROVIDER_TIMEOUT_MS}-{MAX_BACKGROUND_TIMEOUT_MS}) ms"
                ),
            )
            .setting(
                "min_distance_meters",
                &DEFAULT_MIN_DISTANCE_METERS.to_string(),
                &format!("Movement threshold between updates (0-{MAX_MIN_DISTANCE_METERS})"),
            ),
    ];

    fs::write(path, render(&sections))
        .with_context(|| format!("Failed to write default config to {}", path.display()))?;

    log_block_start!("Created default configuration: {}", path.display());
    log_indented!("Set rider_id before starting a trip");

    Ok(())
}

/// One `#[Title]` block of `key = value` settings with trailing comments.
struct Section {
    title: &'static str,
    settings: Vec<(String, String)>,
}

impl Section {
    fn new(title: &'static str) -> Self {
        Self {
            title,
            settings: Vec::new(),
        }
    }

    fn setting(mut self, key: &str, value: &str, comment: &str) -> Self {
        self.settings.push((format!("{key} = {value}"), comment.to_string()));
        self
    }
}

/// Render the sections with every trailing comment aligned one column past
/// the widest setting line, so changed defaults in constants.rs never break
/// the generated formatting.
fn render(sections: &[Section]) -> String {
    let column = sections
        .iter()
        .flat_map(|s| &s.settings)
        .map(|(line, _)| line.len())
        .max()
        .unwrap_or(0)
        + 1;

    let mut out = String::new();
    for (index, section) in sections.iter().enumerate() {
        if index > 0 {
            out.push('\n');
        }
        out.push_str("#[");
        out.push_str(section.title);
        out.push_str("]\n");
        for (line, comment) in &section.settings {
            out.push_str(line);
            for _ in line.len()..column {
                out.push(' ');
            }
            out.push_str("# ");
            out.push_str(comment);
            out.push('\n');
        }
    }
    out
}
