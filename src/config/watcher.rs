//! Hot reload of `odometr.toml`.
//!
//! A notify watcher on the config directory feeds a debouncing thread that
//! forwards `SignalMessage::Reload` to the daemon loop, so acquisition
//! tuning and cadence follow the file without restarting the daemon.

use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use notify::{
    Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
};

use crate::constants::CONFIG_WATCHER_DEBOUNCE_MS;
use crate::io::signals::SignalMessage;

/// Watches the configuration file and requests reloads when it changes.
pub struct ConfigWatcher {
    signal_sender: Sender<SignalMessage>,
    debug_enabled: bool,
}

/// True when any path in the event refers to `odometr.toml`.
fn touches_config(event: &Event) -> bool {
    event.paths.iter().any(|path| {
        path.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| name == "odometr.toml" || name.ends_with("odometr.toml"))
    })
}

impl ConfigWatcher {
    pub fn new(signal_sender: Sender<SignalMessage>, debug_enabled: bool) -> Self {
        Self {
            signal_sender,
            debug_enabled,
        }
    }

    /// Start watching the configuration file for changes.
    ///
    /// Spawns a background thread that monitors the config directory and
    /// sends reload signals when `odometr.toml` is touched.
    pub fn start(self) -> Result<()> {
        let config_path = super::get_config_path()?;
        if !config_path.exists() {
            if self.debug_enabled {
                log_pipe!();
                log_debug!("No configuration file found to watch for hot reload");
            }
            return Ok(());
        }

        if self.debug_enabled {
            log_pipe!();
            log_debug!("Watching for config changes: {}", config_path.display());
        }

        let (raw_tx, raw_events) = std::sync::mpsc::channel();

        let mut watcher = RecommendedWatcher::new(
            move |outcome: Result<Event, notify::Error>| {
                if let Ok(event) = outcome
                    && matches!(
                        event.kind,
                        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                    )
                {
                    let _ = raw_tx.send(event);
                }
            },
            NotifyConfig::default(),
        )
        .context("Failed to create file watcher")?;

        // Watch the parent directory rather than the file itself; editors
        // replace files on save, which breaks per-file watches
        let watch_dir: PathBuf = config_path
            .parent()
            .context("Config path has no parent directory")?
            .to_path_buf();
        watcher
            .watch(&watch_dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch directory: {}", watch_dir.display()))?;

        let ConfigWatcher {
            signal_sender,
            debug_enabled,
        } = self;
        thread::spawn(move || {
            // Keep the watcher alive by moving it into the thread
            let _watcher = watcher;
            let mut last_forwarded = Instant::now();

            for event in raw_events {
                if !touches_config(&event) {
                    continue;
                }

                // Debounce: editors write files in several steps
                if last_forwarded.elapsed() < Duration::from_millis(CONFIG_WATCHER_DEBOUNCE_MS) {
                    continue;
                }

                if debug_enabled {
                    log_pipe!();
                    log_info!("Configuration file change detected");
                }

                if signal_sender.send(SignalMessage::Reload).is_err() {
                    // Channel disconnected, the main loop is gone
                    break;
                }
                last_forwarded = Instant::now();
            }
        });

        Ok(())
    }
}

/// Spawn the watcher from the daemon to enable hot config reloading.
pub fn start_config_watcher(
    signal_sender: Sender<SignalMessage>,
    debug_enabled: bool,
) -> Result<()> {
    ConfigWatcher::new(signal_sender, debug_enabled).start()
}
