//! Implementation of the reload command.
//!
//! Validates the configuration file, then signals the running recorder to
//! re-read it. Acquisition tuning applies immediately; provider changes wait
//! for the next start.

use anyhow::Result;

use crate::config::Config;
use crate::io::instance;

/// Handle the reload command to signal a running recorder.
pub fn handle_reload_command(_debug_enabled: bool) -> Result<()> {
    log_version!();

    // Restores the daemon's config dir before validating
    let running = instance::get_running_instance()?;

    // Fail fast here with a clear message rather than in the daemon's log
    Config::load()?;

    match running {
        Some(info) => {
            log_block_start!("Signaling odometr to reload...");
            match instance::send_reload_signal(info.pid) {
                Ok(()) => {
                    log_decorated!("Sent reload signal to odometr (PID: {})", info.pid);
                    log_indented!("The recorder will re-read odometr.toml");
                }
                Err(e) => {
                    log_error!("Failed to signal recorder: {e}");
                }
            }
        }
        None => {
            log_pipe!();
            log_warning!("No running recorder to reload");
            log_indented!("Start one with: odometr start");
        }
    }
    log_end!();

    Ok(())
}
