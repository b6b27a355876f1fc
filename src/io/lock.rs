//! Lock file management for single-instance enforcement.
//!
//! Only one odometr daemon may record trips on a device at a time. The lock
//! file lives in the runtime directory and records the daemon PID plus the
//! config directory it was started with, so companion commands can signal
//! the right process. Stale locks from crashed daemons are cleaned up.

use anyhow::Result;
use fs2::FileExt;
use std::fs::File;
use std::io::{Seek, SeekFrom, Write};

use crate::config;
use crate::io::instance;

/// Get the path of the daemon lock file.
pub fn get_lock_path() -> String {
    let runtime_dir = std::env::var("XDG_RUNTIME_DIR").unwrap_or_else(|_| "/tmp".to_string());
    format!("{runtime_dir}/odometr.lock")
}

/// Acquire an exclusive lock on the lock file.
///
/// The lock file contains:
/// - Process ID (PID)
/// - Config directory (empty line if using default)
///
/// # Returns
/// - `Ok((lock_file, lock_path))` if the lock was acquired
/// - `Err(_)` if an error occurred that requires termination
/// - Never returns if another daemon is running (calls std::process::exit)
pub fn acquire_lock() -> Result<(File, String)> {
    let lock_path = get_lock_path();

    // Open without truncating to preserve content for conflict diagnosis
    let lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)?;

    match lock_file.try_lock_exclusive() {
        Ok(()) => {
            write_lock_contents(&lock_file)?;
            Ok((lock_file, lock_path))
        }
        Err(_) => {
            // Another daemon holds the lock or a stale lock remains.
            // handle_lock_conflict either returns Ok(()) or exits the process.
            handle_lock_conflict(&lock_path)?;

            // Conflict was resolved (stale lock removed), retry once
            let retry_lock_file = std::fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(false)
                .open(&lock_path)?;

            match retry_lock_file.try_lock_exclusive() {
                Ok(()) => {
                    write_lock_contents(&retry_lock_file)?;
                    Ok((retry_lock_file, lock_path))
                }
                Err(e) => {
                    log_error_exit!("Failed to acquire lock after cleanup attempt: {}", e);
                    std::process::exit(1);
                }
            }
        }
    }
}

/// Truncate the lock file and write this process's PID and config directory.
fn write_lock_contents(mut lock_file: &File) -> Result<()> {
    lock_file.set_len(0)?;
    lock_file.seek(SeekFrom::Start(0))?;

    writeln!(lock_file, "{}", std::process::id())?;
    // Config directory (empty line if using default)
    match config::get_config_path() {
        Ok(path) => match path.parent() {
            Some(dir) => writeln!(lock_file, "{}", dir.display())?,
            None => writeln!(lock_file)?,
        },
        Err(_) => writeln!(lock_file)?,
    }
    lock_file.flush()?;

    Ok(())
}

/// Handle lock file conflicts.
///
/// Removes the lock when it is stale (recorded process no longer running or
/// contents unparseable). When the recorded daemon is alive, prints what the
/// user probably meant to do and exits.
///
/// # Returns
/// - `Ok(())` if the conflict was resolved (stale lock removed)
/// - Never returns if another daemon is running (calls std::process::exit)
pub fn handle_lock_conflict(lock_path: &str) -> Result<()> {
    let lock_content = match std::fs::read_to_string(lock_path) {
        Ok(content) => content,
        Err(_) => {
            // Lock file vanished between the failed lock and now
            return Ok(());
        }
    };

    let pid = match lock_content.lines().next().and_then(|l| l.parse::<u32>().ok()) {
        Some(pid) => pid,
        None => {
            log_warning!("Lock file contains invalid PID, removing stale lock");
            let _ = std::fs::remove_file(lock_path);
            return Ok(());
        }
    };

    if !instance::is_instance_running(pid) {
        log_warning!("Removing stale lock file (process {pid} no longer running)");
        let _ = std::fs::remove_file(lock_path);
        return Ok(());
    }

    log_pipe!();
    log_error!("odometr is already recording (PID: {pid})");
    log_block_start!("Did you mean to:");
    log_indented!("• End the active trip: odometr end");
    log_indented!("• Check trip progress: odometr status");
    log_indented!("• Reload configuration: odometr reload");
    log_block_start!("Cannot start - another odometr instance is running");
    log_end!();
    std::process::exit(1)
}
