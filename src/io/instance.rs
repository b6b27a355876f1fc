//! Discovery and signalling of a running recorder daemon.
//!
//! Companion commands (`end`, `reload`, `status`) locate the daemon through
//! the lock file written by `io::lock` and talk to it with Unix signals.

use anyhow::{Context, Result};
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use std::path::PathBuf;

use crate::io::lock;

/// What the lock file says about the daemon that wrote it.
#[derive(Debug, Clone)]
pub struct InstanceInfo {
    /// Process ID of the daemon
    pub pid: u32,
    /// Custom config directory if set
    pub config_dir: Option<PathBuf>,
}

impl InstanceInfo {
    /// Parse the two-line lock file body: PID, then an optional config
    /// directory.
    pub fn from_lock_contents(contents: &str) -> Result<Self> {
        let mut lines = contents.trim().lines();

        let pid_line = lines
            .next()
            .ok_or_else(|| anyhow::anyhow!("Lock file is empty"))?;
        let pid = pid_line
            .parse::<u32>()
            .context("Invalid PID format in lock file")?;

        let config_dir = lines.next().filter(|l| !l.is_empty()).map(PathBuf::from);

        if lines.next().is_some() {
            anyhow::bail!("Invalid lock file format (expected 1-2 lines)");
        }

        Ok(InstanceInfo { pid, config_dir })
    }
}

/// Find the running daemon, if any.
///
/// Reads the lock file and probes the recorded PID. A config directory in
/// the lock file is installed for this process so companion commands see
/// the same configuration as the daemon.
pub fn get_running_instance() -> Result<Option<InstanceInfo>> {
    let Ok(contents) = std::fs::read_to_string(lock::get_lock_path()) else {
        return Ok(None);
    };

    let info = InstanceInfo::from_lock_contents(&contents)?;

    if let Some(dir) = &info.config_dir {
        // Ignore the error if a config dir was already set for this process
        let _ = crate::config::set_config_dir(Some(dir.display().to_string()));
    }

    Ok(is_instance_running(info.pid).then_some(info))
}

/// Probe a PID for liveness. Signal 0 performs the existence and permission
/// checks without delivering anything.
pub fn is_instance_running(pid: u32) -> bool {
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

fn signal_instance(pid: u32, signal: Signal, what: &str) -> Result<()> {
    kill(Pid::from_raw(pid as i32), signal)
        .map_err(|e| anyhow::anyhow!("Failed to send {what} signal: {e}"))
}

/// Ask a running daemon to reload its configuration (SIGUSR2).
pub fn send_reload_signal(pid: u32) -> Result<()> {
    signal_instance(pid, Signal::SIGUSR2, "reload")
}

/// Ask a running daemon to end the active trip, submit it, and exit
/// (SIGUSR1).
pub fn send_end_trip_signal(pid: u32) -> Result<()> {
    signal_instance(pid, Signal::SIGUSR1, "end-trip")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_contents_parse_pid_and_config_dir() {
        let info = InstanceInfo::from_lock_contents("12345\n/home/rider/.config/odometr").unwrap();
        assert_eq!(info.pid, 12345);
        assert_eq!(
            info.config_dir.as_deref(),
            Some(std::path::Path::new("/home/rider/.config/odometr"))
        );

        let info = InstanceInfo::from_lock_contents("6789\n").unwrap();
        assert_eq!((info.pid, info.config_dir), (6789, None));

        let info = InstanceInfo::from_lock_contents("42").unwrap();
        assert_eq!((info.pid, info.config_dir), (42, None));
    }

    #[test]
    fn test_lock_contents_rejects_garbage() {
        assert!(InstanceInfo::from_lock_contents("").is_err());
        assert!(InstanceInfo::from_lock_contents("not-a-pid").is_err());
        assert!(InstanceInfo::from_lock_contents("1\n2\n3").is_err());
    }

    #[test]
    fn test_liveness_probe() {
        // Our own process is certainly running
        assert!(is_instance_running(std::process::id()));

        // Linux pid_max tops out well below i32::MAX
        assert!(!is_instance_running(i32::MAX as u32));
    }
}
