//! Box-drawing console output for the recorder.
//!
//! All user-facing output goes through the macros in this module, which draw
//! a continuous left-hand pipe so a whole run reads as one connected block,
//! from the `log_version!` header down to the `log_end!` corner.
//!
//! Logging can be switched off at runtime for quiet operation, and when the
//! process runs on a simulated clock every line is stamped with the
//! simulated `[HH:MM:SS]` so replayed routes read like a timeline.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

static LOGGING_ENABLED: AtomicBool = AtomicBool::new(true);

/// Runtime switchboard for the output macros.
///
/// ## Conventions
///
/// - `log_version!` opens the run (`┏ odometr vX.Y.Z ━━╸`), `log_end!`
///   closes it (`╹`). Each appears once per command.
/// - `log_block_start!` begins a new conceptual block ("Trip started",
///   "Loaded configuration") with spacing above it. Detail lines inside the
///   block use `log_indented!`; sibling status lines use `log_decorated!`.
/// - `log_pipe!` inserts one empty `┃` line. Use it before a bare
///   `log_warning!`/`log_error!`/`log_info!`/`log_debug!` that starts a new
///   thought; never before `log_block_start!` (it spaces itself) and never
///   right before `log_end!`.
/// - The level macros print a colored `[LEVEL]` tag and are for semantic
///   one-liners that do not warrant a block of their own.
/// - `log_error_exit!` terminates the pipe with a `┗` corner; reserve it for
///   the message printed immediately before the process exits.
pub struct Log;

impl Log {
    /// Enable or disable all macro output. Tests and automated runs switch
    /// this off so log lines do not interleave with their own output.
    pub fn set_enabled(enabled: bool) {
        LOGGING_ENABLED.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled() -> bool {
        LOGGING_ENABLED.load(Ordering::SeqCst)
    }

    /// Simulated-clock stamp, `[HH:MM:SS] `, or empty on the real clock.
    /// Reads the time source without initializing it.
    pub fn get_timestamp_prefix() -> String {
        if crate::time_source::is_initialized() && crate::time_source::is_simulated() {
            format!("[{}] ", crate::time_source::now().format("%H:%M:%S"))
        } else {
            String::new()
        }
    }
}

/// Line layouts the macros can emit. Macro plumbing, not part of the API.
#[doc(hidden)]
#[derive(Clone, Copy)]
pub enum LineShape {
    Decorated,
    Indented,
    BlockStart,
    Info,
    Warning,
    Error,
    Debug,
    ErrorExit,
}

/// Render one message in the given shape and write it out. Called by the
/// macros after they have checked `Log::is_enabled()`.
#[doc(hidden)]
pub fn emit(shape: LineShape, message: impl std::fmt::Display) {
    let stamp = Log::get_timestamp_prefix();
    let text = match shape {
        LineShape::Decorated => format!("{stamp}┣ {message}\n"),
        LineShape::Indented => format!("{stamp}┃   {message}\n"),
        LineShape::BlockStart => format!("{stamp}┃\n{stamp}┣ {message}\n"),
        LineShape::Info => format!("{stamp}┣[\x1b[32mINFO\x1b[0m] {message}\n"),
        LineShape::Warning => format!("{stamp}┣[\x1b[33mWARNING\x1b[0m] {message}\n"),
        LineShape::Error => format!("{stamp}┣[\x1b[31mERROR\x1b[0m] {message}\n"),
        LineShape::Debug => format!("{stamp}┣[\x1b[32mDEBUG\x1b[0m] {message}\n"),
        LineShape::ErrorExit => format!("{stamp}┃\n{stamp}┗[\x1b[31mERROR\x1b[0m] {message}\n"),
    };
    write_output(&text);
}

/// Write already-rendered text to stdout, flushing so daemon output is not
/// held back by line buffering.
#[doc(hidden)]
pub fn write_output(text: &str) {
    print!("{text}");
    let _ = std::io::stdout().flush();
}

/// Shared macro body: check the switch, format, emit. The literal arm keeps
/// format-string checking at the call site; the expression arm lets callers
/// pass anything Display.
#[doc(hidden)]
#[macro_export]
macro_rules! __log_line {
    ($shape:ident, $fmt:literal $($arg:tt)*) => {{
        if $crate::logger::Log::is_enabled() {
            $crate::logger::emit($crate::logger::LineShape::$shape, format!($fmt $($arg)*));
        }
    }};
    ($shape:ident, $expr:expr) => {{
        if $crate::logger::Log::is_enabled() {
            $crate::logger::emit($crate::logger::LineShape::$shape, $expr);
        }
    }};
}

/// Log a `┣` line as part of an existing block or as standalone emphasis.
#[macro_export]
macro_rules! log_decorated {
    ($($arg:tt)*) => { $crate::__log_line!(Decorated, $($arg)*) };
}

/// Log an indented detail line under the current block.
#[macro_export]
macro_rules! log_indented {
    ($($arg:tt)*) => { $crate::__log_line!(Indented, $($arg)*) };
}

/// Log one empty pipe line for vertical spacing.
#[macro_export]
macro_rules! log_pipe {
    () => {{
        if $crate::logger::Log::is_enabled() {
            let stamp = $crate::logger::Log::get_timestamp_prefix();
            $crate::logger::write_output(&format!("{stamp}┃\n"));
        }
    }};
}

/// Log the opening line of a new conceptual block, spaced from what came
/// before.
#[macro_export]
macro_rules! log_block_start {
    ($($arg:tt)*) => { $crate::__log_line!(BlockStart, $($arg)*) };
}

/// Log the run header with the crate version.
#[macro_export]
macro_rules! log_version {
    () => {{
        if $crate::logger::Log::is_enabled() {
            let stamp = $crate::logger::Log::get_timestamp_prefix();
            let version = env!("CARGO_PKG_VERSION");
            $crate::logger::write_output(&format!("{stamp}┏ odometr v{version} ━━╸\n"));
        }
    }};
}

/// Log the closing corner of the run.
#[macro_export]
macro_rules! log_end {
    () => {{
        if $crate::logger::Log::is_enabled() {
            let stamp = $crate::logger::Log::get_timestamp_prefix();
            $crate::logger::write_output(&format!("{stamp}╹\n"));
        }
    }};
}

/// Log an informational one-liner with a green `[INFO]` tag.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => { $crate::__log_line!(Info, $($arg)*) };
}

/// Log a warning one-liner with a yellow `[WARNING]` tag.
#[macro_export]
macro_rules! log_warning {
    ($($arg:tt)*) => { $crate::__log_line!(Warning, $($arg)*) };
}

/// Log an error one-liner with a red `[ERROR]` tag.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => { $crate::__log_line!(Error, $($arg)*) };
}

/// Log a terminal error that closes the pipe with a `┗` corner. For the
/// last line before the process exits.
#[macro_export]
macro_rules! log_error_exit {
    ($($arg:tt)*) => { $crate::__log_line!(ErrorExit, $($arg)*) };
}

/// Log a debug one-liner with a green `[DEBUG]` tag.
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => { $crate::__log_line!(Debug, $($arg)*) };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enable_flag_round_trips() {
        assert!(Log::is_enabled());
        Log::set_enabled(false);
        assert!(!Log::is_enabled());
        Log::set_enabled(true);
        assert!(Log::is_enabled());
    }

    #[test]
    fn test_timestamp_prefix_is_empty_on_the_real_clock() {
        // The global source may already be real; it is never simulated here
        if !crate::time_source::is_simulated() {
            assert_eq!(Log::get_timestamp_prefix(), "");
        }
    }
}
