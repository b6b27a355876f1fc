//! Command-line command handlers for odometr.
//!
//! This module contains implementations for one-shot CLI commands like end,
//! status, and retry-submit. Each command is implemented in its own submodule
//! to keep the code organized and maintainable.

pub mod end;
pub mod reload;
pub mod retry_submit;
pub mod simulate;
pub mod status;
