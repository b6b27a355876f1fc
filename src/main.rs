//! Binary entry point: parse the command line and dispatch into the library.

use anyhow::Result;

use odometr::Odometr;
use odometr::args::{self, CliAction, ParsedArgs};
use odometr::commands;
use odometr::config;

fn main() -> Result<()> {
    let ParsedArgs {
        action,
        debug_enabled,
        config_dir,
    } = ParsedArgs::from_env();

    // Pin the custom config directory before any configuration is read
    if let Some(dir) = config_dir {
        config::set_config_dir(Some(dir))?;
    }

    match action {
        CliAction::ShowVersion => {
            args::display_version_info();
            Ok(())
        }
        CliAction::ShowHelp | CliAction::ShowHelpDueToError => {
            args::display_help();
            Ok(())
        }
        CliAction::Run => Odometr::new(debug_enabled).run(),
        CliAction::EndTrip => commands::end::handle_end_command(debug_enabled),
        CliAction::Status => commands::status::handle_status_command(debug_enabled),
        CliAction::RetrySubmit => commands::retry_submit::handle_retry_submit_command(debug_enabled),
        CliAction::Reload => commands::reload::handle_reload_command(debug_enabled),
        CliAction::Simulate {
            replay_path,
            multiplier,
        } => commands::simulate::handle_simulate_command(replay_path, multiplier, debug_enabled),
    }
}
