//! Command-line parsing for the recorder binary.
//!
//! One pass over the arguments separates flags from positionals, then the
//! first positional selects the command. Help and version requests win over
//! everything else, and anything unrecognized falls back to the help screen.

/// Command selected on the command line.
#[derive(Debug, PartialEq)]
pub enum CliAction {
    /// Begin or resume a trip and run the recorder until it ends
    Run,
    /// End the active trip and submit it
    EndTrip,
    /// Show active trip progress
    Status,
    /// Re-attempt a failed trip submission
    RetrySubmit,
    /// Reload configuration in the running recorder
    Reload,
    /// Replay a fix log against a simulated clock
    Simulate {
        replay_path: String,
        multiplier: Option<f64>,
    },

    /// Print the help screen and exit
    ShowHelp,
    /// Print the version banner and exit
    ShowVersion,
    /// Print the help screen after a usage error and exit
    ShowHelpDueToError,
}

/// Outcome of a parse: the selected command plus the flags shared by every
/// command.
pub struct ParsedArgs {
    pub action: CliAction,
    pub debug_enabled: bool,
    pub config_dir: Option<String>,
}

impl ParsedArgs {
    /// A terminal action (help, version, usage error) where the shared flags
    /// no longer matter.
    fn terminal(action: CliAction) -> ParsedArgs {
        ParsedArgs {
            action,
            debug_enabled: false,
            config_dir: None,
        }
    }

    /// Parse a full argument list, program name included.
    pub fn parse<I, S>(args: I) -> ParsedArgs
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let argv: Vec<String> = args
            .into_iter()
            .skip(1)
            .map(|s| s.as_ref().to_string())
            .collect();

        // Help and version requests win over everything else
        if argv
            .iter()
            .any(|a| matches!(a.as_str(), "--version" | "-V" | "-v"))
        {
            return Self::terminal(CliAction::ShowVersion);
        }
        if argv.iter().any(|a| matches!(a.as_str(), "--help" | "-h")) {
            return Self::terminal(CliAction::ShowHelp);
        }

        let mut debug_enabled = false;
        let mut config_dir = None;
        let mut positional: Vec<String> = Vec::new();

        let mut words = argv.iter();
        while let Some(word) = words.next() {
            match word.as_str() {
                "--debug" | "-d" => debug_enabled = true,
                "--config" | "-c" => match words.next() {
                    Some(dir) if !dir.starts_with('-') => config_dir = Some(dir.clone()),
                    _ => {
                        log_warning!("Missing directory for --config. Usage: --config <directory>");
                        return Self::terminal(CliAction::ShowHelpDueToError);
                    }
                },
                flag if flag.starts_with('-') => {
                    log_warning!("Unknown option: {}", flag);
                    return Self::terminal(CliAction::ShowHelpDueToError);
                }
                _ => positional.push(word.clone()),
            }
        }

        let Some((command, rest)) = positional.split_first() else {
            // Bare invocation runs the recorder
            return ParsedArgs {
                action: CliAction::Run,
                debug_enabled,
                config_dir,
            };
        };

        let action = match command.as_str() {
            "start" => CliAction::Run,
            "end" | "e" => CliAction::EndTrip,
            "status" | "st" => CliAction::Status,
            "retry-submit" => CliAction::RetrySubmit,
            "reload" | "r" => CliAction::Reload,
            "simulate" => return Self::parse_simulate(rest, debug_enabled, config_dir),
            _ => {
                log_warning!("Unknown command: {}", command);
                return Self::terminal(CliAction::ShowHelpDueToError);
            }
        };

        if let Some(extra) = rest.first() {
            log_error!(
                "Cannot use multiple commands at once: '{}' and '{}'",
                command,
                extra
            );
            return Self::terminal(CliAction::ShowHelpDueToError);
        }

        ParsedArgs {
            action,
            debug_enabled,
            config_dir,
        }
    }

    /// Parse the `simulate <route.json> [multiplier]` tail.
    fn parse_simulate(
        rest: &[String],
        debug_enabled: bool,
        config_dir: Option<String>,
    ) -> ParsedArgs {
        let Some(replay_path) = rest.first().cloned() else {
            log_warning!(
                "Missing fix log for simulate. Usage: odometr simulate <route.json> [multiplier]"
            );
            return Self::terminal(CliAction::ShowHelpDueToError);
        };

        let multiplier = match rest.get(1) {
            Some(raw) => match raw.parse::<f64>() {
                Ok(mult) if (0.1..=3600.0).contains(&mult) => Some(mult),
                _ => {
                    log_error!("Invalid multiplier: {}. Must be between 0.1 and 3600.", raw);
                    return Self::terminal(CliAction::ShowHelpDueToError);
                }
            },
            None => None,
        };

        if let Some(extra) = rest.get(2) {
            log_error!(
                "Cannot use multiple commands at once: 'simulate' and '{}'",
                extra
            );
            return Self::terminal(CliAction::ShowHelpDueToError);
        }

        ParsedArgs {
            action: CliAction::Simulate {
                replay_path,
                multiplier,
            },
            debug_enabled,
            config_dir,
        }
    }

    /// Parse the arguments this process was started with.
    pub fn from_env() -> ParsedArgs {
        Self::parse(std::env::args())
    }
}

/// Print the version banner in the logger's visual style.
pub fn display_version_info() {
    log_version!();
    log_pipe!();
    println!("┗ {}", env!("CARGO_PKG_DESCRIPTION"));
}

/// Print the full help screen in the logger's visual style.
pub fn display_help() {
    log_version!();
    log_block_start!(env!("CARGO_PKG_DESCRIPTION"));
    log_block_start!("Usage:");
    log_indented!("odometr [OPTIONS] [COMMAND]");
    log_block_start!("Options:");
    log_indented!("-c, --config <dir>     Use custom configuration directory");
    log_indented!("-d, --debug            Enable detailed debug output");
    log_indented!("-h, --help             Print help information");
    log_indented!("-V, --version          Print version information");
    log_block_start!("Commands:");
    log_indented!("start                  Begin or resume a trip and record until ended");
    log_indented!("end, e                 End the active trip and submit it");
    log_indented!("status, st             Show active trip progress");
    log_indented!("retry-submit           Re-attempt a failed trip submission");
    log_indented!("reload, r              Reload configuration in the running recorder");
    log_indented!("simulate <route> [x]   Replay a fix log against a simulated clock");
    log_end!();
}
