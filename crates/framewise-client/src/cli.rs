//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// framewise - connect agents to Framewise meetings
#[derive(Debug, Parser)]
#[command(name = "framewise")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "FRAMEWISE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,

    /// API key (overrides the configuration file, accepts env:: and pass:: references)
    #[arg(long, env = "FRAMEWISE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Join a meeting with the built-in echo agent
    Run {
        /// Meeting to join
        #[arg(long)]
        meeting_id: String,
    },

    /// Wait until a meeting is announced for this API key and print its ID
    AwaitMeeting {
        /// Give up after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Listen for start commands and run the echo agent in announced meetings
    Serve,

    /// Register a meeting with the backend
    SetupMeeting {
        /// Meeting to register
        meeting_id: String,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump current configuration
    Dump,

    /// Show configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_run() {
        let cli = Cli::try_parse_from(["framewise", "-v", "run", "--meeting-id", "m-1"]).unwrap();
        assert!(cli.debug);
        assert!(matches!(cli.command, Command::Run { ref meeting_id } if meeting_id == "m-1"));
    }

    #[test]
    fn parses_await_meeting_timeout() {
        let cli = Cli::try_parse_from(["framewise", "await-meeting", "--timeout", "30"]).unwrap();
        assert!(matches!(cli.command, Command::AwaitMeeting { timeout: Some(30) }));
    }

    #[test]
    fn run_requires_meeting_id() {
        assert!(Cli::try_parse_from(["framewise", "run"]).is_err());
    }
}
