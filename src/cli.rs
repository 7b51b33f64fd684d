//! Command-line interface for servicekit.
use std::path::PathBuf;

use clap::Parser;

use crate::logger::LogLevel;

/// Command-line interface for servicekit.
#[derive(Debug, Parser)]
#[command(name = "servicekit", version, author)]
#[command(about = "Supervised service daemon with an HTTP API", long_about = None)]
pub struct Cli {
    /// Path to the configuration file (.yaml, .yml or .json).
    #[arg(short, long, value_name = "FILE")]
    pub config: PathBuf,

    /// Print the loaded configuration as JSON and exit.
    #[arg(short, long)]
    pub print: bool,

    /// Override the configured logging verbosity (name or 0-5).
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

/// Parses command-line arguments and returns a `Cli` struct.
pub fn parse_args() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_is_required() {
        assert!(Cli::try_parse_from(["servicekit"]).is_err());
    }

    #[test]
    fn short_flags() {
        let cli = Cli::try_parse_from(["servicekit", "-c", "app.yaml", "-p"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("app.yaml"));
        assert!(cli.print);
        assert!(cli.log_level.is_none());
    }

    #[test]
    fn log_level_accepts_numbers() {
        let cli =
            Cli::try_parse_from(["servicekit", "--config", "app.json", "--log-level", "4"])
                .unwrap();
        assert_eq!(cli.log_level.unwrap().as_str(), "debug");
        assert!(!cli.print);
    }

    #[test]
    fn log_level_rejects_garbage() {
        assert!(
            Cli::try_parse_from(["servicekit", "-c", "app.yaml", "--log-level", "loud"])
                .is_err()
        );
    }
}
