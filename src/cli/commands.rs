//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Reconciles PingOne configuration documents against the live tenant.
#[derive(Parser, Debug)]
#[command(name = "pingone-reconcile")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the state file.
    #[arg(short, long, global = true, env = "PINGONE_STATE_FILE")]
    pub state: Option<PathBuf>,

    /// Profile to read from the PingOne CLI configuration instead of the environment.
    #[arg(short, long, global = true, env = "PINGONE_PROFILE")]
    pub profile: Option<String>,

    /// Path to the PingOne CLI configuration file.
    #[arg(long, global = true)]
    pub profile_file: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log line format.
    #[arg(long, global = true, default_value = "text")]
    pub log_format: LogFormat,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the schema of every resource type, or of one.
    Schema {
        /// Resource type to print.
        resource_type: Option<String>,
    },

    /// Validate a configuration document.
    Validate {
        /// Configuration document (JSON).
        file: PathBuf,
    },

    /// Show the change set a configuration document would produce.
    Plan {
        /// Configuration document (JSON).
        file: PathBuf,

        /// Show attribute-level changes.
        #[arg(short, long)]
        detailed: bool,
    },

    /// Apply a configuration document.
    Apply {
        /// Configuration document (JSON).
        file: PathBuf,

        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,

        /// Continue on errors.
        #[arg(long)]
        continue_on_error: bool,
    },

    /// Bring an existing PingOne object under management.
    Import {
        /// Resource type, e.g. `pingone_population`.
        resource_type: String,

        /// Import identifier, e.g. `<environment_id>/<population_id>`.
        id: String,

        /// Address to record the instance under (defaults to `<type>.<last id segment>`).
        #[arg(long)]
        address: Option<String>,
    },

    /// Re-read every managed instance and drop the ones that are gone.
    Refresh,

    /// Rewrite the state file at the current schema versions.
    UpgradeState,
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_import() {
        let cli = Cli::try_parse_from([
            "pingone-reconcile",
            "--log-format",
            "json",
            "import",
            "pingone_population",
            "a/b",
            "--address",
            "pingone_population.staff",
        ])
        .expect("parse");
        assert_eq!(cli.log_format, LogFormat::Json);
        let Commands::Import { resource_type, address, .. } = cli.command else {
            panic!("expected import");
        };
        assert_eq!(resource_type, "pingone_population");
        assert_eq!(address.as_deref(), Some("pingone_population.staff"));
    }

    #[test]
    fn test_parse_upgrade_state() {
        let cli = Cli::try_parse_from(["pingone-reconcile", "upgrade-state"]).expect("parse");
        assert!(matches!(cli.command, Commands::UpgradeState));
    }
}
