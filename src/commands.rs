//! CLI command definitions
//!
//! Defines the clap commands for the readiness CLI.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Run readiness scenarios against the simulated platform
    Run {
        /// Scenario YAML files
        #[arg(required = true)]
        scenarios: Vec<PathBuf>,

        /// Configuration file (default: platform config dir)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Print results as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Show the effective timeout budgets
    Config {
        /// Configuration file (default: platform config dir)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}
