//! Readiness harness CLI
//!
//! Runs readiness scenarios against a simulated windowing system and
//! reports which stage, if any, failed to become ready.

use clap::Parser;
use readiness::common::logging;
use readiness::{cli, commands};
use commands::Commands;

#[derive(Parser)]
#[command(name = "readiness", about = "Deterministic readiness waits for UI test automation")]
#[command(version, long_about = None)]
struct Cli {
    /// Log wait progress at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also write logs to the data directory
    #[arg(long, global = true)]
    log_file: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.log_file {
        if let Some(path) = logging::init_file(cli.verbose) {
            tracing::debug!(path = %path.display(), "Logging to file");
        }
    } else {
        logging::init_cli(cli.verbose);
    }

    if let Err(e) = cli::dispatch(cli.command, cli.verbose).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
