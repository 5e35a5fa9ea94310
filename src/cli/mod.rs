//! CLI command handling
//!
//! Dispatches CLI commands and formats output.

use std::path::Path;

use colored::Colorize;

use crate::commands::Commands;
use crate::common::config::Config;
use crate::common::{paths, Error, Result};
use crate::harness::SequencerBudgets;
use crate::testing;

/// Dispatch a CLI command
pub async fn dispatch(command: Commands, verbose: bool) -> Result<()> {
    match command {
        Commands::Run {
            scenarios,
            config,
            json,
        } => {
            let config = load_config(config.as_deref())?;
            let mut results = Vec::with_capacity(scenarios.len());

            for path in &scenarios {
                let result = testing::run_scenario(path, &config, verbose).await?;
                results.push(result);
            }

            let failed = results.iter().filter(|r| !r.passed).count();

            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                println!(
                    "{} {} passed, {} failed",
                    "Summary:".bold(),
                    (results.len() - failed).to_string().green(),
                    failed.to_string().red()
                );
            }

            if failed > 0 {
                return Err(Error::TestAssertion(format!(
                    "{} of {} scenarios failed",
                    failed,
                    results.len()
                )));
            }
            Ok(())
        }

        Commands::Config { config } => {
            let config = load_config(config.as_deref())?;
            let timeouts = &config.timeouts;
            let budgets = SequencerBudgets::from_config(timeouts);

            if let Some(path) = paths::config_path() {
                println!("Config file: {}", path.display());
            }
            println!("Timeout scale: {}", timeouts.scale);
            println!("Poll interval: {}ms", timeouts.poll_interval_ms);
            println!("Launch budget: {}ms", budgets.launch.timeout.as_millis());
            println!(
                "Content load budget: {}ms",
                budgets.content_load.timeout.as_millis()
            );
            println!(
                "Background init budget: {}ms",
                budgets.background_init.timeout.as_millis()
            );
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}
