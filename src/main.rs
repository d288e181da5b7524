// src/main.rs

//! siphon: declarative REST API collector CLI.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};

use siphon::config::load_config;
use siphon::error::Result;
use siphon::pipeline::{plan_jobs, register_jobs};
use siphon::schedule::Scheduler;
use siphon::services::Fetcher;
use siphon::sink::{FileSink, RecordSink};

#[derive(Parser, Debug)]
#[command(
    name = "siphon",
    version,
    about = "Declarative REST API collector with dependency-aware scheduling"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "data/config.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Reduce logging to warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Schedule all configured sources and run the tick loop
    Run,
    /// Validate the configuration and exit
    Validate,
    /// Print the planned jobs without fetching anything
    Plan,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug, cli.quiet);

    let config_path = PathBuf::from(&cli.config);
    let config = load_config(&config_path)?;

    match cli.command {
        Command::Validate => {
            log::info!(
                "Configuration OK: {} entities, {} enabled source(s)",
                config.entities.len(),
                config.enabled_source_count()
            );
        }
        Command::Plan => {
            let plans = plan_jobs(&config);
            if plans.is_empty() {
                log::warn!("Nothing to schedule");
            }
            for plan in &plans {
                log::info!("every {:>5}s  {}", plan.interval, plan.name());
            }
        }
        Command::Run => {
            let fetcher = Fetcher::over_http(&config.collector)?;
            let sink: Arc<dyn RecordSink> =
                Arc::new(FileSink::new(output_dir(&config_path, &config.collector.output_dir)));

            let mut scheduler = Scheduler::new();
            let plans = register_jobs(&mut scheduler, &config, &fetcher, &sink);
            if plans.is_empty() {
                log::warn!("Nothing to schedule; exiting");
                return Ok(());
            }

            log::info!("Starting tick loop with {} job(s)", scheduler.len());
            scheduler.run().await;
        }
    }

    Ok(())
}

/// Records land next to the config file unless an absolute path is given.
fn output_dir(config_path: &Path, output_dir: &str) -> PathBuf {
    let output = PathBuf::from(output_dir);
    if output.is_absolute() {
        return output;
    }
    config_path
        .parent()
        .map(|dir| dir.join(&output))
        .unwrap_or(output)
}

fn init_logging(debug: bool, quiet: bool) {
    let level = if debug {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}
