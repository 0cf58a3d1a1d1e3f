//! Threat Monitor CLI.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use zentinel_threat_monitor::{AnalysisStatus, Config, ThreatMonitor};

#[derive(Parser, Debug)]
#[command(name = "zentinel-threat-monitor")]
#[command(about = "Threat monitor for Zentinel - score AbuseIPDB flagged IPs and alert on high-risk entries")]
#[command(version)]
struct Args {
    /// Path to configuration file (defaults plus ABUSE_IPDB_API_KEY if omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info", global = true)]
    log_level: String,

    /// Print example configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Fetch flagged IPs, score them, and persist the batch
    Ingest,
    /// Alert on the latest persisted batch
    Analyze,
    /// Ingest, then analyze
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle --print-config
    if args.print_config {
        println!("{}", Config::example());
        return Ok(());
    }

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    // Load configuration
    let config = match &args.config {
        Some(path) => {
            info!(config = %path.display(), "Loading configuration");
            Config::load(path)?
        }
        None => {
            info!("No configuration file given, using defaults and environment");
            Config::from_env()?
        }
    };

    // Handle --validate
    if args.validate {
        info!("Configuration is valid");
        return Ok(());
    }

    let monitor = ThreatMonitor::new(config)?;

    match args.command.unwrap_or(Command::Run) {
        Command::Ingest => {
            let report = monitor.ingest().await?;
            if report.listing_error.is_some() {
                warn!("Provider unavailable, persisted an empty batch");
            }
        }
        Command::Analyze => {
            report_status(monitor.analyze().status);
        }
        Command::Run => {
            report_status(monitor.run().await?.status);
        }
    }

    Ok(())
}

fn report_status(status: AnalysisStatus) {
    let signal = match status {
        AnalysisStatus::Alert => "alert",
        AnalysisStatus::Clear | AnalysisStatus::NoData => "clear",
    };
    info!(signal, "Analysis complete");
}
