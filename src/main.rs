use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use smsgwd::bootstrap;
use smsgwd::config::Config;
use smsgwd::telemetry::{init_tracing, TracingConfig};

#[derive(Parser, Debug)]
#[command(name = "smsgwd")]
#[command(author, version, about = "High-throughput SMS gateway")]
struct Args {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Validate config and exit
    #[arg(long)]
    validate: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP ingress server (balance service, accepted producer, plan cache)
    Server,
    /// Consume the accepted topic and dispatch jobs to the SMS provider
    Consume,
    /// Consume the status topic and batch-insert into the analytics store
    ConsumeStatus,
    /// Apply or revert database schemas
    Migrate {
        /// Migration direction
        #[arg(value_parser = ["up", "down"])]
        direction: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config)?;

    let tracing_config = TracingConfig {
        service_name: "smsgwd".to_string(),
        log_level: config.telemetry.log_level.clone(),
        json_logs: config.telemetry.json_logs,
    };
    init_tracing(&tracing_config)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.display(),
        "starting smsgwd"
    );

    if args.validate {
        info!("configuration is valid");
        return Ok(());
    }

    match args.command {
        Command::Server => bootstrap::server::run(config).await,
        Command::Consume => bootstrap::consume::run(config).await,
        Command::ConsumeStatus => bootstrap::consume_status::run(config).await,
        Command::Migrate { direction } => bootstrap::migrate::run(config, &direction).await,
    }
}
