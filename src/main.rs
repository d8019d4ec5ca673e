//! `dp-connector`: drive a Data-Provider connector from the command line.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use dp_connector::config::{load_config, ConnectorConfig};
use dp_connector::lifecycle::shutdown_signal;
use dp_connector::observability::{logging, metrics};
use dp_connector::{DpConnector, Shutdown, VerificationRequest};

#[derive(Parser)]
#[command(name = "dp-connector")]
#[command(about = "Resilient Data-Provider connector", long_about = None)]
struct Cli {
    /// TOML configuration file; defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one verification request and print the DP response
    Verify {
        /// JSON file holding a VerificationRequest
        #[arg(short, long)]
        payload: PathBuf,
    },
    /// Probe all targets and run the authentication self-test
    Health,
    /// Run the periodic health monitor until interrupted
    Monitor,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ConnectorConfig::default(),
    };
    logging::init_logging(&config.observability);

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let connector = DpConnector::new(config)?;

    match cli.command {
        Commands::Verify { payload } => {
            let content = std::fs::read_to_string(&payload)?;
            let request: VerificationRequest = serde_json::from_str(&content)?;

            let result = connector.verify_with_dp(&request).await;
            let stats = serde_json::to_string_pretty(&connector.stats())?;
            match result {
                Ok(response) => {
                    println!("{}", serde_json::to_string_pretty(&response)?);
                    eprintln!("{}", stats);
                }
                Err(e) => {
                    eprintln!("{}", stats);
                    eprintln!("Error: {} ({})", e.user_message(), e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Health => match connector.health_check().await {
            Ok(report) => println!("{}", serde_json::to_string_pretty(&report)?),
            Err(e) => {
                eprintln!("Unhealthy: {}", e);
                std::process::exit(1);
            }
        },
        Commands::Monitor => {
            let shutdown = Shutdown::new();
            let Some(handle) = connector.spawn_health_monitor_if_enabled(&shutdown) else {
                return Err("health monitor is disabled; set pool.monitor_enabled = true".into());
            };

            shutdown_signal().await;
            shutdown.trigger();
            handle.await?;
            println!("{}", serde_json::to_string_pretty(&connector.stats())?);
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
