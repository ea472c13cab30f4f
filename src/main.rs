//! ledsync agent - main entry point
//!
//! Wires the MQTT session, the simulated pins, and the reconciliation
//! controller together and drives the cooperative poll loop until a
//! shutdown signal arrives.

use clap::{Parser, Subcommand};
use ledsync::attributes::AttributeKey;
use ledsync::config::AgentConfig;
use ledsync::io::{SimButton, SimLed};
use ledsync::observability::init_default_logging;
use ledsync::sync::SyncController;
use ledsync::transport::{MqttSession, Session};
use std::path::PathBuf;
use std::process;
use std::time::Instant;
use tokio::signal;
use tracing::{error, info};

/// Device-side attribute synchronization agent
#[derive(Parser)]
#[command(name = "ledsyncd")]
#[command(about = "Mirrors a boolean LED state against a remote device-management platform")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the synchronization loop
    Run,
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    info!("Starting ledsync agent v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => run_agent(config).await,
        Commands::Config { show } => handle_config_command(config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Agent shutdown complete");
}

fn load_configuration(
    config_path: &Option<PathBuf>,
) -> Result<AgentConfig, Box<dyn std::error::Error>> {
    match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Ok(AgentConfig::load_from_file(path)?)
        }
        None => {
            // Try default locations
            let default_paths = vec!["ledsync.toml", "config/ledsync.toml"];

            for path_str in default_paths {
                let path = PathBuf::from(path_str);
                if path.exists() {
                    info!("Loading configuration from: {}", path.display());
                    return Ok(AgentConfig::load_from_file(&path)?);
                }
            }

            error!(
                "No configuration file found. Please provide one with -c/--config or create ledsync.toml"
            );
            process::exit(1);
        }
    }
}

async fn run_agent(config: AgentConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!("Agent starting for device: {}", config.device.name);

    let access_token = config.get_access_token()?;
    let session = MqttSession::new(&config.device.name, config.mqtt.clone(), access_token);

    let led = SimLed::new(config.gpio.led_pin);
    let button = SimButton::new();
    info!(
        led_pin = config.gpio.led_pin,
        button_pin = config.gpio.button_pin,
        "Simulated pins configured"
    );

    let attribute_key = AttributeKey::new(config.sync.attribute_key.clone())?;
    let mut controller = SyncController::new(
        session,
        led,
        button,
        attribute_key,
        config.request_timeout(),
    );

    let mut ticker = tokio::time::interval(config.tick_interval());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    info!("Synchronization loop running");

    loop {
        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down gracefully...");
                break;
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down gracefully...");
                break;
            }
            _ = ticker.tick() => {
                controller.tick(Instant::now()).await;
            }
        }
    }

    if let Err(e) = controller.session_mut().disconnect().await {
        error!("Error during disconnect: {}", e);
    }
    Ok(())
}

fn handle_config_command(
    config: AgentConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(&config)?);
    }

    info!("Configuration validation complete");
    Ok(())
}
