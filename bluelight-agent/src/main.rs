/*!
 * Bluelight Daemon
 * Headless device monitoring and proximity checks
 */

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use bluelight_agent::{AgentConfig, Controller, Device, TrustedKeys, DEFAULT_CONFIG_PATH};

#[derive(Parser)]
#[command(name = "bluelightd")]
#[command(about = "Bluelight Bluetooth Proximity Agent")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover devices and log every change to the device list
    Run,
    /// Print the devices the adapter currently knows about
    List,
    /// Check whether any trusted key device is in range
    Verify,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!("bluelight_agent={},bluelightd={}", log_level, log_level))
        .init();

    let config = AgentConfig::load(&cli.config)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(&config).map(|()| ExitCode::SUCCESS),
        Commands::List => list(&config).map(|()| ExitCode::SUCCESS),
        Commands::Verify => verify(&config),
    }
}

fn run(config: &AgentConfig) -> Result<()> {
    let mut controller = Controller::connect(&config.bluetooth)?;
    let changes = controller
        .subscribe()
        .ok_or_else(|| anyhow::anyhow!("device list already has a subscriber"))?;

    controller.start_discovery()?;
    controller.update_devices();
    info!("Bluelight agent running on {}", config.bluetooth.adapter_path);

    loop {
        controller.dispatch();

        if changes.try_iter().last().is_some() {
            let devices = controller.devices();
            info!("{} devices", devices.len());
            for device in &devices {
                info!("  {}", describe(device));
            }
        }
    }
}

fn list(config: &AgentConfig) -> Result<()> {
    let mut controller = Controller::connect(&config.bluetooth)?;
    if !controller.update_devices() {
        anyhow::bail!("could not enumerate devices");
    }

    for device in controller.devices() {
        println!("{}\t{}", device.path(), describe(&device));
    }
    Ok(())
}

fn verify(config: &AgentConfig) -> Result<ExitCode> {
    let keys = TrustedKeys::load(&config.keys_path)?;
    if keys.is_empty() {
        warn!("No trusted keys in {}", config.keys_path);
        return Ok(ExitCode::FAILURE);
    }

    let mut controller = Controller::connect(&config.bluetooth)?;
    if !controller.update_devices() {
        anyhow::bail!("could not enumerate devices");
    }

    let mut present = false;
    for mut device in controller.devices() {
        if !device.is_bonded() || !keys.contains(device.address()) {
            continue;
        }
        let proximity = device.verify_proximity();
        println!("{}\t{}", device.address(), proximity);
        present |= proximity.is_present();
    }

    Ok(if present {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn describe(device: &Device) -> String {
    let rssi = device
        .rssi()
        .map(|r| format!("{} dBm", r))
        .unwrap_or_else(|| "?".to_string());
    format!(
        "{} [{}] bonded={} connected={} rssi={}",
        device.alias(),
        device.address(),
        device.is_bonded(),
        device.is_connected(),
        rssi
    )
}
