//! CLI entry point for quickDAQ
//!
//! Drives a session against the simulated provider described by the
//! `simulation` section of the configuration:
//! - `devices` prints the enumerated device table
//! - `terminals` lists the routable terminals of one device
//! - `config` prints the effective configuration as TOML
//! - `demo` binds analog loopback pins and runs a hardware-timed loop
//!
//! # Usage
//!
//! ```bash
//! quickdaq --config config/quickdaq.toml devices
//! quickdaq demo --cycles 20
//! ```
//!
//! Library errors end the process with their quickDAQ exit code.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use quick_daq::logging;
use quick_daq::{
    DaqConfig, IoMode, QuickDaqError, Session, SimulatedDevice, SimulatedProvider,
};
use tracing::info;

#[derive(Parser)]
#[command(name = "quickdaq")]
#[command(about = "pinMode-style data acquisition on simulated hardware", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = quick_daq::config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enumerate devices and print the device table
    Devices,

    /// List the terminals of a device
    Terminals {
        /// Numeric device id
        device: u32,
    },

    /// Print the effective configuration
    Config,

    /// Write a ramp on analog outputs and read it back on a loopback device
    Demo {
        /// Number of sample clock cycles
        #[arg(long, default_value = "10")]
        cycles: u32,

        /// Number of analog pins to bind
        #[arg(long, default_value = "2")]
        pins: u32,
    },
}

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {err:#}");
        let code = err
            .downcast_ref::<QuickDaqError>()
            .map_or(1, QuickDaqError::exit_code);
        std::process::exit(code);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let config = DaqConfig::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    config.validate()?;
    logging::init_from_config(&config).map_err(anyhow::Error::msg)?;

    match cli.command {
        Commands::Devices => list_devices(config),
        Commands::Terminals { device } => list_terminals(config, device),
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
        Commands::Demo { cycles, pins } => run_demo(config, cycles, pins),
    }
}

fn provider_for(config: &DaqConfig) -> SimulatedProvider {
    if config.simulation.devices.is_empty() {
        // Bench rig used when the configuration lists no devices.
        SimulatedProvider::new(vec![
            SimulatedDevice::new(format!("{}2", config.device_prefix))
                .product_type("PXIe-6363")
                .channels(IoMode::AnalogIn, 8)
                .channels(IoMode::AnalogOut, 4)
                .channels(IoMode::DigitalOut, 2)
                .loopback(true),
            SimulatedDevice::new(format!("{}3", config.device_prefix))
                .product_type("PXI-6602")
                .channels(IoMode::CounterAngleIn, 8)
                .channels(IoMode::CounterTickOut, 8),
        ])
    } else {
        SimulatedProvider::from_config(config)
    }
}

fn list_devices(config: DaqConfig) -> Result<()> {
    let mut session = Session::new(provider_for(&config), config);
    session.initialize()?;
    if let Some(catalog) = session.catalog() {
        println!("{catalog}");
    }
    session.terminate()?;
    Ok(())
}

fn list_terminals(config: DaqConfig, device: u32) -> Result<()> {
    let mut session = Session::new(provider_for(&config), config);
    for (i, terminal) in session.enumerate_terminals(device)?.iter().enumerate() {
        println!("Terminal {}: {}", i + 1, terminal);
    }
    Ok(())
}

fn run_demo(config: DaqConfig, cycles: u32, pins: u32) -> Result<()> {
    let mut session = Session::new(provider_for(&config), config);
    session.initialize()?;

    let device = session
        .catalog()
        .and_then(|catalog| {
            catalog.devices().find(|d| {
                d.channel_count(IoMode::AnalogIn) >= pins
                    && d.channel_count(IoMode::AnalogOut) >= pins
            })
        })
        .map(|d| d.id())
        .context("no device with enough analog loopback channels")?;

    for pin in 0..pins {
        session.set_pin_mode(device, IoMode::AnalogIn, pin)?;
        session.set_pin_mode(device, IoMode::AnalogOut, pin)?;
    }
    session.configure_sampling_from_config()?;
    session.start()?;
    info!(device, pins, clock = %session.clock_source(), "Demo running");

    for cycle in 0..cycles {
        session.sync_sampling()?;
        for pin in 0..pins {
            let volts = f64::from(cycle) * 0.1 + f64::from(pin);
            session.set_analog_out_pin(device, pin, volts)?;
        }
        session.write_analog(device)?;
        session.read_analog(device)?;

        let readings: Vec<String> = (0..pins)
            .map(|pin| match session.get_analog_in_pin(device, pin) {
                Ok(Some(v)) => format!("{v:7.3}"),
                _ => "    ---".to_string(),
            })
            .collect();
        println!("cycle {cycle:>4} | {}", readings.join(" | "));
    }

    session.stop()?;
    session.terminate()?;
    Ok(())
}
