//! # ACS Control Unit Binary
//!
//! Runs the Animation Control Station main cycle.
//!
//! # Usage
//!
//! ```bash
//! # Simulation buses, defaults for everything
//! acs_control_unit
//!
//! # Explicit station config, start playing immediately
//! acs_control_unit --config config/station.toml --play
//!
//! # Verbose JSON logs
//! acs_control_unit -v --json
//! ```

#![deny(warnings)]

use std::path::PathBuf;
use std::sync::atomic::Ordering;

use acs_common::config::{ConfigError, ConfigLoader, LogLevel, StationConfig};
use acs_common::consts::DEFAULT_STATION_CONFIG;
use acs_control_unit::{Command, CommandExecutor, CycleRunner, Station};
use acs_hal::backend::BackendRegistry;
use clap::Parser;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Animation Control Station - sequence playback over serial and CAN motor buses
#[derive(Parser, Debug)]
#[command(name = "acs_control_unit")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Animation Control Station: sequence playback over serial and CAN motor buses")]
#[command(long_about = None)]
struct Args {
    /// Path to the station runtime config (station.toml).
    #[arg(short, long, default_value = DEFAULT_STATION_CONFIG)]
    config: PathBuf,

    /// Start show playback right after startup.
    #[arg(short, long)]
    play: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn main() {
    if let Err(e) = run() {
        error!("FATAL: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let loaded = StationConfig::load(&args.config);
    let log_level = loaded
        .as_ref()
        .map_or(LogLevel::default(), |cfg| cfg.shared.log_level);
    setup_tracing(&args, log_level);

    info!("ACS Control Unit v{} starting...", env!("CARGO_PKG_VERSION"));

    let station_config = match loaded {
        Ok(cfg) => cfg,
        Err(ConfigError::FileNotFound) => {
            warn!("{} not found, using defaults", args.config.display());
            StationConfig::default()
        }
        Err(e) => return Err(e.into()),
    };
    info!(
        "Service '{}', serial={:?}, can={:?}/{:?}",
        station_config.shared.service_name,
        station_config.serial.backend,
        station_config.can.backend,
        station_config.can.rx_mode
    );

    let registry = BackendRegistry::with_builtin();
    let station = Station::from_config(&station_config, &registry)?;
    let mut runner = CycleRunner::new(station, station_config.timing.cycle_time_us);

    let running = runner.running_flag();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        running.store(false, Ordering::SeqCst);
    })?;

    if args.play {
        runner.station_mut().execute(Command::SetPlaying(true))?;
    }

    runner.run();

    info!("ACS Control Unit shutdown complete");
    Ok(())
}

/// Setup tracing subscriber based on CLI arguments and the configured level.
fn setup_tracing(args: &Args, log_level: LogLevel) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        log_level.as_directive().parse().unwrap_or(Level::INFO)
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
