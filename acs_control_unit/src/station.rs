//! Station: the owned set of buses, tables and clocks driven by the cycle.
//!
//! One [`Station::tick`] runs every subsystem once, in this order:
//!
//! ```text
//!   CAN events ─▶ RX frames ─▶ CAN error log ─▶ status poll ─▶ sequence update
//! ```
//!
//! Operator commands run between ticks against the time of the last tick.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use acs_common::config::{ConfigError, PathSettings, StationConfig, TimingSettings};
use acs_common::consts::{MAX_ENDPOINTS, PORT_COUNT};
use acs_common::endpoint::{AppConfig, EndpointConfig};
use acs_common::endpoint_csv::{load_endpoint_csv, save_endpoint_csv};
use acs_common::mks;
use acs_common::persist::ConfigStore;
use acs_common::sequence::{Mode, SequenceEvent};
use acs_common::units;
use acs_hal::backend::{BackendRegistry, build_can_transport, build_serial_bus};
use acs_hal::can::CanTransport;
use acs_hal::error::BusError;
use acs_hal::poller::StatusPoller;
use acs_hal::serial::SerialMotorBus;
use thiserror::Error;
use tracing::{info, warn};

use crate::command::{Command, CommandError, CommandExecutor, Motion, Response};
use crate::dispatch::dispatch;
use crate::sequence::file::default_animation;
use crate::sequence::{PlayerState, SequenceError, SequencePlayer, load_sequence, save_sequence};
use crate::show::ShowClock;

/// Startup failures.
#[derive(Debug, Error)]
pub enum StationError {
    /// Runtime config rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A bus could not be brought up.
    #[error(transparent)]
    Bus(#[from] BusError),
}

/// Everything the main cycle owns.
pub struct Station {
    config: AppConfig,
    store: ConfigStore,
    paths: PathSettings,
    serial: SerialMotorBus,
    can: CanTransport,
    poller: StatusPoller,
    player: SequencePlayer,
    show: ShowClock,
    now_us: u64,
}

impl Station {
    /// Assemble a station from already-built parts.
    pub fn new(
        config: AppConfig,
        paths: PathSettings,
        serial: SerialMotorBus,
        can: CanTransport,
        timing: &TimingSettings,
    ) -> Self {
        Self {
            config,
            store: ConfigStore::new(paths.config_blob.clone()),
            paths,
            serial,
            can,
            poller: StatusPoller::new(timing.status_poll_period_ms),
            player: SequencePlayer::new(),
            show: ShowClock::new(),
            now_us: 0,
        }
    }

    /// Bring up buses and load the endpoint table and sequence from disk.
    ///
    /// The endpoint table comes from the blob (defaults when rejected), then
    /// the endpoint CSV overrides it when present. A missing sequence file
    /// loads the built-in animation.
    ///
    /// # Errors
    ///
    /// Invalid runtime config or a bus that fails to start.
    pub fn from_config(
        station: &StationConfig,
        registry: &BackendRegistry,
    ) -> Result<Self, StationError> {
        station.validate()?;
        let serial = build_serial_bus(&station.serial)?;
        let can = build_can_transport(registry, &station.can, &station.timing)?;

        let store = ConfigStore::new(station.paths.config_blob.clone());
        let mut config = store.load_or_default();
        match load_endpoint_csv(&station.paths.endpoints_csv, &mut config) {
            Ok(_) => {}
            Err(ConfigError::FileNotFound) => info!(
                "CFG: no endpoint CSV at {}",
                station.paths.endpoints_csv.display()
            ),
            Err(e) => warn!("CFG: endpoint CSV ignored: {e}"),
        }

        let mut this = Self::new(
            config,
            station.paths.clone(),
            serial,
            can,
            &station.timing,
        );
        this.load_startup_sequence();
        Ok(this)
    }

    fn load_startup_sequence(&mut self) {
        let path = self.paths.sequence_csv.clone();
        match load_sequence(&path, &mut self.player) {
            Ok(_) => {}
            Err(SequenceError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                info!("SEQ: no {}, using built-in animation", path.display());
                self.player.load(&default_animation());
            }
            Err(e) => warn!("SEQ: {}: {e}", path.display()),
        }
    }

    // ─── Cycle ──────────────────────────────────────────────────────

    /// Run every subsystem once. Returns the number of events dispatched.
    pub fn tick(&mut self, now_us: u64) -> usize {
        self.now_us = now_us;
        let now_ms = self.now_ms();

        self.can.events();
        self.can.process_rx_frames(now_ms);
        self.can.log_error_counters(now_ms);
        self.poller
            .poll(now_ms, &self.config, &mut self.serial, &mut self.can);

        let show_ms = self.show.current_ms(now_us);
        self.player
            .update(show_ms, &self.config, &mut self.serial, &mut self.can)
    }

    fn now_ms(&self) -> u32 {
        (self.now_us / 1000) as u32
    }

    // ─── Accessors ──────────────────────────────────────────────────

    /// Endpoint table.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Sequence player.
    pub fn player(&self) -> &SequencePlayer {
        &self.player
    }

    /// Sequence player, for editing.
    pub fn player_mut(&mut self) -> &mut SequencePlayer {
        &mut self.player
    }

    /// Show clock.
    pub fn show(&self) -> &ShowClock {
        &self.show
    }

    /// Status poller.
    pub fn poller(&self) -> &StatusPoller {
        &self.poller
    }

    /// CAN transport.
    pub fn can(&self) -> &CanTransport {
        &self.can
    }

    // ─── Command helpers ────────────────────────────────────────────

    fn endpoint(&self, id: u8) -> Result<EndpointConfig, CommandError> {
        self.config
            .endpoint(id)
            .copied()
            .ok_or(CommandError::InvalidEndpoint(id))
    }

    fn replace_endpoint(&mut self, id: u8, ep: EndpointConfig) -> Result<Response, CommandError> {
        self.config.set_endpoint(id, ep)?;
        self.poller.clear();
        Ok(Response::Endpoint { id, config: ep })
    }

    fn replace_config(&mut self, config: AppConfig) {
        self.config = config;
        self.poller.clear();
    }

    fn path_or(path: Option<PathBuf>, default: &Path) -> PathBuf {
        path.unwrap_or_else(|| default.to_path_buf())
    }

    fn set_playing(&mut self, playing: bool) -> Result<Response, CommandError> {
        if playing {
            if self.player.state() != PlayerState::Playing && !self.player.play() {
                return Err(CommandError::NoSequence);
            }
        } else {
            self.player.stop();
        }
        self.show.set_playing(playing, self.now_us);
        info!("SHOW: {}", if playing { "play" } else { "pause" });
        Ok(Response::Ok)
    }

    fn rewind(&mut self) {
        self.player.stop();
        self.player.reset();
        self.show.rewind();
    }

    fn stop_in_place(&mut self, id: u8) -> Result<Response, CommandError> {
        let ep = self.endpoint(id)?;
        if !ep.enabled {
            return Err(CommandError::Disabled(id));
        }
        let raw = self
            .poller
            .status(id)
            .and_then(|s| s.position)
            .ok_or(CommandError::NoStatus(id))?;
        // CAN dispatch converts engineering units, so convert the pulse count back.
        let position = if ep.kind.is_can() {
            units::pulses_to_degrees(raw, &ep).round() as i32
        } else {
            raw
        };
        let event = SequenceEvent {
            time_ms: 0,
            endpoint_id: id,
            position,
            velocity: ep.velocity_max,
            accel: ep.accel_max,
            mode: Mode::Position,
        };
        match dispatch(&event, &self.config, &mut self.serial, &mut self.can) {
            outcome if outcome.is_delivered() => Ok(Response::Ok),
            outcome => Err(CommandError::Device(format!("stop in place: {outcome:?}"))),
        }
    }

    fn port_index(port: u8) -> Result<usize, CommandError> {
        let port = usize::from(port);
        if (1..=PORT_COUNT).contains(&port) {
            Ok(port - 1)
        } else {
            Err(CommandError::Device(format!(
                "port {port} out of range [1, {PORT_COUNT}]"
            )))
        }
    }

    fn serial_command(
        &mut self,
        port: u8,
        address: u8,
        motor: u8,
        motion: Motion,
    ) -> Result<Response, CommandError> {
        let index = Self::port_index(port)?;
        let ok = match motion.mode {
            Mode::Velocity => {
                self.serial
                    .command_velocity(index, address, motor, motion.velocity, motion.accel)
            }
            Mode::Position => self.serial.command_position(
                index,
                address,
                motor,
                motion.position,
                motion.velocity,
                motion.accel,
            ),
        };
        if ok {
            Ok(Response::Ok)
        } else {
            Err(CommandError::Device(format!(
                "serial port {port} addr 0x{address:02X} motor {motor}: no ack"
            )))
        }
    }

    fn can_command(&mut self, can_id: u16, motion: Motion) -> Result<Response, CommandError> {
        let speed = motion.velocity.min(u32::from(mks::MAX_SPEED_RPM)) as u16;
        let accel = motion.accel.min(u32::from(mks::MAX_ACCEL)) as u8;
        let id = u32::from(can_id);
        let sent = match motion.mode {
            Mode::Velocity => mks::pack_velocity(id, speed, accel, motion.position < 0)
                .map(|frame| self.can.send(id, &frame)),
            Mode::Position => mks::pack_position(id, speed, accel, motion.position)
                .map(|frame| self.can.send(id, &frame)),
        }
        .map_err(|e| CommandError::Device(e.to_string()))?;
        if sent {
            Ok(Response::Ok)
        } else {
            Err(CommandError::Device(format!("CAN 0x{can_id:03X}: send failed")))
        }
    }
}

impl CommandExecutor for Station {
    fn execute(&mut self, command: Command) -> Result<Response, CommandError> {
        match command {
            Command::GetEndpoint(id) => Ok(Response::Endpoint {
                id,
                config: self.endpoint(id)?,
            }),
            Command::SetEndpoint { id, field } => {
                let mut ep = self.endpoint(id)?;
                field.apply(&mut ep);
                self.replace_endpoint(id, ep)
            }
            Command::SetEnabled { id, enabled } => {
                let mut ep = self.endpoint(id)?;
                ep.enabled = enabled;
                self.replace_endpoint(id, ep)
            }
            Command::SaveConfig => {
                self.store.save(&self.config)?;
                Ok(Response::Ok)
            }
            Command::ResetConfig => {
                let config = self.store.load_or_default();
                self.replace_config(config);
                Ok(Response::Ok)
            }
            Command::FactoryReset => {
                let config = AppConfig::default();
                self.store.save(&config)?;
                self.replace_config(config);
                info!("CFG: factory defaults restored");
                Ok(Response::Ok)
            }
            Command::LoadEndpoints(path) => {
                let path = Self::path_or(path, &self.paths.endpoints_csv);
                let report = load_endpoint_csv(&path, &mut self.config)?;
                self.poller.clear();
                Ok(Response::Count(report.applied))
            }
            Command::SaveEndpoints(path) => {
                let path = Self::path_or(path, &self.paths.endpoints_csv);
                save_endpoint_csv(&path, &self.config)?;
                Ok(Response::Count(MAX_ENDPOINTS))
            }
            Command::LoadSequence(path) => {
                let path = Self::path_or(path, &self.paths.sequence_csv);
                self.rewind();
                let count = load_sequence(&path, &mut self.player)?;
                Ok(Response::Count(count))
            }
            Command::SaveSequence(path) => {
                let path = Self::path_or(path, &self.paths.sequence_csv);
                save_sequence(&path, self.player.events())?;
                Ok(Response::Count(self.player.len()))
            }
            Command::SequenceInfo => Ok(Response::SequenceInfo {
                count: self.player.len(),
                loop_length_ms: self.player.loop_length_ms(),
                state: self.player.state(),
                show_time_ms: self.show.current_ms(self.now_us),
            }),
            Command::SetPlaying(playing) => self.set_playing(playing),
            Command::Rewind => {
                self.rewind();
                Ok(Response::Ok)
            }
            Command::StopInPlace(id) => self.stop_in_place(id),
            Command::EndpointStatus(id) => {
                if usize::from(id).wrapping_sub(1) >= MAX_ENDPOINTS {
                    return Err(CommandError::InvalidEndpoint(id));
                }
                self.poller
                    .status(id)
                    .map(Response::Status)
                    .ok_or(CommandError::NoStatus(id))
            }
            Command::SerialRead { port, address } => {
                let index = Self::port_index(port)?;
                self.serial
                    .read_status(index, address)
                    .map(Response::Serial)
                    .ok_or_else(|| {
                        CommandError::Device(format!(
                            "serial port {port} addr 0x{address:02X}: no response"
                        ))
                    })
            }
            Command::SerialCommand {
                port,
                address,
                motor,
                motion,
            } => self.serial_command(port, address, motor, motion),
            Command::CanRead(can_id) => {
                self.can.request_status(can_id);
                Ok(Response::Can(self.can.get_status(can_id, self.now_ms())))
            }
            Command::CanCommand { can_id, motion } => self.can_command(can_id, motion),
            Command::CanHealth => Ok(Response::Health(self.can.health())),
            Command::DumpCanLog(max) => Ok(Response::CanLog(self.can.dump_rx_log(max))),
        }
    }
}

impl std::fmt::Debug for Station {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Station")
            .field("events", &self.player.len())
            .field("state", &self.player.state())
            .field("now_us", &self.now_us)
            .finish_non_exhaustive()
    }
}
