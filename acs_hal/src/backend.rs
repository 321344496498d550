//! Backend registry and bus construction from `station.toml`.
//!
//! Built at startup and passed around by value; no global state.

use std::collections::HashMap;

use acs_common::config::{CanBackend, CanSettings, SerialBackend, SerialSettings, TimingSettings};
use acs_common::consts::PORT_COUNT;
use tracing::{info, warn};

use crate::can::sim::SimCanController;
use crate::can::{CanController, CanTransport};
use crate::error::BusError;
use crate::serial::SerialMotorBus;
use crate::serial::sim::SimRoboClaw;
use crate::serial::{RoboClawDriver, bridge, device};

/// Factory producing a fresh CAN controller backend from `[can]`.
pub type CanControllerFactory = fn(&CanSettings) -> Box<dyn CanController>;

fn simulation_can(_settings: &CanSettings) -> Box<dyn CanController> {
    Box::new(SimCanController::new())
}

#[cfg(target_os = "linux")]
fn socketcan_can(settings: &CanSettings) -> Box<dyn CanController> {
    Box::new(crate::can::socket::SocketCanController::new(
        settings.interface.as_str(),
    ))
}

/// Registry name for a configured CAN backend.
pub const fn can_backend_name(backend: CanBackend) -> &'static str {
    match backend {
        CanBackend::Simulation => "simulation",
        CanBackend::SocketCan => "socketcan",
    }
}

/// Registry of CAN controller backends.
pub struct BackendRegistry {
    can: HashMap<&'static str, CanControllerFactory>,
}

impl BackendRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            can: HashMap::new(),
        }
    }

    /// Registry with every built-in backend for this platform.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.can.insert("simulation", simulation_can);
        #[cfg(target_os = "linux")]
        registry.can.insert("socketcan", socketcan_can);
        registry
    }

    /// Register a CAN controller factory.
    ///
    /// # Errors
    ///
    /// `BusError::InitFailed` if the name is taken.
    pub fn register_can(
        &mut self,
        name: &'static str,
        factory: CanControllerFactory,
    ) -> Result<(), BusError> {
        if self.can.contains_key(name) {
            return Err(BusError::InitFailed(format!(
                "CAN backend '{name}' is already registered"
            )));
        }
        self.can.insert(name, factory);
        Ok(())
    }

    /// Create a CAN controller by name.
    ///
    /// # Errors
    ///
    /// `BusError::BackendNotFound` for unknown names.
    pub fn create_can(
        &self,
        name: &str,
        settings: &CanSettings,
    ) -> Result<Box<dyn CanController>, BusError> {
        let factory = self
            .can
            .get(name)
            .ok_or_else(|| BusError::BackendNotFound(name.to_string()))?;
        Ok(factory(settings))
    }

    /// Registered CAN backend names, sorted.
    pub fn list_can(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.can.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

fn open_link(
    settings: &SerialSettings,
    target: &str,
) -> Result<Box<dyn RoboClawDriver>, BusError> {
    let driver: Box<dyn RoboClawDriver> = match settings.backend {
        SerialBackend::Simulation => Box::new(SimRoboClaw::new()),
        SerialBackend::Bridge => Box::new(bridge::connect(target, settings.timeout_ms)?),
        SerialBackend::Native => Box::new(device::open(
            target,
            settings.baud,
            settings.timeout_ms,
        )?),
    };
    Ok(driver)
}

/// Bind a driver to every serial port with a backing.
///
/// Bridge and device ports that fail to open stay unbound with a warning.
///
/// # Errors
///
/// `BusError::PortOutOfRange` for a binding outside `1..=PORT_COUNT`.
pub fn build_serial_bus(settings: &SerialSettings) -> Result<SerialMotorBus, BusError> {
    let mut bus = SerialMotorBus::new();
    if settings.backend == SerialBackend::Simulation {
        for index in 0..PORT_COUNT {
            bus.bind(index, Box::new(SimRoboClaw::new()))?;
        }
    } else {
        for binding in &settings.ports {
            let index = usize::from(binding.port)
                .checked_sub(1)
                .ok_or(BusError::PortOutOfRange(0))?;
            let target = binding.target(settings.backend).unwrap_or_default();
            match open_link(settings, target) {
                Ok(driver) => bus.bind(index, driver)?,
                Err(e) => warn!("SER: port {} left unbound: {e}", binding.port),
            }
        }
    }
    info!(
        "SER: {} of {} ports bound ({:?})",
        bus.bound_count(),
        PORT_COUNT,
        settings.backend
    );
    Ok(bus)
}

/// Create and start the configured CAN transport.
///
/// # Errors
///
/// Unknown backend or controller start failure.
pub fn build_can_transport(
    registry: &BackendRegistry,
    settings: &CanSettings,
    timing: &TimingSettings,
) -> Result<CanTransport, BusError> {
    let controller = registry.create_can(can_backend_name(settings.backend), settings)?;
    CanTransport::new(controller, settings, timing)
}
