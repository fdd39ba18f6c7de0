//! GPU state queries and the mode switch protocol on top of the driver
//! handle.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::SETTLE_DELAY;
use crate::driver::MuxDriver;
use crate::error::{ConfigError, ConnectError};
use crate::handle::DriverHandle;
use crate::selector::{MuxFeature, MuxState, SwitchPolicy};

/// Target state requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwitcherMode {
    #[serde(rename = "integrated")]
    ForceIntegrated,
    #[serde(rename = "discrete")]
    ForceDiscrete,
    #[serde(rename = "dynamic")]
    SetDynamic,
}

impl FromStr for SwitcherMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "integrated" => Ok(Self::ForceIntegrated),
            "discrete" => Ok(Self::ForceDiscrete),
            "dynamic" => Ok(Self::SetDynamic),
            _ => Err(ConfigError::UnknownMode(s.to_string())),
        }
    }
}

impl fmt::Display for SwitcherMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ForceIntegrated => "integrated",
            Self::ForceDiscrete => "discrete",
            Self::SetDynamic => "dynamic",
        })
    }
}

/// Snapshot for display. `None` means unknown: not connected, or the
/// driver call failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MuxStatus {
    pub connected: bool,
    pub integrated: Option<bool>,
    pub dynamic: Option<bool>,
    pub requested_mode: Option<SwitcherMode>,
}

pub type SettleFn = Box<dyn Fn(Duration) + Send>;

/// Client of the GPU mux driver.
///
/// Owns the driver connection; every method runs synchronously on the
/// calling thread. To drive it from several threads, hand it to a
/// [`SwitchWorker`](crate::worker::SwitchWorker).
pub struct GpuManager<D: MuxDriver> {
    handle: DriverHandle<D>,
    requested_mode: Option<SwitcherMode>,
    settle_delay: Duration,
    settle: SettleFn,
}

impl<D: MuxDriver> GpuManager<D> {
    pub fn new(driver: D) -> Self {
        Self {
            handle: DriverHandle::new(driver),
            requested_mode: None,
            settle_delay: SETTLE_DELAY,
            settle: Box::new(std::thread::sleep),
        }
    }

    /// Replace the blocking sleep used before a forced switch.
    pub fn with_settle_fn(mut self, settle: SettleFn) -> Self {
        self.settle = settle;
        self
    }

    pub fn connect(&mut self) -> Result<(), ConnectError> {
        self.handle.connect()
    }

    pub fn close(&mut self) -> bool {
        self.handle.close()
    }

    pub fn is_connected(&self) -> bool {
        self.handle.is_open()
    }

    /// Last mode passed to [`request_mode`](Self::request_mode), whether
    /// or not it was applied.
    pub fn requested_mode(&self) -> Option<SwitcherMode> {
        self.requested_mode
    }

    /// `Some(true)` while the integrated GPU is active, `None` if that
    /// cannot be determined.
    pub fn integrated_gpu_state(&self) -> Option<bool> {
        let client = self.handle.client()?;
        client.get_gpu_state(MuxState::GraphicsCard).map(|v| v != 0)
    }

    pub fn dynamic_switching_state(&self) -> Option<bool> {
        let client = self.handle.client()?;
        client.get_gpu_state(MuxState::GpuSelect).map(|v| v != 0)
    }

    /// False when disconnected or when the query fails.
    pub fn is_using_integrated_gpu(&self) -> bool {
        self.integrated_gpu_state().unwrap_or(false)
    }

    /// Exactly one of the two GPUs is active, so this is the negation of
    /// [`is_using_integrated_gpu`](Self::is_using_integrated_gpu).
    pub fn is_using_dedicated_gpu(&self) -> bool {
        !self.is_using_integrated_gpu()
    }

    pub fn is_using_dynamic_switching(&self) -> bool {
        self.dynamic_switching_state().unwrap_or(false)
    }

    pub fn status(&self) -> MuxStatus {
        MuxStatus {
            connected: self.is_connected(),
            integrated: self.integrated_gpu_state(),
            dynamic: self.dynamic_switching_state(),
            requested_mode: self.requested_mode,
        }
    }

    /// Move the mux towards `mode`. Returns false without touching the
    /// driver when no connection is open.
    ///
    /// Forcing a GPU blocks the calling thread for the settle delay.
    pub fn request_mode(&mut self, mode: SwitcherMode) -> bool {
        self.requested_mode = Some(mode);
        if !self.handle.is_open() {
            log::warn!("Cannot switch to {mode}: no driver connection");
            return false;
        }

        match mode {
            SwitcherMode::ForceIntegrated => {
                let integrated = self.is_using_integrated_gpu();
                log::info!("Requesting integrated, are we integrated? {integrated}");
                integrated || self.force_switch()
            }
            SwitcherMode::ForceDiscrete => {
                let discrete = self.is_using_dedicated_gpu();
                log::info!("Requesting discrete, are we discrete? {discrete}");
                discrete || self.force_switch()
            }
            SwitcherMode::SetDynamic => self.restore_dynamic(),
        }
    }

    /// Dynamic off, settle, then the untargeted force switch.
    fn force_switch(&self) -> bool {
        let Some(client) = self.handle.client() else {
            return false;
        };
        let _ = client.set_dynamic_switching(false);
        log::debug!("Waiting {:?} for the mux to settle", self.settle_delay);
        (self.settle)(self.settle_delay);
        client.force_switch()
    }

    /// Put the policy back so the machine behaves like an auto-switching
    /// one again. Only the final call decides the outcome.
    fn restore_dynamic(&self) -> bool {
        let Some(client) = self.handle.client() else {
            return false;
        };
        let _ = client.set_feature(MuxFeature::Policy, true);
        let _ = client.set_switch_policy(SwitchPolicy::Dynamic);
        client.set_dynamic_switching(true)
    }
}
