//! Protocol constants of the graphics control user client and the scalar
//! call shapes used to talk to it.

use std::fmt;

use crate::driver::{KernReturn, MuxDriver};

/// User-client method numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum DispatchSelector {
    Open = 0,
    Close = 1,
    SetMuxState = 2,
    GetMuxState = 3,
    SetExclusive = 4,
    DumpState = 5,
    UploadEdid = 6,
    GetAgcData = 7,
    GetAgcDataLog1 = 8,
    GetAgcDataLog2 = 9,
}

/// State codes carried in the second scalar of a mux state call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum MuxState {
    /// Set: clear the feature bits given as argument.
    DisableFeature = 0,
    /// Set: raise the feature bits given as argument.
    EnableFeature = 1,
    /// Set: switch away from the dynamically selected GPU.
    ForceSwitch = 2,
    PowerGpu = 3,
    /// Set/get: dynamic switching on (1) or off (0).
    GpuSelect = 4,
    SwitchPolicy = 5,
    DeviceSwitch = 6,
    /// Get: nonzero while the integrated GPU drives the display.
    GraphicsCard = 7,
    GraphicsCardVendor = 8,
}

impl MuxState {
    /// Get: bitmask of enabled [`MuxFeature`]s.
    pub const FEATURE_INFO: MuxState = MuxState::DisableFeature;
    pub const FEATURE_INFO_2: MuxState = MuxState::EnableFeature;
}

/// Bit positions of driver features.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MuxFeature {
    Policy = 0,
    AutoPowerDownGpu = 1,
    DynamicSwitching = 2,
    /// Inverted: disabling the feature turns polling on.
    GpuPowerpolling = 3,
    DeferPolicy = 4,
    SynchronousLaunch = 5,
    BacklightControl = 8,
    RecoveryTimeouts = 9,
    PowerSwitchDebounce = 10,
    Logging = 16,
    DisplayCaptureSwitch = 17,
    NoGlHdaBusyIdleRegistration = 18,
}

impl MuxFeature {
    pub fn mask(self) -> u64 {
        1 << self as u8
    }
}

/// Argument of the switch policy call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum SwitchPolicy {
    /// Dynamic switching as configured in system settings.
    Dynamic = 0,
    /// Old-style switching that requires a logout.
    Legacy = 2,
}

/// `[argument count, state, argument]`
pub fn set_args(state: MuxState, arg: u64) -> [u64; 3] {
    [1, state as u64, arg]
}

/// `[argument count, state]`
pub fn get_args(state: MuxState) -> [u64; 2] {
    [1, state as u64]
}

impl fmt::Display for MuxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, *self as u64)
    }
}

/// An open connection paired with the driver that serves it.
pub struct MuxClient<'a, D: MuxDriver> {
    driver: &'a D,
    connection: &'a D::Connection,
}

impl<'a, D: MuxDriver> MuxClient<'a, D> {
    pub(crate) fn new(driver: &'a D, connection: &'a D::Connection) -> Self {
        Self { driver, connection }
    }

    /// Selector call without scalar arguments (open/close handshake).
    pub fn call(&self, selector: DispatchSelector) -> Result<(), KernReturn> {
        self.driver
            .call_scalar_method(self.connection, selector as u32, &[], &mut [])
            .map(|_| ())
    }

    /// Send `[1, state, arg]` through `SetMuxState`.
    pub fn set_gpu_state(&self, state: MuxState, arg: u64) -> bool {
        let input = set_args(state, arg);
        match self.driver.call_scalar_method(
            self.connection,
            DispatchSelector::SetMuxState as u32,
            &input,
            &mut [],
        ) {
            Ok(_) => {
                log::info!("Successfully set state {state} = {arg}");
                true
            }
            Err(status) => {
                log::warn!("Set state {state} = {arg} returned {status}");
                false
            }
        }
    }

    /// Send `[1, state]` through `GetMuxState` and read one scalar back.
    ///
    /// `None` when the call fails or the driver does not hand back exactly
    /// one scalar. Callers that want the driver's own convention of
    /// reading a failure as zero use `.unwrap_or(0)`.
    pub fn get_gpu_state(&self, state: MuxState) -> Option<u64> {
        let input = get_args(state);
        let mut output = [0u64; 1];
        match self.driver.call_scalar_method(
            self.connection,
            DispatchSelector::GetMuxState as u32,
            &input,
            &mut output,
        ) {
            Ok(count) if count != 1 => {
                log::warn!("Get state {state} returned {count} scalars, expected 1");
                None
            }
            Ok(count) => {
                log::debug!(
                    "Successfully got state {state}, count {count}, value {}",
                    output[0]
                );
                Some(output[0])
            }
            Err(status) => {
                log::warn!("Get state {state} returned {status}");
                None
            }
        }
    }

    pub fn set_feature(&self, feature: MuxFeature, enabled: bool) -> bool {
        let state = if enabled {
            MuxState::EnableFeature
        } else {
            MuxState::DisableFeature
        };
        self.set_gpu_state(state, feature.mask())
    }

    pub fn set_switch_policy(&self, policy: SwitchPolicy) -> bool {
        self.set_gpu_state(MuxState::SwitchPolicy, policy as u64)
    }

    pub fn set_dynamic_switching(&self, enabled: bool) -> bool {
        self.set_gpu_state(MuxState::GpuSelect, u64::from(enabled))
    }

    /// The driver takes no target here: it switches away from whatever
    /// card dynamic switching had selected.
    pub fn force_switch(&self) -> bool {
        self.set_gpu_state(MuxState::ForceSwitch, 0)
    }
}
