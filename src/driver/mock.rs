//! In-memory mux driver and PCI registry used by the unit tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{KernReturn, MuxDriver};
use crate::devices::{DeviceRead, DeviceRegistry};
use crate::selector::{DispatchSelector, MuxState};

/// Everything the mock observed, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Match(String),
    OpenService,
    Scalar { selector: u32, input: Vec<u64> },
    CloseService,
    Settle(Duration),
}

#[derive(Debug, Default)]
pub struct MockState {
    pub service_registered: bool,
    pub matching_error: Option<KernReturn>,
    pub open_error: Option<KernReturn>,
    pub close_service_error: Option<KernReturn>,
    /// Selectors that fail with `kIOReturnError`.
    pub failing_selectors: Vec<DispatchSelector>,
    /// Mux states whose set or get fails with `kIOReturnError`.
    pub failing_states: Vec<MuxState>,
    /// Output count reported by a successful get, instead of 1.
    pub get_output_count: Option<usize>,
    pub integrated: bool,
    pub dynamic: bool,
    pub features: u64,
    pub policy: u64,
    pub open_sessions: usize,
    pub calls: Vec<Call>,
}

/// Cloneable handle onto shared mock state.
#[derive(Debug, Clone)]
pub struct MockDriver {
    pub state: Arc<Mutex<MockState>>,
}

impl MockDriver {
    /// A registered service, currently on the discrete GPU with dynamic
    /// switching enabled.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                service_registered: true,
                dynamic: true,
                ..MockState::default()
            })),
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.with(|s| s.calls.clone())
    }

    pub fn clear_calls(&self) {
        self.with(|s| s.calls.clear());
    }

    /// Scalar calls only, as `(selector, input)`.
    pub fn scalar_calls(&self) -> Vec<(u32, Vec<u64>)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Scalar { selector, input } => Some((selector, input)),
                _ => None,
            })
            .collect()
    }

    /// Settle function that records the delay instead of sleeping.
    pub fn settle_fn(&self) -> Box<dyn Fn(Duration) + Send> {
        let state = Arc::clone(&self.state);
        Box::new(move |delay| state.lock().unwrap().calls.push(Call::Settle(delay)))
    }
}

fn set_mux_state(state: &mut MockState, code: u64, arg: u64) {
    match code {
        c if c == MuxState::GpuSelect as u64 => state.dynamic = arg != 0,
        c if c == MuxState::ForceSwitch as u64 => state.integrated = !state.integrated,
        c if c == MuxState::EnableFeature as u64 => state.features |= arg,
        c if c == MuxState::DisableFeature as u64 => state.features &= !arg,
        c if c == MuxState::SwitchPolicy as u64 => state.policy = arg,
        _ => {}
    }
}

fn get_mux_state(state: &MockState, code: u64) -> u64 {
    match code {
        c if c == MuxState::GraphicsCard as u64 => u64::from(state.integrated),
        c if c == MuxState::GpuSelect as u64 => u64::from(state.dynamic),
        c if c == MuxState::FEATURE_INFO as u64 => state.features,
        c if c == MuxState::SwitchPolicy as u64 => state.policy,
        _ => 0xdead_beef,
    }
}

impl MuxDriver for MockDriver {
    type Service = ();
    type Connection = u32;

    fn matching_service(&self, class_name: &str) -> Result<Option<()>, KernReturn> {
        self.with(|s| {
            s.calls.push(Call::Match(class_name.to_string()));
            if let Some(err) = s.matching_error {
                return Err(err);
            }
            Ok(s.service_registered.then_some(()))
        })
    }

    fn open_service(&self, _service: ()) -> Result<u32, KernReturn> {
        self.with(|s| {
            s.calls.push(Call::OpenService);
            if let Some(err) = s.open_error {
                return Err(err);
            }
            s.open_sessions += 1;
            Ok(0x1000 + s.open_sessions as u32)
        })
    }

    fn call_scalar_method(
        &self,
        _connection: &u32,
        selector: u32,
        input: &[u64],
        output: &mut [u64],
    ) -> Result<usize, KernReturn> {
        self.with(|s| {
            s.calls.push(Call::Scalar {
                selector,
                input: input.to_vec(),
            });
            if s.failing_selectors.iter().any(|f| *f as u32 == selector) {
                return Err(KernReturn::ERROR);
            }
            let state_code = input.get(1).copied();
            if state_code.is_some_and(|code| s.failing_states.iter().any(|f| *f as u64 == code)) {
                return Err(KernReturn::ERROR);
            }
            match (selector, state_code) {
                (sel, Some(code)) if sel == DispatchSelector::SetMuxState as u32 => {
                    let arg = input.get(2).copied().unwrap_or_default();
                    set_mux_state(s, code, arg);
                    Ok(0)
                }
                (sel, Some(code)) if sel == DispatchSelector::GetMuxState as u32 => {
                    if let Some(count) = s.get_output_count {
                        return Ok(count);
                    }
                    let value = get_mux_state(s, code);
                    match output.first_mut() {
                        Some(slot) => {
                            *slot = value;
                            Ok(1)
                        }
                        None => Err(KernReturn::BAD_ARGUMENT),
                    }
                }
                _ => Ok(0),
            }
        })
    }

    fn close_service(&self, _connection: &u32) -> Result<(), KernReturn> {
        self.with(|s| {
            s.calls.push(Call::CloseService);
            if let Some(err) = s.close_service_error {
                return Err(err);
            }
            s.open_sessions = s.open_sessions.saturating_sub(1);
            Ok(())
        })
    }
}

/// Fixed list of PCI device reads.
#[derive(Debug, Default)]
pub struct MockRegistry {
    pub enumeration_error: Option<KernReturn>,
    pub devices: Vec<DeviceRead>,
}

impl DeviceRegistry for MockRegistry {
    fn pci_devices(&self) -> Result<Vec<DeviceRead>, KernReturn> {
        match self.enumeration_error {
            Some(err) => Err(err),
            None => Ok(self.devices.clone()),
        }
    }
}
