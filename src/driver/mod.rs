//! Boundary to the kernel GPU mux driver.
//!
//! Everything the rest of the crate knows about the operating system goes
//! through [`MuxDriver`]: find the graphics control service, open a user
//! client on it, issue scalar method calls, and close it again. The macOS
//! implementation talks to IOKit; other targets get a driver that never
//! finds a service.

use std::fmt;

#[cfg(target_os = "macos")]
pub mod iokit;
#[cfg(test)]
pub mod mock;

/// Status code returned by a kernel call (`kern_return_t` / `IOReturn`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KernReturn(pub i32);

// IOReturn codes are `sys_iokit | sub_iokit_common | code`.
const fn iokit_common(code: u32) -> KernReturn {
    KernReturn((0xe000_0000 | code) as i32)
}

impl KernReturn {
    pub const SUCCESS: KernReturn = KernReturn(0);
    pub const ERROR: KernReturn = iokit_common(0x2bc);
    pub const NO_MEMORY: KernReturn = iokit_common(0x2bd);
    pub const NO_RESOURCES: KernReturn = iokit_common(0x2be);
    pub const NO_DEVICE: KernReturn = iokit_common(0x2c0);
    pub const NOT_PRIVILEGED: KernReturn = iokit_common(0x2c1);
    pub const BAD_ARGUMENT: KernReturn = iokit_common(0x2c2);
    pub const EXCLUSIVE_ACCESS: KernReturn = iokit_common(0x2c5);
    pub const UNSUPPORTED: KernReturn = iokit_common(0x2c7);
    pub const NOT_OPEN: KernReturn = iokit_common(0x2cd);
    pub const BUSY: KernReturn = iokit_common(0x2d5);
    pub const NOT_PERMITTED: KernReturn = iokit_common(0x2e2);

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }

    /// Turn a raw status into `Ok(())` or `Err(self)`.
    pub fn into_result(self) -> Result<(), KernReturn> {
        if self.is_success() { Ok(()) } else { Err(self) }
    }

    fn name(self) -> Option<&'static str> {
        let name = match self {
            Self::SUCCESS => "KERN_SUCCESS",
            Self::ERROR => "kIOReturnError",
            Self::NO_MEMORY => "kIOReturnNoMemory",
            Self::NO_RESOURCES => "kIOReturnNoResources",
            Self::NO_DEVICE => "kIOReturnNoDevice",
            Self::NOT_PRIVILEGED => "kIOReturnNotPrivileged",
            Self::BAD_ARGUMENT => "kIOReturnBadArgument",
            Self::EXCLUSIVE_ACCESS => "kIOReturnExclusiveAccess",
            Self::UNSUPPORTED => "kIOReturnUnsupported",
            Self::NOT_OPEN => "kIOReturnNotOpen",
            Self::BUSY => "kIOReturnBusy",
            Self::NOT_PERMITTED => "kIOReturnNotPermitted",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for KernReturn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name} ({:#010x})", self.0 as u32),
            None => write!(f, "{:#010x}", self.0 as u32),
        }
    }
}

/// Operations the mux client needs from the operating system.
///
/// `Connection` is the privileged token. It is deliberately not required
/// to be `Clone`: the [`DriverHandle`](crate::handle::DriverHandle) is its
/// only owner.
pub trait MuxDriver {
    type Service;
    type Connection;

    /// First service registered under `class_name`, if any.
    fn matching_service(&self, class_name: &str) -> Result<Option<Self::Service>, KernReturn>;

    /// Open a user-client session. The service object is consumed and
    /// released whether or not the open succeeds.
    fn open_service(&self, service: Self::Service) -> Result<Self::Connection, KernReturn>;

    /// Synchronous scalar method call. Returns how many entries of
    /// `output` the driver filled in.
    fn call_scalar_method(
        &self,
        connection: &Self::Connection,
        selector: u32,
        input: &[u64],
        output: &mut [u64],
    ) -> Result<usize, KernReturn>;

    /// Release the user-client session.
    fn close_service(&self, connection: &Self::Connection) -> Result<(), KernReturn>;
}

/// Driver for targets without a graphics mux: there is never a service.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedDriver;

impl MuxDriver for UnsupportedDriver {
    type Service = ();
    type Connection = ();

    fn matching_service(&self, class_name: &str) -> Result<Option<()>, KernReturn> {
        log::debug!("no {class_name} service on this platform");
        Ok(None)
    }

    fn open_service(&self, _service: ()) -> Result<(), KernReturn> {
        Err(KernReturn::UNSUPPORTED)
    }

    fn call_scalar_method(
        &self,
        _connection: &(),
        _selector: u32,
        _input: &[u64],
        _output: &mut [u64],
    ) -> Result<usize, KernReturn> {
        Err(KernReturn::UNSUPPORTED)
    }

    fn close_service(&self, _connection: &()) -> Result<(), KernReturn> {
        Err(KernReturn::UNSUPPORTED)
    }
}

/// Driver used by the binaries on the current target.
#[cfg(target_os = "macos")]
pub type SystemDriver = iokit::IoKitDriver;
#[cfg(not(target_os = "macos"))]
pub type SystemDriver = UnsupportedDriver;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kern_return_display() {
        assert_eq!(
            KernReturn::NOT_PRIVILEGED.to_string(),
            "kIOReturnNotPrivileged (0xe00002c1)"
        );
        assert_eq!(KernReturn(0x10).to_string(), "0x00000010");
    }

    #[test]
    fn test_kern_return_into_result() {
        assert_eq!(KernReturn::SUCCESS.into_result(), Ok(()));
        assert_eq!(KernReturn::BUSY.into_result(), Err(KernReturn::BUSY));
    }

    #[test]
    fn test_unsupported_driver_finds_nothing() {
        let driver = UnsupportedDriver;
        assert_eq!(driver.matching_service("AppleGraphicsControl"), Ok(None));
    }
}
