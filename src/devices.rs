//! Names of the display-class PCI devices, for showing which GPUs exist.
//! Independent of the driver connection.

use std::path::{Path, PathBuf};

use crate::constants::DISPLAY_KEY;
use crate::driver::KernReturn;

/// The registry properties we look at for one PCI device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceProperties {
    /// `IOName`, e.g. "display".
    pub name: Option<String>,
    /// Raw `model` property.
    pub model: Option<Vec<u8>>,
}

/// Properties of one device, or the status of the failed read.
pub type DeviceRead = Result<DeviceProperties, KernReturn>;

pub trait DeviceRegistry {
    /// Every PCI device, readable or not.
    fn pci_devices(&self) -> Result<Vec<DeviceRead>, KernReturn>;
}

/// Decode a model property as ASCII, dropping the trailing NUL padding.
pub fn decode_model(bytes: &[u8]) -> Option<String> {
    let end = bytes
        .iter()
        .rposition(|&b| b != 0)
        .map_or(0, |last| last + 1);
    let bytes = &bytes[..end];
    bytes
        .is_ascii()
        .then(|| bytes.iter().map(|&b| char::from(b)).collect())
}

/// Model names of all display devices. Devices that cannot be read are
/// skipped; an enumeration that cannot start gives an empty list.
pub fn list_gpu_names<R: DeviceRegistry + ?Sized>(registry: &R) -> Vec<String> {
    let devices = match registry.pci_devices() {
        Ok(devices) => devices,
        Err(status) => {
            log::warn!("PCI device enumeration returned {status}");
            return Vec::new();
        }
    };

    let mut gpus = Vec::new();
    for (i, device) in devices.into_iter().enumerate() {
        let props = match device {
            Ok(props) => props,
            Err(status) => {
                log::debug!("Skipping PCI device #{i}: properties returned {status}");
                continue;
            }
        };
        if props.name.as_deref() != Some(DISPLAY_KEY) {
            continue;
        }
        match props.model.as_deref().map(decode_model) {
            Some(Some(model)) => gpus.push(model),
            Some(None) => log::warn!("Skipping display device #{i}: model is not ASCII"),
            None => log::warn!("Skipping display device #{i}: no model property"),
        }
    }
    gpus
}

/// Linux PCI devices from sysfs. Display controllers (class `0x03xxxx`)
/// are reported under the `display` name with `vendor:device` as model.
#[derive(Debug, Clone)]
pub struct SysfsRegistry {
    root: PathBuf,
}

impl SysfsRegistry {
    pub fn new() -> Self {
        Self::with_root("/sys/bus/pci/devices")
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read_device(path: &Path) -> DeviceRead {
        let read = |file: &str| {
            std::fs::read_to_string(path.join(file))
                .map(|s| s.trim().to_string())
                .map_err(|_| KernReturn::NOT_OPEN)
        };
        let class = read("class")?;
        let name = if class.starts_with("0x03") {
            DISPLAY_KEY.to_string()
        } else {
            class
        };
        let model = match read("label") {
            Ok(label) => label.into_bytes(),
            Err(_) => format!("{}:{}", read("vendor")?, read("device")?).into_bytes(),
        };
        Ok(DeviceProperties {
            name: Some(name),
            model: Some(model),
        })
    }
}

impl Default for SysfsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceRegistry for SysfsRegistry {
    fn pci_devices(&self) -> Result<Vec<DeviceRead>, KernReturn> {
        let entries = std::fs::read_dir(&self.root).map_err(|_| KernReturn::NO_DEVICE)?;
        let mut paths: Vec<PathBuf> = entries.filter_map(|e| e.ok().map(|e| e.path())).collect();
        paths.sort();
        Ok(paths.iter().map(|p| Self::read_device(p)).collect())
    }
}

/// Registry used by the binaries on the current target.
#[cfg(target_os = "macos")]
pub type SystemRegistry = crate::driver::iokit::IoKitRegistry;
#[cfg(not(target_os = "macos"))]
pub type SystemRegistry = SysfsRegistry;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::mock::MockRegistry;

    fn device(name: &str, model: &[u8]) -> DeviceRead {
        Ok(DeviceProperties {
            name: Some(name.to_string()),
            model: Some(model.to_vec()),
        })
    }

    #[test]
    fn test_decode_model() {
        assert_eq!(
            decode_model(b"AMD Radeon Pro 560\0"),
            Some("AMD Radeon Pro 560".to_string())
        );
        assert_eq!(
            decode_model(b"Intel HD 630"),
            Some("Intel HD 630".to_string())
        );
        assert_eq!(decode_model(b"\0\0"), Some(String::new()));
        assert_eq!(decode_model(&[0x47, 0xff, 0x00]), None);
    }

    #[test]
    fn test_lists_display_devices_only() {
        let registry = MockRegistry {
            enumeration_error: None,
            devices: vec![
                device("display", b"Intel Iris Pro\0"),
                device("pci-bridge", b"Bridge\0"),
                device("display", b"NVIDIA GeForce GT 750M\0"),
            ],
        };
        assert_eq!(
            list_gpu_names(&registry),
            vec!["Intel Iris Pro", "NVIDIA GeForce GT 750M"]
        );
    }

    #[test]
    fn test_unreadable_devices_are_skipped() {
        let registry = MockRegistry {
            enumeration_error: None,
            devices: vec![
                Err(KernReturn::NOT_PRIVILEGED),
                device("display", b"AMD Radeon Pro 455\0"),
                Ok(DeviceProperties {
                    name: Some("display".to_string()),
                    model: None,
                }),
                device("display", &[0xc3, 0xa9]),
                device("display", b"Intel HD Graphics 530\0"),
            ],
        };
        assert_eq!(
            list_gpu_names(&registry),
            vec!["AMD Radeon Pro 455", "Intel HD Graphics 530"]
        );
    }

    #[test]
    fn test_enumeration_failure_gives_empty_list() {
        let registry = MockRegistry {
            enumeration_error: Some(KernReturn::ERROR),
            devices: vec![device("display", b"never seen")],
        };
        assert!(list_gpu_names(&registry).is_empty());
    }

    #[test]
    fn test_sysfs_registry() {
        let root = std::env::temp_dir().join(format!("gswitch-sysfs-{}", std::process::id()));
        let gpu = root.join("0000:01:00.0");
        let bridge = root.join("0000:00:01.0");
        let broken = root.join("0000:02:00.0");
        for dir in [&gpu, &bridge, &broken] {
            std::fs::create_dir_all(dir).unwrap();
        }
        std::fs::write(gpu.join("class"), "0x030000\n").unwrap();
        std::fs::write(gpu.join("vendor"), "0x1002\n").unwrap();
        std::fs::write(gpu.join("device"), "0x13fe\n").unwrap();
        std::fs::write(bridge.join("class"), "0x060400\n").unwrap();
        std::fs::write(bridge.join("vendor"), "0x8086\n").unwrap();
        std::fs::write(bridge.join("device"), "0x1901\n").unwrap();

        let names = list_gpu_names(&SysfsRegistry::with_root(&root));
        std::fs::remove_dir_all(&root).ok();
        assert_eq!(names, vec!["0x1002:0x13fe"]);
    }
}
