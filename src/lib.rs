// Public modules
pub mod config;
pub mod devices;
pub mod driver;
pub mod error;
pub mod handle;
pub mod logging;
pub mod manager;
pub mod selector;
pub mod worker;

pub use devices::list_gpu_names;
pub use error::{ConfigError, ConnectError};
pub use manager::{GpuManager, MuxStatus, SwitcherMode};

// Re-export constants commonly used
pub mod constants {
    use std::time::Duration;

    /// IOKit class of the graphics mux driver.
    pub const GRAPHICS_CONTROL: &str = "AppleGraphicsControl";
    pub const IO_PCI_DEVICE: &str = "IOPCIDevice";
    pub const IO_NAME_KEY: &str = "IOName";
    pub const MODEL_KEY: &str = "model";
    pub const DISPLAY_KEY: &str = "display";

    /// Wait between turning dynamic switching off and forcing the switch.
    pub const SETTLE_DELAY: Duration = Duration::from_secs(1);

    pub const CONFIG_DIR_NAME: &str = "gswitch";
    pub const CONFIG_FILE_NAME: &str = "config.toml";
}
