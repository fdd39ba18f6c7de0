use std::path::PathBuf;

use thiserror::Error;

use crate::driver::KernReturn;

/// Why a connection to the graphics control driver could not be made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConnectError {
    #[error("no matching graphics control driver found{}", .0.map(|s| format!(" (lookup returned {s})")).unwrap_or_default())]
    ServiceNotFound(Option<KernReturn>),
    #[error("opening the graphics control service returned {0}")]
    ServiceOpenFailed(KernReturn),
    #[error("opening the graphics control user client returned {0}")]
    ClientOpenFailed(KernReturn),
    #[error("a driver connection is already open")]
    AlreadyConnected,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("unknown mode {0:?}, expected integrated, discrete or dynamic")]
    UnknownMode(String),
}
