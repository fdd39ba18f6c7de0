//! `config.toml` of the command line tools.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::constants::{CONFIG_DIR_NAME, CONFIG_FILE_NAME};
use crate::error::ConfigError;
use crate::manager::SwitcherMode;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    pub launch: LaunchConfig,
    pub shutdown: ShutdownConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct LaunchConfig {
    /// Mode applied right after connecting; `None` keeps whatever is set.
    pub mode: Option<SwitcherMode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ShutdownConfig {
    /// Hand control back to dynamic switching before closing.
    pub restore_dynamic: bool,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            restore_dynamic: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// `<config dir>/gswitch/config.toml`, if the platform has a config dir.
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

impl Config {
    pub fn parse(text: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, path)
    }

    /// Load `path`, or the default location when `path` is `None`. A
    /// missing default file gives the defaults; a missing explicit file
    /// is an error.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => {
                // logging is not set up yet at this point
                eprintln!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<Config, ConfigError> {
        Config::parse(text, Path::new("test.toml"))
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.launch.mode, None);
        assert!(config.shutdown.restore_dynamic);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_full_config() {
        let config = parse(
            r#"
            [launch]
            mode = "integrated"

            [shutdown]
            restore-dynamic = false

            [logging]
            level = "debug"
            file = "/tmp/gswitch.log"
            "#,
        )
        .unwrap();
        assert_eq!(config.launch.mode, Some(SwitcherMode::ForceIntegrated));
        assert!(!config.shutdown.restore_dynamic);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.file, Some(PathBuf::from("/tmp/gswitch.log")));
    }

    #[test]
    fn test_unknown_mode_is_rejected() {
        let err = parse("[launch]\nmode = \"auto\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_missing_explicit_file() {
        let path = Path::new("/nonexistent/gswitch.toml");
        let err = Config::load_or_default(Some(path)).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
