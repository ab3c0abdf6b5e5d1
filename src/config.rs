//! Configuration loading and defaults.
//!
//! Precedence (highest wins):
//!
//! 1. **Environment variables** — `IRIDIUM_SBD_PATH`, `IRIDIUM_SBD_BAUD`
//! 2. **Config file** — TOML path passed to [`Config::load`]
//! 3. **Compiled defaults**
//!
//! ```toml
//! path = "/dev/ttyUSB0"
//! baud_rate = 19200
//! default_signal_quality = 1
//! session_timeout_ms = 60000
//! log_level = "info"
//! ```

use serde::Deserialize;
use std::path::Path;

use crate::error::ConfigError;

/// Top-level configuration, deserialized from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Serial device path (e.g. `/dev/ttyUSB0`).
    #[serde(default = "default_path")]
    pub path: String,
    /// Baud rate. Default 19200, the 9602/9603's factory default.
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Minimum signal quality `sendTextMessage`/`sendBinaryMessage` wait
    /// for before initiating a session. Default 1.
    #[serde(default = "default_signal_quality")]
    pub default_signal_quality: u8,
    /// Default `SBDIXA` timeout in milliseconds. Default 60 000.
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u64,
    /// `tracing` log level used by the CLI binary (the library itself
    /// composes into the host's existing subscriber).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: default_path(),
            baud_rate: default_baud_rate(),
            default_signal_quality: default_signal_quality(),
            session_timeout_ms: default_session_timeout_ms(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from an optional TOML file, then apply env var
    /// overrides. Falls back to compiled defaults when `path` is `None`.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match config_path {
            Some(path) => {
                let text =
                    std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                        path: path.to_path_buf(),
                        source,
                    })?;
                toml::from_str(&text).map_err(|source| ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?
            }
            None => Self::default(),
        };

        if let Ok(path) = std::env::var("IRIDIUM_SBD_PATH") {
            config.path = path;
        }
        if let Ok(baud) = std::env::var("IRIDIUM_SBD_BAUD") {
            if let Ok(baud) = baud.parse() {
                config.baud_rate = baud;
            }
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.baud_rate == 0 {
            return Err(ConfigError::InvalidBaudRate(self.baud_rate));
        }
        Ok(())
    }
}

fn default_path() -> String {
    "/dev/ttyUSB0".to_string()
}

fn default_baud_rate() -> u32 {
    19200
}

fn default_signal_quality() -> u8 {
    1
}

fn default_session_timeout_ms() -> u64 {
    60_000
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = Config::default();
        assert_eq!(config.baud_rate, 19200);
        assert_eq!(config.default_signal_quality, 1);
        assert_eq!(config.session_timeout_ms, 60_000);
    }

    #[test]
    fn partial_toml_keeps_remaining_defaults() {
        let config: Config = toml::from_str("path = \"/dev/ttyUSB2\"").unwrap();
        assert_eq!(config.path, "/dev/ttyUSB2");
        assert_eq!(config.baud_rate, 19200);
    }

    #[test]
    fn zero_baud_rate_is_rejected() {
        let config = Config {
            baud_rate: 0,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidBaudRate(0))
        ));
    }
}
