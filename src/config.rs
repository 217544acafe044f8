//! Configuration for the SBN client.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BusError, Result};
use crate::protocol::{MAX_PACKET_SIZE, TELEMETRY_HEADER_SIZE};

/// Client configuration. Every field has a default, so an empty file is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Shared object exporting the bus client entry points.
    pub library_path: PathBuf,

    /// Name of the command pipe created at open.
    pub pipe_name: String,

    /// Messages the command pipe may queue.
    pub pipe_depth: u16,

    /// Let the bus stamp the sequence count on transmit.
    pub increment_sequence: bool,

    /// Fill in the command checksum on send.
    pub generate_checksum: bool,

    /// Bytes reserved for encoding outgoing packets.
    pub encoder_capacity: usize,

    pub logging: LoggingConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            library_path: PathBuf::from("./sbn_client.so"),
            pipe_name: "cmd_pipe".to_string(),
            pipe_depth: 10,
            increment_sequence: true,
            generate_checksum: true,
            encoder_capacity: MAX_PACKET_SIZE,
            logging: LoggingConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| BusError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pipe_name.is_empty() {
            return Err(BusError::Config("pipe_name must not be empty".into()));
        }
        if self.pipe_name.contains('\0') {
            return Err(BusError::InvalidPipeName(self.pipe_name.clone()));
        }
        if self.pipe_depth == 0 {
            return Err(BusError::Config("pipe_depth must be at least 1".into()));
        }
        if self.encoder_capacity < TELEMETRY_HEADER_SIZE {
            return Err(BusError::Config(format!(
                "encoder_capacity must hold at least one header ({TELEMETRY_HEADER_SIZE} bytes)"
            )));
        }
        Ok(())
    }

    pub fn with_library_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.library_path = path.into();
        self
    }

    pub fn with_pipe<S: Into<String>>(mut self, name: S, depth: u16) -> Self {
        self.pipe_name = name.into();
        self.pipe_depth = depth;
        self
    }

    pub fn with_increment_sequence(mut self, enabled: bool) -> Self {
        self.increment_sequence = enabled;
        self
    }

    pub fn with_checksum(mut self, enabled: bool) -> Self {
        self.generate_checksum = enabled;
        self
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. "info" or "sbn_client=debug".
    pub level: String,
    pub color: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            color: true,
        }
    }
}

/// Install the global tracing subscriber. `RUST_LOG` wins over `config.level`.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_ansi(config.color))
        .try_init()
        .map_err(|e| BusError::Config(format!("Failed to init logging: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.pipe_name, "cmd_pipe");
        assert_eq!(config.pipe_depth, 10);
        assert!(config.increment_sequence);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = ClientConfig::from_toml_str("").unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn test_partial_toml() {
        let config = ClientConfig::from_toml_str(
            r#"
            library_path = "/opt/sbn/libsbn_client.so"
            pipe_depth = 32

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.library_path, PathBuf::from("/opt/sbn/libsbn_client.so"));
        assert_eq!(config.pipe_depth, 32);
        assert_eq!(config.pipe_name, "cmd_pipe");
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.color);
    }

    #[test]
    fn test_validation() {
        assert!(ClientConfig::from_toml_str("pipe_depth = 0").is_err());
        assert!(ClientConfig::from_toml_str("pipe_name = \"\"").is_err());
        assert!(ClientConfig::from_toml_str("encoder_capacity = 8").is_err());
        assert!(ClientConfig::from_toml_str("pipe_depth = \"ten\"").is_err());

        let config = ClientConfig::default().with_pipe("bad\0name", 4);
        assert!(matches!(config.validate(), Err(BusError::InvalidPipeName(_))));
    }

    #[test]
    fn test_load_missing_file() {
        let err = ClientConfig::load("/nonexistent/sbn_client.toml").unwrap_err();
        assert!(std::error::Error::source(&err).is_some());
        match err {
            BusError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            other => panic!("expected Io, got {other:?}"),
        }
    }
}
