//! Guildsync Telemetry - logging for guildsync binaries and services
//!
//! - **Structured Logging**: pretty or JSON output on stderr, `RUST_LOG` aware
//! - **Redaction**: scrub secrets from JSON payloads and mask tokens in `Debug`
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use guildsync_telemetry::{TelemetryConfig, init_logging};
//!
//! init_logging(&TelemetryConfig::new("guildsync").with_json_logs(true))?;
//! tracing::info!(guild_id = 42, "Starting sync");
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod logging;

pub use logging::*;

/// Configuration for logging initialization.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name recorded at startup.
    pub service_name: String,

    /// Log level filter (e.g., "info", "debug", "trace"). `RUST_LOG` wins.
    pub log_level: String,

    /// Enable JSON log output.
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "guildsync".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl TelemetryConfig {
    /// Create a new configuration with the given service name.
    #[must_use]
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    /// Set the log level.
    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Enable or disable JSON logs.
    #[must_use]
    pub const fn with_json_logs(mut self, enabled: bool) -> Self {
        self.json_logs = enabled;
        self
    }
}

/// Field names scrubbed from logged payloads by default.
#[must_use]
pub fn default_redact_fields() -> Vec<String> {
    ["password", "secret", "token", "authorization", "access_token"]
        .iter()
        .map(ToString::to_string)
        .collect()
}

/// Telemetry errors.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),
}
