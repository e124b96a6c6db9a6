use std::path::Path;

use kdbg_stub::PortSpec;

use crate::config::Config;
use crate::error::ConfigError;

const TIMEOUT_RANGE_MS: std::ops::RangeInclusive<u64> = 100..=60_000;
const RADIUS_RANGE: std::ops::RangeInclusive<usize> = 1..=100;

/// Validate a [`Config`], returning all detected violations.
pub fn validate(config: &Config) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if let Err(e) = config.connection.port.parse::<PortSpec>() {
        errors.push(ConfigError::Validation {
            field: "connection.port".to_string(),
            message: e.to_string(),
        });
    }

    let timeout = config.engine.asm_window_timeout_ms;
    if !TIMEOUT_RANGE_MS.contains(&timeout) {
        errors.push(ConfigError::Validation {
            field: "engine.asm_window_timeout_ms".to_string(),
            message: format!("must be 100-60000, got {timeout}"),
        });
    }

    let radius = config.engine.asm_window_radius;
    if !RADIUS_RANGE.contains(&radius) {
        errors.push(ConfigError::Validation {
            field: "engine.asm_window_radius".to_string(),
            message: format!("must be 1-100, got {radius}"),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

impl Config {
    /// The parsed debug port.
    pub fn port_spec(&self) -> Result<PortSpec, ConfigError> {
        self.connection
            .port
            .parse()
            .map_err(|e: kdbg_stub::StubError| ConfigError::Validation {
                field: "connection.port".to_string(),
                message: e.to_string(),
            })
    }

    /// The debug-information path, which a session cannot start without.
    pub fn require_debug_info_path(&self) -> Result<&Path, ConfigError> {
        self.debug_info
            .path
            .as_deref()
            .ok_or(ConfigError::Missing("debug_info.path"))
    }
}
