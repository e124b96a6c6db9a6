use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Granularity of stepping at session start.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepModeSetting {
    /// Step by source line (default).
    #[default]
    Source,
    /// Step by machine instruction.
    Assembly,
}

/// Log verbosity level.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Most verbose.
    Trace,
    /// Debug messages.
    Debug,
    /// Informational messages (default).
    #[default]
    Info,
    /// Warnings only.
    Warn,
    /// Errors only.
    Error,
}

/// How to reach the debug stub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Port specification, `"<kind>: <parameter>"`.
    #[serde(default = "default_port")]
    pub port: String,
}

fn default_port() -> String {
    "pipe: /tmp/cosmos-debug.sock".to_string()
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

/// Where the compiled kernel's debug information lives.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DebugInfoConfig {
    /// Debug-information database (JSON).
    pub path: Option<PathBuf>,
    /// Assembly listing used to fill the assembly window.
    pub asm_listing: Option<PathBuf>,
}

/// Stepping engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub step_mode: StepModeSetting,
    /// How long to wait for the shell to acknowledge an assembly window
    /// (100–60000 ms).
    #[serde(default = "default_asm_window_timeout_ms")]
    pub asm_window_timeout_ms: u64,
    /// Labels shown on each side of the current one (1–100).
    #[serde(default = "default_asm_window_radius")]
    pub asm_window_radius: usize,
}

fn default_asm_window_timeout_ms() -> u64 {
    5000
}

fn default_asm_window_radius() -> usize {
    10
}

impl EngineConfig {
    pub fn asm_window_timeout(&self) -> Duration {
        Duration::from_millis(self.asm_window_timeout_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            step_mode: StepModeSetting::Source,
            asm_window_timeout_ms: 5000,
            asm_window_radius: 10,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log verbosity level.
    #[serde(default)]
    pub level: LogLevel,
    /// Optional path to a log file.
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            file: None,
        }
    }
}

/// Top-level kdbg configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub debug_info: DebugInfoConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = Config::default();
        assert_eq!(cfg.connection.port, "pipe: /tmp/cosmos-debug.sock");
        assert!(cfg.debug_info.path.is_none());
        assert!(cfg.debug_info.asm_listing.is_none());
        assert_eq!(cfg.engine.step_mode, StepModeSetting::Source);
        assert_eq!(cfg.engine.asm_window_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.engine.asm_window_radius, 10);
        assert_eq!(cfg.log.level, LogLevel::Info);
        assert!(cfg.log.file.is_none());
    }

    #[test]
    fn serde_roundtrip_preserves_values() {
        let mut cfg = Config::default();
        cfg.connection.port = "tcp: 127.0.0.1:4444".into();
        cfg.debug_info.path = Some(PathBuf::from("bin/Kernel.cdb.json"));
        cfg.engine.step_mode = StepModeSetting::Assembly;
        cfg.engine.asm_window_radius = 3;
        cfg.log.level = LogLevel::Trace;

        let text = toml::to_string(&cfg).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn parse_from_toml_string() {
        let text = r#"
[connection]
port = "serial: /dev/ttyS1"

[debug_info]
path = "bin/Kernel.cdb.json"
asm_listing = "bin/Kernel.asm"

[engine]
step_mode = "assembly"
asm_window_timeout_ms = 250

[log]
level = "debug"
file = "/tmp/kdbg.log"
"#;
        let cfg: Config = toml::from_str(text).unwrap();
        assert_eq!(cfg.connection.port, "serial: /dev/ttyS1");
        assert_eq!(cfg.debug_info.asm_listing, Some(PathBuf::from("bin/Kernel.asm")));
        assert_eq!(cfg.engine.step_mode, StepModeSetting::Assembly);
        assert_eq!(cfg.engine.asm_window_timeout_ms, 250);
        assert_eq!(cfg.engine.asm_window_radius, 10);
        assert_eq!(cfg.log.level, LogLevel::Debug);
        assert_eq!(cfg.log.file, Some(PathBuf::from("/tmp/kdbg.log")));
    }

    #[test]
    fn empty_toml_yields_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn unknown_step_mode_is_rejected() {
        let result: Result<Config, _> = toml::from_str("[engine]\nstep_mode = \"fast\"\n");
        assert!(result.is_err());
    }
}
