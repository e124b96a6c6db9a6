pub mod config;
pub mod error;
pub mod load;
pub mod merge;
pub mod paths;
pub mod validate;

pub use config::{Config, ConnectionConfig, DebugInfoConfig, EngineConfig, LogConfig, LogLevel, StepModeSetting};
pub use error::ConfigError;
pub use load::{load_config, load_from_str};
pub use paths::KdbgPaths;
