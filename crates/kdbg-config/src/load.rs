use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::ConfigError;
use crate::merge::merge_configs;
use crate::validate::validate;

/// Directory, relative to a project root, holding the project config.
pub const PROJECT_CONFIG_DIR: &str = ".kdbg";

/// Content written into a newly-created default config file.
const DEFAULT_CONFIG_CONTENT: &str = r#"# kdbg configuration
# Uncomment and edit settings below to override defaults.
# A project can override these in .kdbg/config.toml.

# [connection]
# port = "pipe: /tmp/cosmos-debug.sock"

# [debug_info]
# path = "bin/Kernel.cdb.json"
# asm_listing = "bin/Kernel.asm"

# [engine]
# step_mode = "source"
# asm_window_timeout_ms = 5000
# asm_window_radius = 10

# [log]
# level = "info"
"#;

/// Load and merge configuration.
///
/// 1. Reads the global config from `config_dir/config.toml`, creating it
///    with commented-out defaults when missing.
/// 2. Optionally reads a project config, found by walking upward from
///    `project_dir` to the first `.kdbg/config.toml`.
/// 3. Merges: `Config::default() <- global <- project`.
/// 4. Validates the merged result.
///
/// # Errors
///
/// Returns [`ConfigError`] on I/O failure, parse failure, or validation
/// failure. All violations are logged; the first one is returned.
pub fn load_config(config_dir: &Path, project_dir: Option<&Path>) -> Result<Config, ConfigError> {
    let global_path = config_dir.join("config.toml");

    if !config_dir.exists() {
        std::fs::create_dir_all(config_dir)?;
    }

    if !global_path.exists() {
        std::fs::write(&global_path, DEFAULT_CONFIG_CONTENT)
            .map_err(|e| ConfigError::CreateDefault(e.to_string()))?;
        tracing::info!("Created default config at {}", global_path.display());
    }

    let mut config = Config::default();

    let global_content = std::fs::read_to_string(&global_path)?;
    if has_non_comment_content(&global_content) {
        config = merge_configs(&config, &global_content)?;
    }

    if let Some(project_path) = project_dir.and_then(find_project_config) {
        tracing::debug!("Merging project config {}", project_path.display());
        let project_content = std::fs::read_to_string(&project_path)?;
        config = merge_configs(&config, &project_content)?;
    }

    check(config)
}

/// Parse a TOML string directly into a validated [`Config`].
///
/// # Errors
///
/// Returns [`ConfigError`] on parse or validation failure.
pub fn load_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;
    check(config)
}

fn check(config: Config) -> Result<Config, ConfigError> {
    match validate(&config) {
        Ok(()) => Ok(config),
        Err(errors) => {
            for error in &errors {
                tracing::warn!("{error}");
            }
            Err(errors
                .into_iter()
                .next()
                .unwrap_or_else(|| ConfigError::Validation {
                    field: "unknown".to_string(),
                    message: "validation failed".to_string(),
                }))
        }
    }
}

/// Walk from `start` upward looking for `.kdbg/config.toml`.
fn find_project_config(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(PROJECT_CONFIG_DIR).join("config.toml"))
        .find(|candidate| candidate.is_file())
}

fn has_non_comment_content(content: &str) -> bool {
    content.lines().any(|l| {
        let trimmed = l.trim();
        !trimmed.is_empty() && !trimmed.starts_with('#')
    })
}
