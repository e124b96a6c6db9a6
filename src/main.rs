use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::BufReader;
use tracing::info;

use kdbg_config::{load_config, Config, KdbgPaths, StepModeSetting};
use kdbg_debuginfo::{AsmListing, DebugInfoCache, DebugInfoTable};
use kdbg_engine::{Engine, EngineOptions, StepMode};

mod logging;
mod session;
mod shell;

fn engine_options(config: &Config) -> EngineOptions {
    EngineOptions {
        step_mode: match config.engine.step_mode {
            StepModeSetting::Source => StepMode::Source,
            StepModeSetting::Assembly => StepMode::Assembly,
        },
        asm_window_timeout: config.engine.asm_window_timeout(),
        asm_window_radius: config.engine.asm_window_radius,
    }
}

/// Relative paths in the configuration are relative to the project.
fn resolve(project_dir: &Path, path: &Path) -> PathBuf {
    project_dir.join(path)
}

fn run_debugger(project_dir: Option<PathBuf>) -> Result<()> {
    let paths = KdbgPaths::new().context("failed to detect home directory")?;
    let project_dir = match project_dir {
        Some(dir) => dir,
        None => env::current_dir().context("failed to read working directory")?,
    };

    let config = load_config(&paths.config_dir(), Some(&project_dir))
        .context("failed to load configuration")?;

    let log_path = config
        .log
        .file
        .clone()
        .unwrap_or_else(|| paths.default_log_file());
    logging::init(&log_path, &config.log.level)
        .with_context(|| format!("failed to open log file {}", log_path.display()))?;

    let port = config.port_spec().context("invalid debug port")?;
    let debug_info_path = resolve(&project_dir, config.require_debug_info_path()?);
    let table = DebugInfoTable::load(&debug_info_path)
        .with_context(|| format!("failed to load debug info {}", debug_info_path.display()))?;
    let listing = config
        .debug_info
        .asm_listing
        .as_deref()
        .map(|path| {
            let path = resolve(&project_dir, path);
            AsmListing::load(&path)
                .with_context(|| format!("failed to load assembly listing {}", path.display()))
        })
        .transpose()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    let end = runtime.block_on(async {
        let (connection, notifications) = kdbg_stub::connect(&port)
            .await
            .with_context(|| format!("failed to connect to {port}"))?;
        let (engine, events) = Engine::new(
            Arc::new(connection),
            Arc::new(DebugInfoCache::new(table)),
            engine_options(&config),
        );
        let engine = match listing {
            Some(listing) => engine.with_listing(listing),
            None => engine,
        };

        println!("kdbg: connected to {port}, type 'help' for commands");
        let input = BufReader::new(tokio::io::stdin());
        session::run(engine, notifications, events, input).await
    })?;

    info!(?end, "kdbg exited");
    runtime.shutdown_timeout(std::time::Duration::from_secs(1));
    if let session::SessionEnd::ConnectionLost(reason) = end {
        anyhow::bail!("connection lost: {reason}");
    }
    Ok(())
}

fn main() {
    let project_dir = env::args().nth(1).map(PathBuf::from);

    if let Err(e) = run_debugger(project_dir) {
        eprintln!("kdbg: {:#}", e);
        std::process::exit(1);
    }
}
