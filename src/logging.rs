//! Logging setup for the registry binary.
//!
//! Logs go to stderr and to daily-rotating files:
//!
//! - `model-registry.<date>.log`: everything that passes the env filter
//! - `error.<date>.log`: warnings and errors only, which includes the
//!   warnings emitted when a write-triggered export rebuild fails
//!
//! ```no_run
//! model_registry::logging::init(None).expect("Failed to initialize logging");
//! tracing::info!("registry started");
//! ```

use anyhow::{Context as _, Result};
use std::path::{Path, PathBuf};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer as _, fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _,
};

const APP_DIR: &str = "model-registry";
const LOG_PREFIX: &str = "model-registry";

/// Gets the log directory path based on platform conventions
///
/// Returns:
/// - Windows: `%APPDATA%/model-registry/logs`
/// - macOS: `~/Library/Application Support/model-registry/logs`
/// - Linux: `~/.local/share/model-registry/logs`
pub fn get_log_dir() -> Result<PathBuf> {
    let base_dir = dirs::data_dir().context("Failed to determine data directory")?;
    Ok(base_dir.join(APP_DIR).join("logs"))
}

fn ensure_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
    }
    Ok(())
}

/// Initializes console and file logging.
///
/// `log_dir` overrides the platform default. The filter defaults to INFO and
/// can be changed with `RUST_LOG`.
///
/// # Errors
///
/// Returns error if the log directory cannot be created or file appenders fail
pub fn init(log_dir: Option<&Path>) -> Result<()> {
    let log_dir = match log_dir {
        Some(dir) => dir.to_path_buf(),
        None => get_log_dir()?,
    };
    ensure_dir(&log_dir)?;

    let all_logs_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .max_log_files(10)
        .filename_prefix(LOG_PREFIX)
        .filename_suffix("log")
        .build(&log_dir)
        .context("Failed to create all-logs file appender")?;

    let error_logs_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .max_log_files(10)
        .filename_prefix("error")
        .filename_suffix("log")
        .build(&log_dir)
        .context("Failed to create error-logs file appender")?;

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .context("Failed to create env filter")?;

    // stdout is reserved for command output
    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_line_number(false)
        .with_writer(std::io::stderr);

    let all_logs_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false)
        .with_writer(all_logs_appender);

    let error_logs_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false)
        .with_writer(error_logs_appender)
        .with_filter(EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(all_logs_layer)
        .with(error_logs_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    tracing::debug!("Logging initialized, log directory: {:?}", log_dir);

    Ok(())
}
