//! Log to daily files under `<log_dir>` and, unless quiet, to the terminal.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub const LOG_PREFIX: &str = "skedsync";
pub const LOG_SUFFIX: &str = "log";
/// The current file plus nine older ones.
pub const MAX_LOG_FILES: usize = 10;
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Keeps the background log writer alive. Dropping it flushes the file.
pub struct LoggingGuard {
    pub log_dir: PathBuf,
    _file_guard: WorkerGuard,
}

/// `skedsync.<date>.log`, rotated daily, oldest files removed.
pub fn file_appender(log_dir: &Path) -> io::Result<RollingFileAppender> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_PREFIX)
        .filename_suffix(LOG_SUFFIX)
        .max_log_files(MAX_LOG_FILES)
        .build(log_dir)
        .map_err(io::Error::other)
}

/// Install the global subscriber. `RUST_LOG` overrides the default level.
pub fn init_logging(log_dir: &Path, quiet: bool, verbose: bool) -> io::Result<LoggingGuard> {
    fs::create_dir_all(log_dir)?;
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender(log_dir)?);

    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_target(false)
        .with_timer(ChronoUtc::new(TIME_FORMAT.to_string()));

    let stdout_layer = (!quiet).then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(io::stdout)
            .with_target(false)
            .with_timer(ChronoUtc::new("%H:%M:%S".to_string()))
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
    Ok(LoggingGuard {
        log_dir: log_dir.to_path_buf(),
        _file_guard: file_guard,
    })
}
