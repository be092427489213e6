//! Process-wide `tracing` subscriber for binaries.

use std::path::Path;
use std::sync::OnceLock;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const LOG_FILE_PREFIX: &str = "concordia";
const MAX_LOG_FILES: usize = 5;

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Installs console logging, plus daily-rotated files under `log_dir` when
/// given.
///
/// Warnings and errors go to stderr, everything else to stdout. `RUST_LOG`
/// takes precedence over `base_level`. Panics when called twice or when the
/// log directory cannot be created, since a binary without its log sink
/// should not start.
pub fn setup_logging(base_level: &str, log_dir: Option<&Path>) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(base_level))
        .unwrap_or_else(|e| panic!("Invalid log filter: {}", e));

    let file_layer = log_dir.map(|dir| {
        std::fs::create_dir_all(dir)
            .unwrap_or_else(|e| panic!("Failed to create log directory {}: {}", dir.display(), e));

        let appender = tracing_appender::rolling::Builder::new()
            .rotation(tracing_appender::rolling::Rotation::DAILY)
            .filename_prefix(LOG_FILE_PREFIX)
            .filename_suffix("log")
            .max_log_files(MAX_LOG_FILES)
            .build(dir)
            .unwrap_or_else(|e| panic!("Failed to create log file appender: {}", e));

        let (writer, guard) = tracing_appender::non_blocking(appender);
        LOG_GUARD.set(guard).expect("Logging already initialized");

        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false)
            .with_writer(writer)
    });

    let console_writer = std::io::stderr
        .with_max_level(Level::WARN)
        .or_else(std::io::stdout);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_ansi(true)
        .with_writer(console_writer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .unwrap_or_else(|e| panic!("Logger initialization failed: {}", e));
}
