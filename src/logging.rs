//! Tracing setup for the server and the CLI.
//!
//! Events go to stdout and to an append-only log file. `GROUNDWORK_LOG_FILE` picks the file
//! (`off` disables it); the default is `logs/groundwork.log`.
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing_appender::{
    non_blocking::{NonBlocking, WorkerGuard},
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Filter used when `RUST_LOG` is unset: pipeline events at info, dependencies at warn.
pub const DEFAULT_FILTER: &str = "warn,groundwork=info";
const LOG_FILE_ENV: &str = "GROUNDWORK_LOG_FILE";
const DEFAULT_LOG_FILE: &str = "logs/groundwork.log";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Install the global subscriber. Later calls are no-ops.
pub fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false).compact());

    let file_writer = log_file_path(std::env::var(LOG_FILE_ENV).ok().as_deref())
        .and_then(|path| open_writer(&path));
    match file_writer {
        Some(writer) => {
            let file_layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .compact();
            let _ = registry.with(file_layer).try_init();
        }
        None => {
            let _ = registry.try_init();
        }
    }
}

/// Where file logs go for a given `GROUNDWORK_LOG_FILE` value; `None` disables file output.
fn log_file_path(configured: Option<&str>) -> Option<PathBuf> {
    match configured.map(str::trim) {
        None | Some("") => Some(PathBuf::from(DEFAULT_LOG_FILE)),
        Some(value) if value.eq_ignore_ascii_case("off") => None,
        Some(value) => Some(PathBuf::from(value)),
    }
}

fn open_writer(path: &Path) -> Option<NonBlocking> {
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let file_name = path.file_name()?;
    if let Err(err) = std::fs::create_dir_all(directory) {
        eprintln!("Failed to create log directory {}: {err}", directory.display());
        return None;
    }
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name.to_string_lossy())
        .build(directory);
    let appender = match appender {
        Ok(appender) => appender,
        Err(err) => {
            eprintln!("Failed to open log file {}: {err}", path.display());
            return None;
        }
    };
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let _ = LOG_GUARD.set(guard);
    Some(writer)
}
