use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use file_rotate::compression::Compression;
use file_rotate::suffix::AppendCount;
use file_rotate::{ContentLimit, FileRotate};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_FILTER_ENV: &str = "HRMERGE_LOG";
pub const LOG_DIR_ENV: &str = "HRMERGE_LOG_DIR";
pub const DEFAULT_FILTER: &str = "hrmerge=info,sqlx=warn";

const LOG_FILE_NAME: &str = "hrmerge.log";
const LOG_FILE_MAX_BYTES: usize = 5 * 1024 * 1024;
const LOG_FILE_KEEP: usize = 5;

/// Install the JSON subscriber on stderr, plus a rotating file sink when
/// `HRMERGE_LOG_DIR` is set. Calling it twice is harmless.
pub fn init() -> Result<()> {
    let _ = tracing_log::LogTracer::init();

    let filter = std::env::var(LOG_FILTER_ENV).unwrap_or_else(|_| DEFAULT_FILTER.into());
    let filter = EnvFilter::try_new(&filter).with_context(|| format!("parse log filter {filter:?}"))?;

    let stderr = fmt::layer()
        .json()
        .with_target(true)
        .with_timer(UtcTime::rfc_3339())
        .with_writer(std::io::stderr);

    let file = match std::env::var_os(LOG_DIR_ENV).filter(|dir| !dir.is_empty()) {
        Some(dir) => {
            let writer = rotating_file(Path::new(&dir))?;
            Some(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_timer(UtcTime::rfc_3339())
                    .with_ansi(false)
                    .with_writer(Mutex::new(writer)),
            )
        }
        None => None,
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(file)
        .try_init();
    Ok(())
}

fn rotating_file(dir: &Path) -> Result<FileRotate<AppendCount>> {
    std::fs::create_dir_all(dir).with_context(|| format!("create log directory {}", dir.display()))?;
    Ok(FileRotate::new(
        dir.join(LOG_FILE_NAME),
        AppendCount::new(LOG_FILE_KEEP),
        ContentLimit::Bytes(LOG_FILE_MAX_BYTES),
        Compression::None,
        #[cfg(unix)]
        None,
    ))
}
