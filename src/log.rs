use std::path::PathBuf;

use anyhow::Result;
use tracing::metadata::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt::Layer, prelude::*, registry, EnvFilter};

/// Keeps the non-blocking log writers flushing, drop it last
pub struct Guard {
    _stdout: WorkerGuard,
    _logfile: Option<WorkerGuard>,
}

fn filter() -> Result<EnvFilter> {
    Ok(EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env()?)
}

/// stdout only, used by the administrative commands.
/// records from the `log` crate are bridged by `try_init`
pub fn init_logging_no_file() -> Result<Guard> {
    let (stdout, guard) = tracing_appender::non_blocking(std::io::stdout());
    let stdout_layer = Layer::new().with_writer(stdout).pretty();
    registry().with(stdout_layer.with_filter(filter()?)).try_init()?;
    Ok(Guard {
        _stdout: guard,
        _logfile: None,
    })
}

pub fn init_logging_with_file(log_dir: PathBuf) -> Result<Guard> {
    let appender = tracing_appender::rolling::hourly(log_dir, "meteod.log");
    let (logfile, logfile_guard) = tracing_appender::non_blocking(appender);
    let logfile_layer = Layer::new()
        .with_writer(logfile)
        .with_ansi(false)
        .compact();
    let (stdout, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    let stdout_layer = Layer::new().with_writer(stdout).pretty();
    registry()
        .with(logfile_layer.with_filter(filter()?))
        .with(stdout_layer.with_filter(filter()?))
        .try_init()?;
    Ok(Guard {
        _stdout: stdout_guard,
        _logfile: Some(logfile_guard),
    })
}
