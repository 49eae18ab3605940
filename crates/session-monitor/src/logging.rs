//! provides logging helpers

use std::env;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry;
use tracing_subscriber::Registry;
use utils::logging::get_fmt_layer;
use utils::logging::LOG_PATH_ENV_VAR;
use utils::LoggingError;

/// initiate the global tracing subscriber
///
/// The returned guard flushes the file writer on drop and must live as long
/// as the process logs.
pub fn init() -> Result<Option<WorkerGuard>, LoggingError> {
    let log_path = env::var(LOG_PATH_ENV_VAR).ok();
    let (fmt_layer, guard) = get_fmt_layer::<Registry>(log_path)?;

    let env_filter = filter::EnvFilter::builder()
        .with_default_directive(filter::LevelFilter::INFO.into())
        .from_env_lossy();

    registry().with(fmt_layer.with_filter(env_filter)).init();
    Ok(guard)
}
