//! provides logging helpers

use std::path::Path;

use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::RollingFileAppender;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::fmt::layer;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use crate::LoggingError;

/// Environment variable pointing at a log file. When unset logs go to stderr.
pub const LOG_PATH_ENV_VAR: &str = "SESSION_MONITOR_LOG_PATH";

/// A boxed fmt layer plus the guard keeping its background writer alive.
pub type FmtLayer<S> = (Box<dyn Layer<S> + Send + Sync + 'static>, Option<WorkerGuard>);

/// Builds the fmt layer shared by every binary in the workspace.
///
/// With a `log_path` the layer writes to a daily rolling file next to it,
/// keeping the last three files; otherwise it writes to stderr.
pub fn get_fmt_layer<S>(log_path: Option<String>) -> Result<FmtLayer<S>, LoggingError>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let Some(log_path) = log_path else {
        let fmt_layer = layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed();
        return Ok((fmt_layer, None));
    };

    let path = Path::new(&log_path);
    let dir = path.parent().unwrap_or(Path::new("."));
    let file = path
        .file_name()
        .and_then(|f| f.to_str())
        .ok_or_else(|| LoggingError::NoFileName(log_path.clone()))?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(file)
        .max_log_files(3)
        .build(dir)?;

    let (file_writer, file_guard) = tracing_appender::non_blocking(appender);

    let fmt_layer = layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_target(true)
        .boxed();
    Ok((fmt_layer, Some(file_guard)))
}

#[cfg(test)]
mod tests {
    use tracing_subscriber::Registry;

    use super::*;

    #[test]
    fn stderr_layer_has_no_guard() {
        let (_layer, guard) = get_fmt_layer::<Registry>(None).expect("stderr layer");
        assert!(guard.is_none());
    }

    #[test]
    fn rejects_path_without_file_name() {
        let result = get_fmt_layer::<Registry>(Some("/".to_string()));
        assert!(matches!(result, Err(LoggingError::NoFileName(_))));
    }
}
