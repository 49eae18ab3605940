mod build_info;
pub mod logging;
pub mod version;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Log path `{0}` has no file name")]
    NoFileName(String),

    #[error("Failed to create rolling file appender: {0}")]
    Appender(#[from] tracing_appender::rolling::InitError),
}
