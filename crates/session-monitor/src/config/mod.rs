pub mod app;
pub mod cli;

use core::error::Error;

pub use app::*;
pub use cli::*;

#[derive(Debug, derive_more::Display)]
pub enum ConfigError {
    #[display("Failed to read configuration file {path}")]
    Read { path: String },
    #[display("Failed to parse configuration")]
    Parse,
    #[display("Invalid configuration: {message}")]
    Invalid { message: String },
}

impl Error for ConfigError {}
