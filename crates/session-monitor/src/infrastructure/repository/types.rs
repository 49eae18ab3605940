use core::error::Error;
use std::time::Duration;

/// A string value that is written with a TTL and indexed in a set.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheObject {
    pub key: String,
    pub payload: String,
    /// `None` (or zero) keeps the key forever.
    pub expiration: Option<Duration>,
}

impl CacheObject {
    pub fn new(key: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            payload: payload.into(),
            expiration: None,
        }
    }

    pub fn with_expiration(mut self, expiration: Duration) -> Self {
        self.expiration = (!expiration.is_zero()).then_some(expiration);
        self
    }
}

/// Errors that can occur while talking to the key-value backends.
#[derive(Debug, derive_more::Display)]
pub enum RepositoryError {
    #[display("No key-value backend is enabled")]
    NoBackend,
    #[display("Failed to connect to backend {backend}")]
    ConnectionFailed { backend: String },
    #[display("Backend {backend} failed to execute {command}")]
    CommandFailed { backend: String, command: String },
    #[display("{failed} of {total} backends failed")]
    PartialFailure { failed: usize, total: usize },
}

impl Error for RepositoryError {}
