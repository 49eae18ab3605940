//! Key-value and stream storage.
//!
//! [`KvRepository`] fans every operation out to all enabled [`KvBackend`]s in
//! sequence. A call succeeds only when every backend succeeded; it then
//! returns the last backend's result. Earlier failures never short-circuit
//! later backends, and any failure turns the whole call into a
//! [`RepositoryError::PartialFailure`] that carries each backend's error.

pub mod memory;
pub mod redis_backend;
pub mod types;

use std::sync::Arc;

use async_trait::async_trait;
use error_stack::Report;
use tracing::debug;
use tracing::warn;

pub use memory::InMemoryBackend;
pub use redis_backend::ConnectOptions;
pub use redis_backend::RedisBackend;
pub use types::CacheObject;
pub use types::RepositoryError;

/// Stream id asking the backend to assign the next id.
pub const AUTO_STREAM_ID: &str = "*";

/// A single key-value store client.
#[async_trait]
pub trait KvBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Current server time in Unix seconds.
    async fn server_timestamp(&self) -> Result<i64, Report<RepositoryError>>;

    async fn ping(&self) -> Result<String, Report<RepositoryError>>;

    /// Appends `fields` to `stream_key` and returns the entry id.
    async fn add_stream_event(
        &self,
        stream_key: &str,
        id: &str,
        fields: &[(String, String)],
    ) -> Result<String, Report<RepositoryError>>;

    /// Atomically sets every object's key and adds the keys to `set_key`.
    /// Returns the number of keys that were not yet members.
    async fn add_to_unsorted_set(
        &self,
        set_key: &str,
        objects: &[CacheObject],
    ) -> Result<u64, Report<RepositoryError>>;
}

/// Accumulates per-backend outcomes of one fan-out call.
struct FanOut<T> {
    operation: &'static str,
    total: usize,
    last: Option<T>,
    failures: Option<Report<RepositoryError>>,
    failed: usize,
}

impl<T> FanOut<T> {
    fn new(operation: &'static str, total: usize) -> Self {
        Self {
            operation,
            total,
            last: None,
            failures: None,
            failed: 0,
        }
    }

    fn record(&mut self, backend: &str, result: Result<T, Report<RepositoryError>>) {
        match result {
            Ok(value) => self.last = Some(value),
            Err(report) => {
                warn!(backend, operation = self.operation, "Backend operation failed: {report:?}");
                self.failed += 1;
                match self.failures.as_mut() {
                    Some(failures) => failures.extend_one(report),
                    None => self.failures = Some(report),
                }
            }
        }
    }

    fn finish(self) -> Result<T, Report<RepositoryError>> {
        if let Some(failures) = self.failures {
            return Err(failures.change_context(RepositoryError::PartialFailure {
                failed: self.failed,
                total: self.total,
            }));
        }
        self.last
            .ok_or_else(|| Report::new(RepositoryError::NoBackend))
    }
}

/// Fan-out writer over every enabled backend.
pub struct KvRepository {
    backends: Vec<Arc<dyn KvBackend>>,
}

impl KvRepository {
    pub fn new(backends: Vec<Arc<dyn KvBackend>>) -> Self {
        Self { backends }
    }

    /// Builds the repository and pings every backend once.
    ///
    /// # Errors
    ///
    /// - [`RepositoryError::NoBackend`] if `backends` is empty
    /// - [`RepositoryError::PartialFailure`] if any backend does not answer
    pub async fn connect(
        backends: Vec<Arc<dyn KvBackend>>,
    ) -> Result<Self, Report<RepositoryError>> {
        let repository = Self::new(backends);
        let pong = repository.ping().await?;
        debug!(response = %pong, backends = repository.backends.len(), "Key-value backends answered");
        Ok(repository)
    }

    pub fn backend_names(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    /// Authoritative clock shared by every producer writing to the same backend.
    pub async fn get_server_timestamp(&self) -> Result<i64, Report<RepositoryError>> {
        let mut fan_out = FanOut::new("TIME", self.backends.len());
        for backend in &self.backends {
            fan_out.record(backend.name(), backend.server_timestamp().await);
        }
        fan_out.finish()
    }

    pub async fn ping(&self) -> Result<String, Report<RepositoryError>> {
        let mut fan_out = FanOut::new("PING", self.backends.len());
        for backend in &self.backends {
            fan_out.record(backend.name(), backend.ping().await);
        }
        fan_out.finish()
    }

    pub async fn add_stream_event(
        &self,
        stream_key: &str,
        id: &str,
        fields: &[(String, String)],
    ) -> Result<String, Report<RepositoryError>> {
        let mut fan_out = FanOut::new("XADD", self.backends.len());
        for backend in &self.backends {
            fan_out.record(
                backend.name(),
                backend.add_stream_event(stream_key, id, fields).await,
            );
        }
        fan_out.finish()
    }

    pub async fn add_to_unsorted_set(
        &self,
        set_key: &str,
        objects: &[CacheObject],
    ) -> Result<u64, Report<RepositoryError>> {
        let mut fan_out = FanOut::new("MULTI SET SADD", self.backends.len());
        for backend in &self.backends {
            fan_out.record(
                backend.name(),
                backend.add_to_unsorted_set(set_key, objects).await,
            );
        }
        fan_out.finish()
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;
    use test_log::test;

    use super::memory::Command;
    use super::*;

    fn repository_over(backends: &[Arc<InMemoryBackend>]) -> KvRepository {
        KvRepository::new(
            backends
                .iter()
                .map(|b| b.clone() as Arc<dyn KvBackend>)
                .collect(),
        )
    }

    #[test(tokio::test)]
    async fn connect_pings_every_backend() {
        let first = Arc::new(InMemoryBackend::new("first"));
        let second = Arc::new(InMemoryBackend::new("second"));

        let repository = KvRepository::connect(vec![
            first.clone() as Arc<dyn KvBackend>,
            second.clone() as Arc<dyn KvBackend>,
        ])
        .await
        .expect("both backends answer");

        assert_eq!(repository.backend_names(), vec!["first", "second"]);
        assert_eq!(first.commands(), vec![Command::Ping]);
        assert_eq!(second.commands(), vec![Command::Ping]);
    }

    #[test(tokio::test)]
    async fn connect_fails_without_backends() {
        let err = KvRepository::connect(Vec::new())
            .await
            .err()
            .expect("no backend to ping");
        assert!(matches!(err.current_context(), RepositoryError::NoBackend));
    }

    #[test(tokio::test)]
    async fn connect_fails_when_a_backend_is_down() {
        let down = Arc::new(InMemoryBackend::new("down"));
        down.set_failing(true);

        let err = KvRepository::connect(vec![down as Arc<dyn KvBackend>])
            .await
            .err()
            .expect("ping should fail");
        assert!(matches!(
            err.current_context(),
            RepositoryError::PartialFailure { failed: 1, total: 1 }
        ));
    }

    #[test(tokio::test)]
    async fn unsorted_set_write_reaches_every_backend() {
        let first = Arc::new(InMemoryBackend::new("first"));
        let second = Arc::new(InMemoryBackend::new("second"));
        let repository = repository_over(&[first.clone(), second.clone()]);

        let added = repository
            .add_to_unsorted_set("pools", &[CacheObject::new("viz1", "P")])
            .await
            .expect("write should succeed");

        assert_eq!(added, 1);
        for backend in [&first, &second] {
            assert_eq!(backend.get("viz1").as_deref(), Some("P"));
            assert!(backend.members("pools").contains("viz1"));
        }

        let added_again = repository
            .add_to_unsorted_set("pools", &[CacheObject::new("viz1", "P")])
            .await
            .unwrap();
        assert_eq!(added_again, 0);
    }

    #[test(tokio::test)]
    async fn failing_backend_does_not_stop_later_backends() {
        let first = Arc::new(InMemoryBackend::new("first"));
        let second = Arc::new(InMemoryBackend::new("second"));
        first.set_failing(true);
        let repository = repository_over(&[first.clone(), second.clone()]);
        let fields = vec![("TaskType".to_string(), "DeleteSession".to_string())];

        let err = repository
            .add_stream_event("delete", AUTO_STREAM_ID, &fields)
            .await
            .expect_err("first backend fails");

        assert!(matches!(
            err.current_context(),
            RepositoryError::PartialFailure { failed: 1, total: 2 }
        ));
        assert!(first.stream("delete").is_empty());
        assert_eq!(second.stream("delete").len(), 1);
    }

    #[test(tokio::test)]
    async fn server_timestamp_comes_from_backend() {
        let backend = Arc::new(InMemoryBackend::new("mock"));
        let repository = repository_over(&[backend.clone()]);
        let before = chrono::Utc::now().timestamp();

        let timestamp = repository.get_server_timestamp().await.unwrap();

        assert!(timestamp >= before);
        assert_eq!(backend.commands(), vec![Command::Time]);
    }
}
