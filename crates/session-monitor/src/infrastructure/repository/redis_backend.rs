use std::time::Duration;

use async_trait::async_trait;
use error_stack::Report;
use error_stack::ResultExt;
use redis::aio::ConnectionLike;
use redis::aio::ConnectionManager;
use redis::aio::ConnectionManagerConfig;
use tracing::debug;
use tracing::info;

use super::types::CacheObject;
use super::types::RepositoryError;
use super::KvBackend;

/// Bounds on the initial connection attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConnectOptions {
    /// Upper bound for the whole connect, retries included.
    pub timeout: Duration,
    pub retries: usize,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            retries: 2,
        }
    }
}

/// Redis backend. Production code talks through a reconnecting
/// [`ConnectionManager`]; any other [`ConnectionLike`] can be plugged in.
pub struct RedisBackend<C = ConnectionManager> {
    name: String,
    connection: C,
}

impl RedisBackend {
    /// Opens a connection to `address` (`redis://host:port/db`).
    ///
    /// # Errors
    ///
    /// - [`RepositoryError::ConnectionFailed`] if the address is invalid or the
    ///   server cannot be reached within `options.timeout`
    pub async fn connect(
        name: &str,
        address: &str,
        options: ConnectOptions,
    ) -> Result<Self, Report<RepositoryError>> {
        let connection_failed = || RepositoryError::ConnectionFailed {
            backend: name.to_string(),
        };
        let client = redis::Client::open(address)
            .change_context_lazy(connection_failed)
            .attach_printable_lazy(|| format!("address: {address}"))?;

        let config = ConnectionManagerConfig::new()
            .set_number_of_retries(options.retries)
            .set_connection_timeout(options.timeout)
            .set_response_timeout(options.timeout);
        let connection = tokio::time::timeout(
            options.timeout,
            client.get_connection_manager_with_config(config),
        )
        .await
        .change_context_lazy(connection_failed)
        .attach_printable_lazy(|| format!("gave up after {:?}", options.timeout))?
        .change_context_lazy(connection_failed)
        .attach_printable_lazy(|| format!("address: {address}"))?;

        info!(backend = name, address, "Connected to redis");
        Ok(Self::with_connection(name, connection))
    }
}

impl<C> RedisBackend<C>
where
    C: ConnectionLike + Clone + Send + Sync + 'static,
{
    pub fn with_connection(name: &str, connection: C) -> Self {
        Self {
            name: name.to_string(),
            connection,
        }
    }

    fn command_failed(&self, command: &str) -> RepositoryError {
        RepositoryError::CommandFailed {
            backend: self.name.clone(),
            command: command.to_string(),
        }
    }
}

#[async_trait]
impl<C> KvBackend for RedisBackend<C>
where
    C: ConnectionLike + Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn server_timestamp(&self) -> Result<i64, Report<RepositoryError>> {
        let mut connection = self.connection.clone();
        let (seconds, _micros): (i64, i64) = redis::cmd("TIME")
            .query_async(&mut connection)
            .await
            .change_context_lazy(|| self.command_failed("TIME"))?;
        Ok(seconds)
    }

    async fn ping(&self) -> Result<String, Report<RepositoryError>> {
        let mut connection = self.connection.clone();
        let pong: String = redis::cmd("PING")
            .query_async(&mut connection)
            .await
            .change_context_lazy(|| self.command_failed("PING"))?;
        Ok(pong)
    }

    async fn add_stream_event(
        &self,
        stream_key: &str,
        id: &str,
        fields: &[(String, String)],
    ) -> Result<String, Report<RepositoryError>> {
        let mut cmd = redis::cmd("XADD");
        cmd.arg(stream_key).arg(id);
        for (field, value) in fields {
            cmd.arg(field).arg(value);
        }

        let mut connection = self.connection.clone();
        let entry_id: String = cmd
            .query_async(&mut connection)
            .await
            .change_context_lazy(|| self.command_failed("XADD"))
            .attach_printable_lazy(|| format!("stream: {stream_key}"))?;
        Ok(entry_id)
    }

    async fn add_to_unsorted_set(
        &self,
        set_key: &str,
        objects: &[CacheObject],
    ) -> Result<u64, Report<RepositoryError>> {
        if objects.is_empty() {
            return Ok(0);
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for object in objects {
            pipe.cmd("SET").arg(&object.key).arg(&object.payload);
            if let Some(expiration) = object.expiration {
                pipe.arg("PX").arg(expiration.as_millis() as u64);
            }
            pipe.ignore();
        }
        let keys: Vec<&str> = objects.iter().map(|o| o.key.as_str()).collect();
        pipe.cmd("SADD").arg(set_key).arg(keys);

        let mut connection = self.connection.clone();
        let (added,): (u64,) = pipe
            .query_async(&mut connection)
            .await
            .change_context_lazy(|| self.command_failed("MULTI SET SADD"))
            .attach_printable_lazy(|| format!("set: {set_key}"))?;

        debug!(backend = %self.name, set_key, added, "Added keys to unsorted set");
        Ok(added)
    }
}
