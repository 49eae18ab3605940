//! Session correlation.
//!
//! A session becomes ready once both the node it runs on and its pod have
//! reported their timestamps. Those timestamps are kept in a [`ScalarCache`];
//! ready and deletable transitions are published as [`StreamTask`]s on the
//! configured streams.

pub mod cache;
pub mod payload;

use core::error::Error;
use std::sync::Arc;

use async_trait::async_trait;
use error_stack::Report;
use error_stack::ResultExt;
use serde::Serialize;
use tracing::debug;
use tracing::info;

use crate::infrastructure::repository::KvRepository;
use crate::infrastructure::repository::AUTO_STREAM_ID;

pub use cache::InMemoryScalarCache;
pub use cache::ScalarCache;
pub use payload::*;

const NODE_PROVISION_KEY_PREFIX: &str = "NodeProvisionTimeStamp";
const POD_SCHEDULE_KEY_PREFIX: &str = "PodScheduleTimeStamp";

pub fn node_provision_key(node_name: &str) -> String {
    format!("{NODE_PROVISION_KEY_PREFIX}.{node_name}")
}

pub fn pod_schedule_key(session_id: &str) -> String {
    format!("{POD_SCHEDULE_KEY_PREFIX}.{session_id}")
}

#[derive(Debug, PartialEq, derive_more::Display)]
pub enum SessionError {
    #[display("Store key {key} does not exist")]
    KeyNotFound { key: String },
    #[display("Failed to encode session payload")]
    Encode,
    #[display("Failed to write session task")]
    Repository,
}

impl Error for SessionError {}

/// Stream keys the session tasks are appended to.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStreams {
    pub enqueue_session_stream_key: String,
    pub delete_session_stream_key: String,
}

#[async_trait]
pub trait SessionService: Send + Sync {
    fn set_node_provision_timestamp(&self, payload: &SetNodeProvisionTimeStampActionPayload);

    fn set_pod_schedule_timestamp(&self, payload: &UpdateSessionTimeStampActionPayload);

    /// # Errors
    ///
    /// - [`SessionError::KeyNotFound`] if the node never reported a provision time
    fn get_node_provision_timestamp(&self, node_name: &str) -> Result<i64, Report<SessionError>>;

    /// # Errors
    ///
    /// - [`SessionError::KeyNotFound`] if the pod never reported a schedule time
    fn get_pod_schedule_timestamp(&self, session_id: &str) -> Result<i64, Report<SessionError>>;

    /// Appends an `EnqueueSession` task and returns its stream id.
    async fn set_session_ready(
        &self,
        payload: &SetSessionReadyActionPayload,
    ) -> Result<String, Report<SessionError>>;

    /// Appends a `DeleteSession` task and returns its stream id. The
    /// session's schedule timestamp is forgotten once the task is written.
    async fn set_session_deletable(
        &self,
        payload: &SetSessionDeletableActionPayload,
    ) -> Result<String, Report<SessionError>>;
}

/// [`SessionService`] backed by a scalar cache and the key-value repository.
pub struct StreamSessionService {
    cache: Arc<dyn ScalarCache>,
    repository: Arc<KvRepository>,
    streams: SessionStreams,
}

impl StreamSessionService {
    pub fn new(
        cache: Arc<dyn ScalarCache>,
        repository: Arc<KvRepository>,
        streams: SessionStreams,
    ) -> Self {
        Self {
            cache,
            repository,
            streams,
        }
    }

    fn lookup(&self, key: String) -> Result<i64, Report<SessionError>> {
        self.cache
            .get(&key)
            .ok_or_else(|| Report::new(SessionError::KeyNotFound { key }))
    }

    async fn push_task<P: Serialize + Sync>(
        &self,
        stream_key: &str,
        task_type: StreamTaskType,
        payload: &P,
    ) -> Result<String, Report<SessionError>> {
        let task_info = serde_json::to_string(payload).change_context(SessionError::Encode)?;
        let task_create_timestamp = self
            .repository
            .get_server_timestamp()
            .await
            .change_context(SessionError::Repository)?;

        let task = StreamTask {
            task_type,
            task_info,
            task_create_timestamp,
        };
        let stream_id = self
            .repository
            .add_stream_event(stream_key, AUTO_STREAM_ID, &task.to_fields())
            .await
            .change_context(SessionError::Repository)
            .attach_printable_lazy(|| format!("stream: {stream_key}"))?;

        info!(%task_type, stream_key, stream_id = %stream_id, task_info = %task.task_info, "Created stream task");
        Ok(stream_id)
    }
}

#[async_trait]
impl SessionService for StreamSessionService {
    fn set_node_provision_timestamp(&self, payload: &SetNodeProvisionTimeStampActionPayload) {
        let key = node_provision_key(&payload.node_name);
        info!(node = %payload.node_name, timestamp = payload.timestamp, key = %key, "Set node provision timestamp");
        self.cache.set(&key, payload.timestamp);
    }

    fn set_pod_schedule_timestamp(&self, payload: &UpdateSessionTimeStampActionPayload) {
        let key = pod_schedule_key(&payload.session_id);
        info!(session_id = %payload.session_id, timestamp = payload.timestamp, key = %key, "Set pod schedule timestamp");
        self.cache.set(&key, payload.timestamp);
    }

    fn get_node_provision_timestamp(&self, node_name: &str) -> Result<i64, Report<SessionError>> {
        self.lookup(node_provision_key(node_name))
    }

    fn get_pod_schedule_timestamp(&self, session_id: &str) -> Result<i64, Report<SessionError>> {
        self.lookup(pod_schedule_key(session_id))
    }

    async fn set_session_ready(
        &self,
        payload: &SetSessionReadyActionPayload,
    ) -> Result<String, Report<SessionError>> {
        self.push_task(
            &self.streams.enqueue_session_stream_key,
            StreamTaskType::EnqueueSession,
            payload,
        )
        .await
    }

    async fn set_session_deletable(
        &self,
        payload: &SetSessionDeletableActionPayload,
    ) -> Result<String, Report<SessionError>> {
        let stream_id = self
            .push_task(
                &self.streams.delete_session_stream_key,
                StreamTaskType::DeleteSession,
                payload,
            )
            .await?;

        let key = pod_schedule_key(&payload.session_id);
        if self.cache.remove(&key).is_some() {
            debug!(session_id = %payload.session_id, key = %key, "Dropped pod schedule timestamp");
        }
        Ok(stream_id)
    }
}
