//! Test doubles for the domain event handlers.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use error_stack::Report;

use crate::session::node_provision_key;
use crate::session::pod_schedule_key;
use crate::session::SessionError;
use crate::session::SessionService;
use crate::session::SetNodeProvisionTimeStampActionPayload;
use crate::session::SetSessionDeletableActionPayload;
use crate::session::SetSessionReadyActionPayload;
use crate::session::UpdateSessionTimeStampActionPayload;

/// A call observed by [`RecordingSessionService`].
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCall {
    SetNodeProvision(SetNodeProvisionTimeStampActionPayload),
    SetPodSchedule(UpdateSessionTimeStampActionPayload),
    GetNodeProvision(String),
    GetPodSchedule(String),
    SetSessionReady(SetSessionReadyActionPayload),
    SetSessionDeletable(SetSessionDeletableActionPayload),
}

/// Session service that keeps timestamps in a map and records every call.
#[derive(Default)]
pub struct RecordingSessionService {
    timestamps: Mutex<HashMap<String, i64>>,
    calls: Mutex<Vec<SessionCall>>,
}

impl RecordingSessionService {
    pub fn with_timestamp(self, key: String, timestamp: i64) -> Self {
        self.timestamps.lock().unwrap().insert(key, timestamp);
        self
    }

    pub fn calls(&self) -> Vec<SessionCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: SessionCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn lookup(&self, key: String) -> Result<i64, Report<SessionError>> {
        self.timestamps
            .lock()
            .unwrap()
            .get(&key)
            .copied()
            .ok_or_else(|| Report::new(SessionError::KeyNotFound { key }))
    }
}

#[async_trait]
impl SessionService for RecordingSessionService {
    fn set_node_provision_timestamp(&self, payload: &SetNodeProvisionTimeStampActionPayload) {
        self.timestamps
            .lock()
            .unwrap()
            .insert(node_provision_key(&payload.node_name), payload.timestamp);
        self.record(SessionCall::SetNodeProvision(payload.clone()));
    }

    fn set_pod_schedule_timestamp(&self, payload: &UpdateSessionTimeStampActionPayload) {
        self.timestamps
            .lock()
            .unwrap()
            .insert(pod_schedule_key(&payload.session_id), payload.timestamp);
        self.record(SessionCall::SetPodSchedule(payload.clone()));
    }

    fn get_node_provision_timestamp(&self, node_name: &str) -> Result<i64, Report<SessionError>> {
        self.record(SessionCall::GetNodeProvision(node_name.to_string()));
        self.lookup(node_provision_key(node_name))
    }

    fn get_pod_schedule_timestamp(&self, session_id: &str) -> Result<i64, Report<SessionError>> {
        self.record(SessionCall::GetPodSchedule(session_id.to_string()));
        self.lookup(pod_schedule_key(session_id))
    }

    async fn set_session_ready(
        &self,
        payload: &SetSessionReadyActionPayload,
    ) -> Result<String, Report<SessionError>> {
        self.record(SessionCall::SetSessionReady(payload.clone()));
        Ok("0-1".to_string())
    }

    async fn set_session_deletable(
        &self,
        payload: &SetSessionDeletableActionPayload,
    ) -> Result<String, Report<SessionError>> {
        self.record(SessionCall::SetSessionDeletable(payload.clone()));
        Ok("0-1".to_string())
    }
}
