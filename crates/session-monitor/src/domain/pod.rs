use serde::Serialize;

use super::event::EventPayload;

pub const POD_INFORMER_ERROR_EVENT: &str = "PodInformerErrorEvent";
pub const POD_ADD_EVENT: &str = "PodAddEvent";
pub const POD_DELETE_EVENT: &str = "PodDeleteEvent";
pub const POD_READY_EVENT: &str = "PodReadyEvent";
pub const POD_RECORD_POD_SCHEDULE_EVENT: &str = "PodRecordPodScheduleEvent";

/// Pod as seen by a single watch callback. Rebuilt every time, never stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pod {
    pub name: String,
    pub namespace: String,
    /// Empty when the pod is not managed by the session backend.
    pub session_id: String,
    pub node_name: String,
    pub ip: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PodEvent {
    Add(Pod),
    Delete(Pod),
    Ready(Pod),
    RecordPodSchedule(Pod),
    InformerError { message: String },
}

impl EventPayload for PodEvent {
    fn event_name(&self) -> &'static str {
        match self {
            Self::Add(_) => POD_ADD_EVENT,
            Self::Delete(_) => POD_DELETE_EVENT,
            Self::Ready(_) => POD_READY_EVENT,
            Self::RecordPodSchedule(_) => POD_RECORD_POD_SCHEDULE_EVENT,
            Self::InformerError { .. } => POD_INFORMER_ERROR_EVENT,
        }
    }
}
