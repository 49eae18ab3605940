//! Payloads exchanged with the downstream session queue.
//!
//! Field names of the JSON payloads are consumed by another service and must
//! not change.

use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, derive_more::Display)]
pub enum StreamTaskType {
    #[display("EnqueueSession")]
    EnqueueSession,
    #[display("DeleteSession")]
    DeleteSession,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetNodeProvisionTimeStampActionPayload {
    pub node_name: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateSessionTimeStampActionPayload {
    pub session_id: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetSessionReadyActionPayload {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(rename = "nodeName")]
    pub node_name: String,
    #[serde(rename = "nodeProvisionTimeStamp")]
    pub node_provision_timestamp: i64,
    #[serde(rename = "podScheduleTimeStamp")]
    pub pod_schedule_timestamp: i64,
    #[serde(rename = "podInternalIp")]
    pub pod_internal_ip: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetSessionDeletableActionPayload {
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

/// One entry of a session stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamTask {
    pub task_type: StreamTaskType,
    /// JSON-encoded action payload.
    pub task_info: String,
    /// Unix seconds from the backend clock.
    pub task_create_timestamp: i64,
}

impl StreamTask {
    pub const TASK_TYPE_FIELD: &'static str = "TaskType";
    pub const TASK_INFO_FIELD: &'static str = "TaskInfo";
    pub const TASK_CREATE_TIMESTAMP_FIELD: &'static str = "TaskCreateTimeStamp";

    /// Flat field list in the order the consumer expects.
    pub fn to_fields(&self) -> Vec<(String, String)> {
        vec![
            (Self::TASK_TYPE_FIELD.to_string(), self.task_type.to_string()),
            (Self::TASK_INFO_FIELD.to_string(), self.task_info.clone()),
            (
                Self::TASK_CREATE_TIMESTAMP_FIELD.to_string(),
                self.task_create_timestamp.to_string(),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn ready_payload_uses_consumer_field_names() {
        let payload = SetSessionReadyActionPayload {
            session_id: "s-1".to_string(),
            node_name: "aks-nodepool1-0".to_string(),
            node_provision_timestamp: 100,
            pod_schedule_timestamp: 120,
            pod_internal_ip: "10.0.0.7".to_string(),
        };

        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "sessionId": "s-1",
                "nodeName": "aks-nodepool1-0",
                "nodeProvisionTimeStamp": 100,
                "podScheduleTimeStamp": 120,
                "podInternalIp": "10.0.0.7",
            })
        );
    }

    #[test]
    fn stream_task_fields_are_ordered() {
        let task = StreamTask {
            task_type: StreamTaskType::DeleteSession,
            task_info: r#"{"sessionId":"s-1"}"#.to_string(),
            task_create_timestamp: 1700000000,
        };

        let fields = task.to_fields();
        let names: Vec<_> = fields.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["TaskType", "TaskInfo", "TaskCreateTimeStamp"]);
        assert_eq!(fields[0].1, "DeleteSession");
        assert_eq!(fields[2].1, "1700000000");
    }
}
