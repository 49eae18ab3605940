use std::collections::BTreeMap;

use serde::Serialize;

use super::event::EventPayload;

pub const NODE_AGGREGATE: &str = "nodes.NodeAggregate";

pub const NODE_INFORMER_ERROR_EVENT: &str = "NodeInformerErrorEvent";
pub const NODE_ADD_EVENT: &str = "NodeAddEvent";
pub const NODE_UPDATE_EVENT: &str = "NodeUpdateEvent";
pub const NODE_DELETE_EVENT: &str = "NodeDeleteEvent";
pub const NODE_RECORD_NODE_PROVISION_EVENT: &str = "NodeRecordNodeProvisionEvent";
pub const NODE_UPDATE_LABELS_CACHE_EVENT: &str = "NodeUpdateLabelsCacheEvent";

/// Node as seen by a single watch callback. Rebuilt every time, never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    pub name: String,
    /// `major.minor.rev` of the GPU driver, empty when the driver labels are absent.
    pub driver_version: String,
    pub labels: BTreeMap<String, String>,
}

impl Node {
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeEvent {
    Add(Node),
    Update(Node),
    Delete(Node),
    RecordNodeProvision(Node),
    UpdateLabelsCache(Node),
    InformerError { message: String },
}

impl EventPayload for NodeEvent {
    fn event_name(&self) -> &'static str {
        match self {
            Self::Add(_) => NODE_ADD_EVENT,
            Self::Update(_) => NODE_UPDATE_EVENT,
            Self::Delete(_) => NODE_DELETE_EVENT,
            Self::RecordNodeProvision(_) => NODE_RECORD_NODE_PROVISION_EVENT,
            Self::UpdateLabelsCache(_) => NODE_UPDATE_LABELS_CACHE_EVENT,
            Self::InformerError { .. } => NODE_INFORMER_ERROR_EVENT,
        }
    }
}
