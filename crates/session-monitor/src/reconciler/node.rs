use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use error_stack::Report;
use k8s_openapi::api::core::v1::Node as K8sNode;
use kube::api::DynamicObject;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::parse_object;
use super::ReconcileError;
use crate::domain::node::NODE_AGGREGATE;
use crate::domain::Aggregate;
use crate::domain::DomainEvent;
use crate::domain::MonitorDispatcher;
use crate::domain::MonitorEvent;
use crate::domain::Node;
use crate::domain::NodeEvent;
use crate::infrastructure::k8s::ResourceEventHandler;

pub const DRIVER_VERSION_MAJOR_LABEL: &str = "nvidia.com/cuda.driver.major";
pub const DRIVER_VERSION_MINOR_LABEL: &str = "nvidia.com/cuda.driver.minor";
pub const DRIVER_VERSION_REV_LABEL: &str = "nvidia.com/cuda.driver.rev";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeReconcilerConfig {
    /// Every pair must be present on a node for it to be observed.
    pub observee_labels: BTreeMap<String, String>,
}

/// Returns `major.minor.rev` from the GPU driver labels.
///
/// # Errors
///
/// - [`ReconcileError::DriverVersionMissing`] if any of the three labels is absent
pub fn parse_gpu_driver_version(
    labels: &BTreeMap<String, String>,
) -> Result<String, Report<ReconcileError>> {
    let part = |label: &str| {
        labels.get(label).ok_or_else(|| {
            Report::new(ReconcileError::DriverVersionMissing)
                .attach_printable(format!("missing label {label}"))
        })
    };

    let major = part(DRIVER_VERSION_MAJOR_LABEL)?;
    let minor = part(DRIVER_VERSION_MINOR_LABEL)?;
    let rev = part(DRIVER_VERSION_REV_LABEL)?;
    Ok(format!("{major}.{minor}.{rev}"))
}

/// True when every observee pair is present in `labels` with the same value.
pub fn is_observed(labels: &BTreeMap<String, String>, observee: &BTreeMap<String, String>) -> bool {
    observee
        .iter()
        .all(|(key, value)| labels.get(key) == Some(value))
}

/// Turns node watch callbacks into [`NodeEvent`]s for labelled GPU nodes.
pub struct NodeReconciler {
    config: NodeReconcilerConfig,
    dispatcher: Arc<MonitorDispatcher>,
}

impl NodeReconciler {
    pub fn new(config: NodeReconcilerConfig, dispatcher: Arc<MonitorDispatcher>) -> Self {
        Self { config, dispatcher }
    }

    fn parse_node(obj: &DynamicObject) -> Result<Node, Report<ReconcileError>> {
        let node: K8sNode = parse_object(obj, "Node")?;
        let name = node
            .metadata
            .name
            .ok_or_else(|| Report::new(ReconcileError::MissingField { field: "metadata.name" }))?;
        let labels = node.metadata.labels.unwrap_or_default();

        Ok(Node {
            name,
            driver_version: String::new(),
            labels,
        })
    }

    /// Parses `obj` and applies the observee filter.
    fn observed_node(&self, obj: &DynamicObject, callback: &str) -> Option<Node> {
        let node = match Self::parse_node(obj) {
            Ok(node) => node,
            Err(e) => {
                error!(callback, "Failed to parse node: {e:?}");
                return None;
            }
        };
        if !is_observed(&node.labels, &self.config.observee_labels) {
            debug!(node = %node.name, callback, "Node is not observed");
            return None;
        }
        Some(node)
    }

    async fn publish(&self, aggregate: &mut Aggregate<MonitorEvent>) {
        let events = aggregate.take_events();
        if let Err(e) = self.dispatcher.publish(&events).await {
            error!(
                node = %aggregate.id(),
                aggregate = aggregate.name(),
                staged = events.len(),
                "Failed to publish node events: {e:?}"
            );
        }
    }
}

#[async_trait]
impl ResourceEventHandler for NodeReconciler {
    async fn on_add(&self, obj: &DynamicObject) {
        let Some(mut node) = self.observed_node(obj, "add") else {
            return;
        };
        node.driver_version = parse_gpu_driver_version(&node.labels).unwrap_or_default();
        info!(node = %node.name, driver_version = %node.driver_version, "Node is added");

        let mut aggregate = Aggregate::new(node.name.clone(), NODE_AGGREGATE);
        aggregate.add_event(NodeEvent::Add(node.clone()).into());
        aggregate.add_event(NodeEvent::UpdateLabelsCache(node.clone()).into());
        aggregate.add_event(NodeEvent::RecordNodeProvision(node.clone()).into());
        self.publish(&mut aggregate).await;
    }

    async fn on_update(&self, _old: &DynamicObject, new: &DynamicObject) {
        let Some(mut node) = self.observed_node(new, "update") else {
            return;
        };

        let mut aggregate = Aggregate::new(node.name.clone(), NODE_AGGREGATE);
        match parse_gpu_driver_version(&node.labels) {
            Ok(driver_version) => {
                node.driver_version = driver_version;
                info!(node = %node.name, driver_version = %node.driver_version, "Node is updated");
                aggregate.add_event(NodeEvent::Update(node.clone()).into());
                aggregate.add_event(NodeEvent::UpdateLabelsCache(node.clone()).into());
            }
            Err(e) => {
                info!(node = %node.name, "Node is updated, labels cache deferred: {e}");
                aggregate.add_event(NodeEvent::Update(node.clone()).into());
            }
        }
        self.publish(&mut aggregate).await;
    }

    async fn on_delete(&self, obj: &DynamicObject) {
        let Some(node) = self.observed_node(obj, "delete") else {
            return;
        };
        info!(node = %node.name, "Node is deleted");

        let mut aggregate = Aggregate::new(node.name.clone(), NODE_AGGREGATE);
        aggregate.add_event(NodeEvent::Delete(node.clone()).into());
        self.publish(&mut aggregate).await;
    }

    async fn on_watch_error(&self, error: &(dyn std::error::Error + Send + Sync)) {
        warn!("Node watch error: {error}");
        let event = DomainEvent::new(MonitorEvent::from(NodeEvent::InformerError {
            message: error.to_string(),
        }));
        if let Err(e) = self.dispatcher.publish(&[event]).await {
            error!("Failed to publish node informer error: {e:?}");
        }
    }
}
