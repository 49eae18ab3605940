use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use error_stack::Report;
use error_stack::ResultExt;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::domain::node::NODE_ADD_EVENT;
use crate::domain::node::NODE_DELETE_EVENT;
use crate::domain::node::NODE_INFORMER_ERROR_EVENT;
use crate::domain::node::NODE_RECORD_NODE_PROVISION_EVENT;
use crate::domain::node::NODE_UPDATE_EVENT;
use crate::domain::node::NODE_UPDATE_LABELS_CACHE_EVENT;
use crate::domain::EventHandler;
use crate::domain::HandlerError;
use crate::domain::MonitorDispatcher;
use crate::domain::MonitorDomainEvent;
use crate::domain::MonitorEvent;
use crate::domain::Node;
use crate::domain::NodeEvent;
use crate::infrastructure::repository::CacheObject;
use crate::infrastructure::repository::KvRepository;
use crate::session::SessionService;
use crate::session::SetNodeProvisionTimeStampActionPayload;

pub const NODE_HANDLED_EVENTS: [&str; 6] = [
    NODE_ADD_EVENT,
    NODE_UPDATE_EVENT,
    NODE_DELETE_EVENT,
    NODE_RECORD_NODE_PROVISION_EVENT,
    NODE_UPDATE_LABELS_CACHE_EVENT,
    NODE_INFORMER_ERROR_EVENT,
];

/// Where the agent pool labels cache is written.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelsCacheConfig {
    /// Set indexing every agent pool key.
    pub set_key: String,
    /// Node label whose value names the agent pool.
    pub agent_pool_label: String,
    /// Zero keeps entries forever.
    pub ttl: Duration,
}

pub struct NodeDomainEventHandler {
    repository: Arc<KvRepository>,
    session_service: Arc<dyn SessionService>,
    config: LabelsCacheConfig,
}

impl NodeDomainEventHandler {
    pub fn new(
        repository: Arc<KvRepository>,
        session_service: Arc<dyn SessionService>,
        config: LabelsCacheConfig,
    ) -> Self {
        Self {
            repository,
            session_service,
            config,
        }
    }

    /// Subscribes `handler` to every node event.
    pub fn subscribe(handler: Arc<Self>, dispatcher: &MonitorDispatcher) {
        dispatcher.subscribe(handler, &NODE_HANDLED_EVENTS);
    }

    /// Best effort: a clock failure is logged and nothing is recorded.
    async fn record_node_provision(&self, node: &Node) -> Result<(), Report<HandlerError>> {
        let timestamp = match self.repository.get_server_timestamp().await {
            Ok(timestamp) => timestamp,
            Err(e) => {
                error!(node = %node.name, "Failed to read server timestamp: {e:?}");
                return Ok(());
            }
        };

        info!(node = %node.name, timestamp, "Node is provisioned");
        self.session_service
            .set_node_provision_timestamp(&SetNodeProvisionTimeStampActionPayload {
                node_name: node.name.clone(),
                timestamp,
            });
        Ok(())
    }

    async fn update_labels_cache(&self, node: &Node) -> Result<(), Report<HandlerError>> {
        let Some(agent_pool) = node.label(&self.config.agent_pool_label) else {
            warn!(node = %node.name, label = %self.config.agent_pool_label, "Node has no agent pool label, skipping labels cache");
            return Ok(());
        };

        let payload = serde_json::to_string(&node.labels).change_context_lazy(|| {
            HandlerError::BadNodeLabel {
                labels: node.labels.clone(),
            }
        })?;
        let object = CacheObject::new(agent_pool, payload).with_expiration(self.config.ttl);

        let added = self
            .repository
            .add_to_unsorted_set(&self.config.set_key, &[object])
            .await
            .change_context(HandlerError::Repository)
            .attach_printable_lazy(|| format!("agent pool: {agent_pool}"))?;
        info!(agent_pool, set_key = %self.config.set_key, added, "Updated agent pool labels cache");
        Ok(())
    }
}

#[async_trait]
impl EventHandler<MonitorDomainEvent> for NodeDomainEventHandler {
    async fn handle_event(&self, event: &MonitorDomainEvent) -> Result<(), Report<HandlerError>> {
        debug!(event = event.name(), "Handling node event");
        let MonitorEvent::Node(node_event) = event.payload() else {
            return Ok(());
        };

        match node_event {
            NodeEvent::Add(node) => {
                info!(node = %node.name, driver_version = %node.driver_version, "Node is added");
                Ok(())
            }
            NodeEvent::Update(node) => {
                info!(node = %node.name, driver_version = %node.driver_version, "Node is updated");
                Ok(())
            }
            NodeEvent::Delete(node) => {
                info!(node = %node.name, "Node is deleted");
                Ok(())
            }
            NodeEvent::RecordNodeProvision(node) => self.record_node_provision(node).await,
            NodeEvent::UpdateLabelsCache(node) => self.update_labels_cache(node).await,
            NodeEvent::InformerError { .. } => Ok(()),
        }
    }
}
