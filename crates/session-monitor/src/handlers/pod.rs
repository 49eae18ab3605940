use std::sync::Arc;

use async_trait::async_trait;
use error_stack::Report;
use error_stack::ResultExt;
use tracing::info;

use crate::domain::pod::POD_ADD_EVENT;
use crate::domain::pod::POD_DELETE_EVENT;
use crate::domain::pod::POD_READY_EVENT;
use crate::domain::pod::POD_RECORD_POD_SCHEDULE_EVENT;
use crate::domain::EventHandler;
use crate::domain::HandlerError;
use crate::domain::MonitorDispatcher;
use crate::domain::MonitorDomainEvent;
use crate::domain::MonitorEvent;
use crate::domain::Pod;
use crate::domain::PodEvent;
use crate::infrastructure::repository::KvRepository;
use crate::session::SessionService;
use crate::session::SetSessionDeletableActionPayload;
use crate::session::SetSessionReadyActionPayload;
use crate::session::UpdateSessionTimeStampActionPayload;

pub const POD_HANDLED_EVENTS: [&str; 4] = [
    POD_ADD_EVENT,
    POD_DELETE_EVENT,
    POD_READY_EVENT,
    POD_RECORD_POD_SCHEDULE_EVENT,
];

pub struct PodDomainEventHandler {
    repository: Arc<KvRepository>,
    session_service: Arc<dyn SessionService>,
}

impl PodDomainEventHandler {
    pub fn new(repository: Arc<KvRepository>, session_service: Arc<dyn SessionService>) -> Self {
        Self {
            repository,
            session_service,
        }
    }

    pub fn subscribe(handler: Arc<Self>, dispatcher: &MonitorDispatcher) {
        dispatcher.subscribe(handler, &POD_HANDLED_EVENTS);
    }

    async fn on_pod_deleted(&self, pod: &Pod) -> Result<(), Report<HandlerError>> {
        info!(pod = %pod.name, namespace = %pod.namespace, session_id = %pod.session_id, "Pod is deleted");
        self.session_service
            .set_session_deletable(&SetSessionDeletableActionPayload {
                session_id: pod.session_id.clone(),
            })
            .await
            .change_context(HandlerError::Session)?;
        Ok(())
    }

    async fn on_record_pod_schedule(&self, pod: &Pod) -> Result<(), Report<HandlerError>> {
        let timestamp = self
            .repository
            .get_server_timestamp()
            .await
            .change_context(HandlerError::Repository)?;
        info!(session_id = %pod.session_id, timestamp, "Session is scheduled");
        self.session_service
            .set_pod_schedule_timestamp(&UpdateSessionTimeStampActionPayload {
                session_id: pod.session_id.clone(),
                timestamp,
            });
        Ok(())
    }

    /// Requires both correlated timestamps. The node timestamp is read first
    /// and a miss returns before the pod timestamp is looked up.
    async fn on_pod_ready(&self, pod: &Pod) -> Result<(), Report<HandlerError>> {
        info!(
            pod = %pod.name,
            namespace = %pod.namespace,
            session_id = %pod.session_id,
            node = %pod.node_name,
            ip = %pod.ip,
            "Pod should be ready and enqueued"
        );
        let node_provision_timestamp = self
            .session_service
            .get_node_provision_timestamp(&pod.node_name)
            .change_context(HandlerError::Session)?;
        let pod_schedule_timestamp = self
            .session_service
            .get_pod_schedule_timestamp(&pod.session_id)
            .change_context(HandlerError::Session)?;

        self.session_service
            .set_session_ready(&SetSessionReadyActionPayload {
                session_id: pod.session_id.clone(),
                node_name: pod.node_name.clone(),
                node_provision_timestamp,
                pod_schedule_timestamp,
                pod_internal_ip: pod.ip.clone(),
            })
            .await
            .change_context(HandlerError::Session)?;
        Ok(())
    }
}

#[async_trait]
impl EventHandler<MonitorDomainEvent> for PodDomainEventHandler {
    async fn handle_event(&self, event: &MonitorDomainEvent) -> Result<(), Report<HandlerError>> {
        let MonitorEvent::Pod(pod_event) = event.payload() else {
            return Ok(());
        };

        match pod_event {
            PodEvent::Add(pod) => {
                info!(pod = %pod.name, namespace = %pod.namespace, session_id = %pod.session_id, "Pod is added");
                Ok(())
            }
            PodEvent::Delete(pod) => self.on_pod_deleted(pod).await,
            PodEvent::RecordPodSchedule(pod) => self.on_record_pod_schedule(pod).await,
            PodEvent::Ready(pod) => self.on_pod_ready(pod).await,
            PodEvent::InformerError { .. } => Ok(()),
        }
    }
}
