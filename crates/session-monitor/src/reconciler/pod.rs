use std::sync::Arc;

use async_trait::async_trait;
use error_stack::Report;
use k8s_openapi::api::core::v1::Pod as K8sPod;
use kube::api::DynamicObject;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::parse_object;
use super::ReconcileError;
use crate::domain::DomainEvent;
use crate::domain::EventPayload;
use crate::domain::MonitorDispatcher;
use crate::domain::MonitorEvent;
use crate::domain::Pod;
use crate::domain::PodEvent;
use crate::infrastructure::k8s::ResourceEventHandler;

const CONDITION_TRUE: &str = "True";
const READY_CONDITIONS: [&str; 4] = ["Initialized", "PodScheduled", "ContainersReady", "Ready"];

#[derive(Debug, Clone, PartialEq)]
pub struct PodReconcilerConfig {
    /// Label holding the session id. Pods without it are not session-managed.
    pub session_id_label: String,
    /// Label that opts a pod out when set to `false`.
    pub managed_label: String,
    /// Apply the session/managed gating to add callbacks as well.
    pub filter_unmanaged_pods_on_add: bool,
}

impl Default for PodReconcilerConfig {
    fn default() -> Self {
        Self {
            session_id_label: "sessionId".to_string(),
            managed_label: "managed".to_string(),
            filter_unmanaged_pods_on_add: false,
        }
    }
}

/// Parsed pod together with the status bits the state machine looks at.
struct ObservedPod {
    pod: Pod,
    managed: bool,
    phase: String,
    conditions: Vec<(String, String)>,
    deleting: bool,
    crashed: bool,
}

impl ObservedPod {
    fn condition_is_true(&self, condition: &str) -> bool {
        self.conditions
            .iter()
            .any(|(kind, status)| kind == condition && status == CONDITION_TRUE)
    }

    fn is_session_pod(&self) -> bool {
        !self.pod.session_id.is_empty() && self.managed
    }

    /// Projection carried by delete events: identity only.
    fn identity(&self) -> Pod {
        Pod {
            name: self.pod.name.clone(),
            namespace: self.pod.namespace.clone(),
            session_id: self.pod.session_id.clone(),
            ..Pod::default()
        }
    }
}

/// Classifies a session pod by phase, conditions and container state.
///
/// Readiness and crash detection are evaluated independently; a pod that is
/// both ready and has a terminated container yields a ready event followed
/// by a delete event. At most one delete is emitted per call.
fn classify(observed: &ObservedPod) -> Vec<PodEvent> {
    let mut events = Vec::new();
    match observed.phase.as_str() {
        "Failed" | "Succeeded" | "Unknown" => {
            events.push(PodEvent::Delete(observed.identity()));
        }
        "Pending" if observed.condition_is_true("PodScheduled") => {
            events.push(PodEvent::RecordPodSchedule(observed.identity()));
        }
        "Running" => {
            if READY_CONDITIONS
                .iter()
                .all(|condition| observed.condition_is_true(condition))
            {
                if observed.deleting {
                    events.push(PodEvent::Delete(observed.identity()));
                } else {
                    events.push(PodEvent::Ready(observed.pod.clone()));
                }
            }
            let already_deleting = events.iter().any(|e| matches!(e, PodEvent::Delete(_)));
            if observed.crashed && !already_deleting {
                events.push(PodEvent::Delete(observed.identity()));
            }
        }
        _ => {}
    }
    events
}

/// Turns pod watch callbacks into [`PodEvent`]s for session pods.
pub struct PodReconciler {
    config: PodReconcilerConfig,
    dispatcher: Arc<MonitorDispatcher>,
}

impl PodReconciler {
    pub fn new(config: PodReconcilerConfig, dispatcher: Arc<MonitorDispatcher>) -> Self {
        Self { config, dispatcher }
    }

    fn parse_pod(&self, obj: &DynamicObject) -> Result<ObservedPod, Report<ReconcileError>> {
        let k8s_pod: K8sPod = parse_object(obj, "Pod")?;
        let metadata = k8s_pod.metadata;
        let name = metadata
            .name
            .ok_or_else(|| Report::new(ReconcileError::MissingField { field: "metadata.name" }))?;
        let labels = metadata.labels.unwrap_or_default();
        let status = k8s_pod.status.unwrap_or_default();

        let pod = Pod {
            name,
            namespace: metadata.namespace.unwrap_or_default(),
            session_id: labels
                .get(&self.config.session_id_label)
                .cloned()
                .unwrap_or_default(),
            node_name: k8s_pod
                .spec
                .and_then(|spec| spec.node_name)
                .unwrap_or_default(),
            ip: status.pod_ip.unwrap_or_default(),
        };

        Ok(ObservedPod {
            pod,
            managed: labels.get(&self.config.managed_label).map(String::as_str) != Some("false"),
            phase: status.phase.unwrap_or_default(),
            conditions: status
                .conditions
                .unwrap_or_default()
                .into_iter()
                .map(|c| (c.type_, c.status))
                .collect(),
            deleting: metadata.deletion_timestamp.is_some(),
            crashed: status
                .container_statuses
                .unwrap_or_default()
                .iter()
                .any(|c| c.state.as_ref().is_some_and(|s| s.terminated.is_some())),
        })
    }

    fn observed_pod(&self, obj: &DynamicObject, callback: &str) -> Option<ObservedPod> {
        match self.parse_pod(obj) {
            Ok(observed) => Some(observed),
            Err(e) => {
                error!(callback, "Failed to parse pod: {e:?}");
                None
            }
        }
    }

    async fn publish(&self, pod: &Pod, event: PodEvent) {
        let name = event.event_name();
        let event = DomainEvent::new(MonitorEvent::from(event));
        if let Err(e) = self.dispatcher.publish(&[event]).await {
            error!(pod = %pod.name, namespace = %pod.namespace, event = name, "Failed to publish pod event: {e:?}");
        }
    }
}

#[async_trait]
impl ResourceEventHandler for PodReconciler {
    async fn on_add(&self, obj: &DynamicObject) {
        let Some(observed) = self.observed_pod(obj, "add") else {
            return;
        };
        if self.config.filter_unmanaged_pods_on_add && !observed.is_session_pod() {
            debug!(pod = %observed.pod.name, "Ignoring unmanaged pod on add");
            return;
        }
        info!(pod = %observed.pod.name, namespace = %observed.pod.namespace, session_id = %observed.pod.session_id, "Pod is added");
        self.publish(&observed.pod, PodEvent::Add(observed.identity()))
            .await;
    }

    async fn on_update(&self, _old: &DynamicObject, new: &DynamicObject) {
        let Some(observed) = self.observed_pod(new, "update") else {
            return;
        };
        if !observed.is_session_pod() {
            return;
        }
        info!(
            pod = %observed.pod.name,
            namespace = %observed.pod.namespace,
            session_id = %observed.pod.session_id,
            phase = %observed.phase,
            ip = %observed.pod.ip,
            "Pod is updated"
        );
        if observed.crashed {
            info!(pod = %observed.pod.name, "Pod has terminated containers");
        }

        for event in classify(&observed) {
            self.publish(&observed.pod, event).await;
        }
    }

    async fn on_delete(&self, obj: &DynamicObject) {
        if let Some(observed) = self.observed_pod(obj, "delete") {
            info!(pod = %observed.pod.name, namespace = %observed.pod.namespace, "Pod is deleted");
        }
    }

    async fn on_watch_error(&self, error: &(dyn std::error::Error + Send + Sync)) {
        warn!("Pod watch error: {error}");
        let event = DomainEvent::new(MonitorEvent::from(PodEvent::InformerError {
            message: error.to_string(),
        }));
        if let Err(e) = self.dispatcher.publish(&[event]).await {
            error!("Failed to publish pod informer error: {e:?}");
        }
    }
}
