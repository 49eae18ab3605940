use std::sync::Arc;

use session_monitor::app::builder::wire_services;
use session_monitor::config::AppConfig;
use session_monitor::config::RedisConfig;
use session_monitor::infrastructure::k8s::ResourceEventHandler;
use session_monitor::repository::InMemoryBackend;
use session_monitor::repository::KvBackend;
use session_monitor::repository::KvRepository;
use session_monitor::session::SetSessionReadyActionPayload;
use session_monitor::session::StreamTask;
use similar_asserts::assert_eq;
use test_log::test;

fn config() -> AppConfig {
    AppConfig {
        gpu_observee_labels: [("accelerator".to_string(), "nvidia".to_string())].into(),
        redis: RedisConfig {
            mock: true,
            backends: Vec::new(),
            ..RedisConfig::default()
        },
        ..AppConfig::default()
    }
}

fn node_object() -> kube::api::DynamicObject {
    serde_json::from_value(serde_json::json!({
        "apiVersion": "v1",
        "kind": "Node",
        "metadata": {
            "name": "aks-viz-0",
            "labels": {
                "accelerator": "nvidia",
                "agentpool": "viz1",
                "nvidia.com/cuda.driver.major": "535",
                "nvidia.com/cuda.driver.minor": "104",
                "nvidia.com/cuda.driver.rev": "05",
            },
        },
    }))
    .unwrap()
}

fn pod_object(phase: &str, conditions: &[&str]) -> kube::api::DynamicObject {
    let conditions: Vec<_> = conditions
        .iter()
        .map(|kind| serde_json::json!({ "type": kind, "status": "True" }))
        .collect();
    serde_json::from_value(serde_json::json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {
            "name": "render-s-42",
            "namespace": "sessions",
            "labels": { "sessionId": "s-42" },
        },
        "spec": { "nodeName": "aks-viz-0", "containers": [] },
        "status": {
            "phase": phase,
            "podIP": "10.244.1.17",
            "conditions": conditions,
        },
    }))
    .unwrap()
}

#[test(tokio::test)]
async fn ready_pod_on_provisioned_node_enqueues_one_session() {
    let backend = Arc::new(InMemoryBackend::new("mock"));
    let repository = Arc::new(KvRepository::new(vec![
        backend.clone() as Arc<dyn KvBackend>
    ]));
    let config = config();
    let services = wire_services(&config, repository);

    let node = node_object();
    services.node_reconciler.on_add(&node).await;
    assert!(backend.members(&config.gpu_agent_pool_set_key).contains("viz1"));

    let pending = pod_object("Pending", &["PodScheduled"]);
    services.pod_reconciler.on_update(&pending, &pending).await;
    assert!(backend.stream(&config.enqueue_session_stream_key).is_empty());

    let running = pod_object(
        "Running",
        &["Initialized", "PodScheduled", "ContainersReady", "Ready"],
    );
    services.pod_reconciler.on_update(&pending, &running).await;

    let entries = backend.stream(&config.enqueue_session_stream_key);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].field(StreamTask::TASK_TYPE_FIELD), Some("EnqueueSession"));

    let task_info: SetSessionReadyActionPayload =
        serde_json::from_str(entries[0].field(StreamTask::TASK_INFO_FIELD).unwrap()).unwrap();
    assert_eq!(task_info.session_id, "s-42");
    assert_eq!(task_info.node_name, "aks-viz-0");
    assert_eq!(task_info.pod_internal_ip, "10.244.1.17");
    assert!(task_info.pod_schedule_timestamp >= task_info.node_provision_timestamp);
    assert_eq!(
        serde_json::from_str::<SetSessionReadyActionPayload>(&serde_json::to_string(&task_info).unwrap())
            .unwrap(),
        task_info
    );
    assert!(backend.stream(&config.delete_session_stream_key).is_empty());
}

#[test(tokio::test)]
async fn ready_pod_on_unknown_node_is_not_enqueued() {
    let backend = Arc::new(InMemoryBackend::new("mock"));
    let repository = Arc::new(KvRepository::new(vec![
        backend.clone() as Arc<dyn KvBackend>
    ]));
    let config = config();
    let services = wire_services(&config, repository);

    let pending = pod_object("Pending", &["PodScheduled"]);
    services.pod_reconciler.on_update(&pending, &pending).await;
    let running = pod_object(
        "Running",
        &["Initialized", "PodScheduled", "ContainersReady", "Ready"],
    );
    services.pod_reconciler.on_update(&pending, &running).await;

    assert!(backend.stream(&config.enqueue_session_stream_key).is_empty());
}

#[test(tokio::test)]
async fn failed_pod_is_marked_deletable() {
    let backend = Arc::new(InMemoryBackend::new("mock"));
    let repository = Arc::new(KvRepository::new(vec![
        backend.clone() as Arc<dyn KvBackend>
    ]));
    let config = config();
    let services = wire_services(&config, repository);

    let failed = pod_object("Failed", &[]);
    services.pod_reconciler.on_update(&failed, &failed).await;

    let entries = backend.stream(&config.delete_session_stream_key);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].field(StreamTask::TASK_TYPE_FIELD), Some("DeleteSession"));
    assert_eq!(
        entries[0].field(StreamTask::TASK_INFO_FIELD),
        Some(r#"{"sessionId":"s-42"}"#)
    );
}
