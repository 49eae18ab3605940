use anyhow::Result;
use k8s_openapi::api::core::v1::Node as K8sNode;
use k8s_openapi::api::core::v1::Pod as K8sPod;
use kube::api::ApiResource;
use tracing::info;

use crate::api::ProbeServer;
use crate::app::services::ApplicationServices;
use crate::config::AppConfig;
use crate::infrastructure::k8s::Informer;
use crate::infrastructure::kube_client::init_kube_client;
use crate::worker::WorkerSyncer;

/// Application core structure with explicit dependencies
pub struct Application {
    services: ApplicationServices,
    config: AppConfig,
}

impl Application {
    pub fn new(services: ApplicationServices, config: AppConfig) -> Self {
        Self { services, config }
    }

    pub fn services(&self) -> &ApplicationServices {
        &self.services
    }

    /// Starts the probe server and both informers and blocks until they all
    /// stopped.
    pub async fn run(self) -> Result<()> {
        info!("Starting all application tasks...");
        let client = init_kube_client(self.config.kubeconfig.clone())
            .await
            .map_err(|e| anyhow::anyhow!("Failed to initialize Kubernetes client: {e:?}"))?;

        let mut syncer = WorkerSyncer::new();

        let probe_server = ProbeServer::new(self.config.port, self.config.shutdown_grace());
        probe_server.set_ready(true);
        syncer.add("probe-server", move |token| probe_server.run(token));

        let pod_informer = Informer::new(
            ApiResource::erase::<K8sPod>(&()),
            self.config.pod_namespace.clone(),
            self.services.pod_reconciler.clone(),
        );
        let pod_client = client.clone();
        syncer.add("pod-informer", move |token| async move {
            pod_informer.run(pod_client, token).await
        });

        let node_informer = Informer::new(
            ApiResource::erase::<K8sNode>(&()),
            None,
            self.services.node_reconciler.clone(),
        );
        syncer.add("node-informer", move |token| async move {
            node_informer.run(client, token).await
        });

        syncer
            .sync()
            .await
            .map_err(|e| anyhow::anyhow!("Application stopped with error: {e:?}"))?;
        info!("Application run completed");
        Ok(())
    }
}
