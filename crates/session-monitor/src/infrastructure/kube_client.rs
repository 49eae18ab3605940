use std::path::PathBuf;

use error_stack::Report;
use error_stack::ResultExt;
use kube::config::KubeConfigOptions;
use kube::config::Kubeconfig;
use kube::Client;
use kube::Config;
use tracing::info;

use crate::infrastructure::k8s::KubernetesError;

/// Builds a client from `kubeconfig`, or from the in-cluster / `~/.kube/config`
/// chain when no path is given.
pub async fn init_kube_client(
    kubeconfig: Option<PathBuf>,
) -> Result<Client, Report<KubernetesError>> {
    let Some(kubeconfig_path) = kubeconfig else {
        info!("Using default Kubernetes configuration");
        return Client::try_default()
            .await
            .change_context(KubernetesError::ConnectionFailed {
                message: "Failed to create Kubernetes client".to_string(),
            });
    };

    info!(path = %kubeconfig_path.display(), "Using kubeconfig file");
    let connection_failed = |message: &str| KubernetesError::ConnectionFailed {
        message: format!("{message}: {}", kubeconfig_path.display()),
    };

    let kubeconfig = Kubeconfig::read_from(&kubeconfig_path)
        .change_context_lazy(|| connection_failed("Failed to read kubeconfig file"))?;
    let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .change_context_lazy(|| connection_failed("Failed to create config from kubeconfig"))?;

    Client::try_from(config)
        .change_context_lazy(|| connection_failed("Failed to create Kubernetes client"))
}
