use std::sync::Arc;

use anyhow::Result;
use error_stack::Report;
use tracing::info;

use crate::app::services::ApplicationServices;
use crate::app::Application;
use crate::config::AppConfig;
use crate::domain::MonitorDispatcher;
use crate::handlers::NodeDomainEventHandler;
use crate::handlers::PodDomainEventHandler;
use crate::infrastructure::repository::InMemoryBackend;
use crate::infrastructure::repository::KvBackend;
use crate::infrastructure::repository::KvRepository;
use crate::infrastructure::repository::RedisBackend;
use crate::infrastructure::repository::RepositoryError;
use crate::reconciler::NodeReconciler;
use crate::reconciler::PodReconciler;
use crate::session::InMemoryScalarCache;
use crate::session::SessionService;
use crate::session::StreamSessionService;

/// Application builder
pub struct ApplicationBuilder {
    config: AppConfig,
}

impl ApplicationBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    /// Build complete application. Fails when any key-value backend does not
    /// answer its startup ping.
    pub async fn build(self) -> Result<Application> {
        info!("Building application components...");

        let backends = self
            .create_backends()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create key-value backends: {e:?}"))?;
        let repository = KvRepository::connect(backends)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to connect key-value repository: {e:?}"))?;
        info!(backends = ?repository.backend_names(), "Key-value repository connected");

        let services = wire_services(&self.config, Arc::new(repository));
        Ok(Application::new(services, self.config))
    }

    async fn create_backends(&self) -> Result<Vec<Arc<dyn KvBackend>>, Report<RepositoryError>> {
        if self.config.redis.mock {
            info!("Using in-memory key-value backend");
            return Ok(vec![Arc::new(InMemoryBackend::new("mock"))]);
        }

        let options = self.config.redis.connect_options();
        let mut backends: Vec<Arc<dyn KvBackend>> = Vec::new();
        for backend in self.config.redis.enabled_backends() {
            let redis = RedisBackend::connect(&backend.name, &backend.address, options).await?;
            backends.push(Arc::new(redis));
        }
        Ok(backends)
    }
}

/// Creates the event pipeline over `repository`: dispatcher, session service,
/// subscribed domain handlers and both reconcilers.
pub fn wire_services(config: &AppConfig, repository: Arc<KvRepository>) -> ApplicationServices {
    let dispatcher = Arc::new(MonitorDispatcher::new());
    let session_service: Arc<dyn SessionService> = Arc::new(StreamSessionService::new(
        Arc::new(InMemoryScalarCache::new()),
        repository.clone(),
        config.session_streams(),
    ));

    NodeDomainEventHandler::subscribe(
        Arc::new(NodeDomainEventHandler::new(
            repository.clone(),
            session_service.clone(),
            config.labels_cache(),
        )),
        &dispatcher,
    );
    PodDomainEventHandler::subscribe(
        Arc::new(PodDomainEventHandler::new(
            repository.clone(),
            session_service.clone(),
        )),
        &dispatcher,
    );

    let node_reconciler = Arc::new(NodeReconciler::new(
        config.node_reconciler(),
        dispatcher.clone(),
    ));
    let pod_reconciler = Arc::new(PodReconciler::new(
        config.pod_reconciler(),
        dispatcher.clone(),
    ));

    ApplicationServices {
        dispatcher,
        repository,
        node_reconciler,
        pod_reconciler,
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;
    use test_log::test;

    use super::*;
    use crate::config::RedisConfig;

    #[test(tokio::test)]
    async fn mock_mode_builds_without_redis() {
        let config = AppConfig {
            redis: RedisConfig {
                mock: true,
                backends: Vec::new(),
                ..RedisConfig::default()
            },
            ..AppConfig::default()
        };

        let app = ApplicationBuilder::new(config).build().await.unwrap();

        assert_eq!(app.services().repository.backend_names(), vec!["mock"]);
        assert_eq!(app.services().dispatcher.subscriber_count(), 2);
    }

    #[test(tokio::test)]
    async fn unreachable_redis_is_fatal() {
        let config = AppConfig {
            redis: RedisConfig {
                mock: false,
                backends: vec![crate::config::RedisBackendConfig {
                    name: "down".to_string(),
                    address: "redis://127.0.0.1:1".to_string(),
                    enabled: true,
                }],
                connect_timeout_secs: 2,
                connect_retries: 1,
            },
            ..AppConfig::default()
        };

        let started = std::time::Instant::now();
        let result = tokio::time::timeout(
            std::time::Duration::from_secs(15),
            ApplicationBuilder::new(config).build(),
        )
        .await
        .expect("startup gives up within the connect timeout");

        assert!(result.is_err());
        assert!(started.elapsed() < std::time::Duration::from_secs(10));
    }
}
