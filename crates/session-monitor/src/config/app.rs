use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use error_stack::Report;
use error_stack::ResultExt;
use serde::Deserialize;

use super::cli::RunArgs;
use super::ConfigError;
use crate::handlers::LabelsCacheConfig;
use crate::infrastructure::repository::ConnectOptions;
use crate::reconciler::NodeReconcilerConfig;
use crate::reconciler::PodReconcilerConfig;
use crate::session::SessionStreams;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RedisBackendConfig {
    pub name: String,
    /// `redis://host:port/db` style URL.
    pub address: String,
    pub enabled: bool,
}

impl Default for RedisBackendConfig {
    fn default() -> Self {
        Self {
            name: "primary".to_string(),
            address: "redis://127.0.0.1:6379".to_string(),
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Keep every key in process instead of talking to redis.
    pub mock: bool,
    pub backends: Vec<RedisBackendConfig>,
    /// Startup gives up on a backend after this long, retries included.
    pub connect_timeout_secs: u64,
    pub connect_retries: usize,
}

impl Default for RedisConfig {
    fn default() -> Self {
        let options = ConnectOptions::default();
        Self {
            mock: false,
            backends: Vec::new(),
            connect_timeout_secs: options.timeout.as_secs(),
            connect_retries: options.retries,
        }
    }
}

impl RedisConfig {
    pub fn enabled_backends(&self) -> impl Iterator<Item = &RedisBackendConfig> {
        self.backends.iter().filter(|backend| backend.enabled)
    }

    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            timeout: Duration::from_secs(self.connect_timeout_secs),
            retries: self.connect_retries,
        }
    }
}

/// Resolved service configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub port: u16,
    pub kubeconfig: Option<PathBuf>,
    /// `None` watches pods in every namespace.
    pub pod_namespace: Option<String>,
    pub gpu_observee_labels: BTreeMap<String, String>,
    pub gpu_agent_pool_set_key: String,
    pub agent_pool_label: String,
    pub agent_pool_labels_ttl_secs: u64,
    pub enqueue_session_stream_key: String,
    pub delete_session_stream_key: String,
    pub session_id_label: String,
    pub managed_label: String,
    pub filter_unmanaged_pods_on_add: bool,
    pub redis: RedisConfig,
    pub shutdown_grace_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            kubeconfig: None,
            pod_namespace: None,
            gpu_observee_labels: BTreeMap::new(),
            gpu_agent_pool_set_key: "gpu-agent-pools".to_string(),
            agent_pool_label: "agentpool".to_string(),
            agent_pool_labels_ttl_secs: 0,
            enqueue_session_stream_key: "enqueue-session".to_string(),
            delete_session_stream_key: "delete-session".to_string(),
            session_id_label: "sessionId".to_string(),
            managed_label: "managed".to_string(),
            filter_unmanaged_pods_on_add: false,
            redis: RedisConfig::default(),
            shutdown_grace_secs: 60,
        }
    }
}

impl AppConfig {
    /// Reads a YAML document.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::Read`] if the file cannot be read
    /// - [`ConfigError::Parse`] if the document is not a valid configuration
    pub fn from_file(path: &Path) -> Result<Self, Report<ConfigError>> {
        let content = std::fs::read_to_string(path).change_context_lazy(|| ConfigError::Read {
            path: path.display().to_string(),
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, Report<ConfigError>> {
        serde_yaml::from_str(content).change_context(ConfigError::Parse)
    }

    /// Loads the file named by `args` (or the defaults) and applies the
    /// command line overrides.
    pub fn load(args: &RunArgs) -> Result<Self, Report<ConfigError>> {
        let mut config = match &args.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(args);
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides(&mut self, args: &RunArgs) {
        if let Some(port) = args.port {
            self.port = port;
        }
        if let Some(kubeconfig) = &args.kubeconfig {
            self.kubeconfig = Some(kubeconfig.clone());
        }
        if let Some(namespace) = &args.pod_namespace {
            self.pod_namespace = (!namespace.is_empty()).then(|| namespace.clone());
        }
        if let Some(mock) = args.redis_mock {
            self.redis.mock = mock;
        }
    }

    /// # Errors
    ///
    /// - [`ConfigError::Invalid`] if a key is empty or no backend is enabled
    pub fn validate(&self) -> Result<(), Report<ConfigError>> {
        let required = [
            ("gpu_agent_pool_set_key", &self.gpu_agent_pool_set_key),
            ("enqueue_session_stream_key", &self.enqueue_session_stream_key),
            ("delete_session_stream_key", &self.delete_session_stream_key),
            ("session_id_label", &self.session_id_label),
            ("agent_pool_label", &self.agent_pool_label),
        ];
        if let Some((field, _)) = required.iter().find(|(_, value)| value.is_empty()) {
            return Err(Report::new(ConfigError::Invalid {
                message: format!("{field} must not be empty"),
            }));
        }
        if !self.redis.mock && self.redis.enabled_backends().next().is_none() {
            return Err(Report::new(ConfigError::Invalid {
                message: "no redis backend is enabled and mock mode is off".to_string(),
            }));
        }
        if !self.redis.mock && self.redis.connect_timeout_secs == 0 {
            return Err(Report::new(ConfigError::Invalid {
                message: "redis.connect_timeout_secs must be positive".to_string(),
            }));
        }
        Ok(())
    }

    pub fn node_reconciler(&self) -> NodeReconcilerConfig {
        NodeReconcilerConfig {
            observee_labels: self.gpu_observee_labels.clone(),
        }
    }

    pub fn pod_reconciler(&self) -> PodReconcilerConfig {
        PodReconcilerConfig {
            session_id_label: self.session_id_label.clone(),
            managed_label: self.managed_label.clone(),
            filter_unmanaged_pods_on_add: self.filter_unmanaged_pods_on_add,
        }
    }

    pub fn session_streams(&self) -> SessionStreams {
        SessionStreams {
            enqueue_session_stream_key: self.enqueue_session_stream_key.clone(),
            delete_session_stream_key: self.delete_session_stream_key.clone(),
        }
    }

    pub fn labels_cache(&self) -> LabelsCacheConfig {
        LabelsCacheConfig {
            set_key: self.gpu_agent_pool_set_key.clone(),
            agent_pool_label: self.agent_pool_label.clone(),
            ttl: Duration::from_secs(self.agent_pool_labels_ttl_secs),
        }
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}
