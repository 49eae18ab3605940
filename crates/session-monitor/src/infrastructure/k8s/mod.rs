pub mod informer;
pub mod types;

pub use informer::Informer;
pub use informer::ResourceEventHandler;
pub use types::KubernetesError;
