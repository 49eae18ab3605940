//! Kubernetes session monitor.
//!
//! Pod and node watch callbacks are classified into domain events, handled
//! by subscribers that correlate node provisioning with pod scheduling, and
//! turned into session tasks appended to redis streams.

pub mod api;
pub mod app;
pub mod config;
pub mod domain;
pub mod handlers;
pub mod infrastructure;
pub mod logging;
pub mod reconciler;
pub mod session;
pub mod worker;

pub use infrastructure::k8s;
pub use infrastructure::kube_client;
pub use infrastructure::repository;
