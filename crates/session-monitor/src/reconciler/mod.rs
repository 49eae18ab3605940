//! Translation of raw watch callbacks into domain events.
//!
//! Reconcilers are stateless: each callback parses the object it was given,
//! classifies it and publishes the resulting events. A callback that cannot
//! parse its object logs and returns; the next watch event for the same
//! object is the retry.

pub mod node;
pub mod pod;

use core::error::Error;

use error_stack::Report;
use kube::api::DynamicObject;
use kube::Resource;
use serde::de::DeserializeOwned;

pub use node::NodeReconciler;
pub use node::NodeReconcilerConfig;
pub use pod::PodReconciler;
pub use pod::PodReconcilerConfig;

#[derive(Debug, derive_more::Display)]
pub enum ReconcileError {
    #[display("Failed to parse {kind}: {message}")]
    Parse { kind: &'static str, message: String },
    #[display("Object has no {field}")]
    MissingField { field: &'static str },
    #[display("Driver version is missing")]
    DriverVersionMissing,
}

impl Error for ReconcileError {}

/// Converts an untyped watch object into `K`.
fn parse_object<K>(obj: &DynamicObject, kind: &'static str) -> Result<K, Report<ReconcileError>>
where
    K: Resource + DeserializeOwned,
{
    obj.clone().try_parse::<K>().map_err(|e| {
        Report::new(ReconcileError::Parse {
            kind,
            message: e.to_string(),
        })
    })
}
