use std::sync::Arc;

use crate::domain::MonitorDispatcher;
use crate::infrastructure::repository::KvRepository;
use crate::reconciler::NodeReconciler;
use crate::reconciler::PodReconciler;

/// Application dependencies - simple struct with Arc-wrapped services
pub struct ApplicationServices {
    pub dispatcher: Arc<MonitorDispatcher>,
    pub repository: Arc<KvRepository>,
    pub node_reconciler: Arc<NodeReconciler>,
    pub pod_reconciler: Arc<PodReconciler>,
}
