use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use error_stack::Report;
use futures::StreamExt;
use kube::api::ApiResource;
use kube::api::DynamicObject;
use kube::runtime::watcher;
use kube::runtime::WatchStreamExt;
use kube::Api;
use kube::Client;
use kube::ResourceExt;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::types::KubernetesError;

/// Callbacks driven by an [`Informer`].
///
/// Objects are delivered untyped; converting them is up to the handler.
#[async_trait]
pub trait ResourceEventHandler: Send + Sync {
    async fn on_add(&self, obj: &DynamicObject);

    async fn on_update(&self, old: &DynamicObject, new: &DynamicObject);

    async fn on_delete(&self, obj: &DynamicObject);

    /// Called for every watch failure. The watch keeps running afterwards.
    async fn on_watch_error(&self, error: &(dyn std::error::Error + Send + Sync));
}

/// A single callback an [`Informer`] has to make.
#[derive(Debug, Clone)]
pub enum Delivery {
    Add(DynamicObject),
    Update {
        old: DynamicObject,
        new: DynamicObject,
    },
    Delete(DynamicObject),
}

fn object_key(obj: &DynamicObject) -> String {
    format!("{}/{}", obj.namespace().unwrap_or_default(), obj.name_any())
}

/// Last-seen state per object, used to tell additions from updates.
#[derive(Default)]
pub struct ObjectStore {
    objects: HashMap<String, DynamicObject>,
}

impl ObjectStore {
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    fn applied(&mut self, obj: DynamicObject) -> Delivery {
        match self.objects.insert(object_key(&obj), obj.clone()) {
            Some(old) => Delivery::Update { old, new: obj },
            None => Delivery::Add(obj),
        }
    }

    /// Translates one watcher event into the callbacks it implies.
    ///
    /// A relist delivers every listed object as an add or update and every
    /// previously known object missing from the list as a delete.
    pub fn apply(&mut self, event: watcher::Event<DynamicObject>) -> Vec<Delivery> {
        match event {
            watcher::Event::Applied(obj) => vec![self.applied(obj)],
            watcher::Event::Deleted(obj) => {
                let known = self.objects.remove(&object_key(&obj));
                vec![Delivery::Delete(known.unwrap_or(obj))]
            }
            watcher::Event::Restarted(objs) => {
                let listed: HashSet<String> = objs.iter().map(object_key).collect();
                let vanished: Vec<String> = self
                    .objects
                    .keys()
                    .filter(|key| !listed.contains(*key))
                    .cloned()
                    .collect();

                let mut deliveries: Vec<Delivery> = vanished
                    .into_iter()
                    .filter_map(|key| self.objects.remove(&key))
                    .map(Delivery::Delete)
                    .collect();
                deliveries.extend(objs.into_iter().map(|obj| self.applied(obj)));
                deliveries
            }
        }
    }
}

/// Watches one resource kind and drives a [`ResourceEventHandler`].
///
/// Reconnection and backoff are left to the underlying watcher; errors are
/// only reported to the handler.
pub struct Informer {
    resource: ApiResource,
    namespace: Option<String>,
    handler: Arc<dyn ResourceEventHandler>,
}

impl Informer {
    pub fn new(
        resource: ApiResource,
        namespace: Option<String>,
        handler: Arc<dyn ResourceEventHandler>,
    ) -> Self {
        Self {
            resource,
            namespace,
            handler,
        }
    }

    /// Runs until `cancellation_token` is cancelled.
    ///
    /// # Errors
    ///
    /// - [`KubernetesError::WatchFailed`] if the watch stream terminates
    #[tracing::instrument(skip(self, client, cancellation_token), fields(resource = %self.resource.plural, namespace = ?self.namespace))]
    pub async fn run(
        &self,
        client: Client,
        cancellation_token: CancellationToken,
    ) -> Result<(), Report<KubernetesError>> {
        info!("Starting informer");
        let api: Api<DynamicObject> = match &self.namespace {
            Some(ns) => Api::namespaced_with(client, ns, &self.resource),
            None => Api::all_with(client, &self.resource),
        };
        let mut stream = watcher(api, watcher::Config::default())
            .default_backoff()
            .boxed();
        let mut store = ObjectStore::default();

        loop {
            select! {
                _ = cancellation_token.cancelled() => {
                    info!("Informer shutdown requested");
                    return Ok(());
                }
                next = stream.next() => match next {
                    Some(Ok(event)) => {
                        for delivery in store.apply(event) {
                            self.deliver(delivery).await;
                        }
                        debug!(known = store.len(), "Watch event processed");
                    }
                    Some(Err(e)) => {
                        warn!("Watch error: {e}");
                        self.handler.on_watch_error(&e).await;
                    }
                    None => {
                        return Err(Report::new(KubernetesError::WatchFailed {
                            resource: self.resource.plural.clone(),
                            message: "watch stream ended".to_string(),
                        }));
                    }
                }
            }
        }
    }

    async fn deliver(&self, delivery: Delivery) {
        match delivery {
            Delivery::Add(obj) => self.handler.on_add(&obj).await,
            Delivery::Update { old, new } => self.handler.on_update(&old, &new).await,
            Delivery::Delete(obj) => self.handler.on_delete(&obj).await,
        }
    }
}
