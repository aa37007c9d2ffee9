//! Resolving logical service names to live instances.

use std::sync::Arc;

use crate::directory::Directory;
use crate::instance::ServiceInstance;

/// Picks one instance out of a resolved, healthy list.
pub trait Selector: Send + Sync {
    fn select(&self, instances: &[ServiceInstance]) -> Option<ServiceInstance>;
}

/// Always picks the first instance. Deterministic, no load spreading.
#[derive(Debug, Default, Clone, Copy)]
pub struct FirstOfList;

impl Selector for FirstOfList {
    fn select(&self, instances: &[ServiceInstance]) -> Option<ServiceInstance> {
        instances.first().cloned()
    }
}

/// Discovery client over a [`Directory`].
#[derive(Clone)]
pub struct Discovery {
    directory: Arc<dyn Directory>,
    selector: Arc<dyn Selector>,
}

impl Discovery {
    pub fn new(directory: Arc<dyn Directory>) -> Self {
        Self {
            directory,
            selector: Arc::new(FirstOfList),
        }
    }

    /// Replaces the selection policy.
    pub fn with_selector(mut self, selector: impl Selector + 'static) -> Self {
        self.selector = Arc::new(selector);
        self
    }

    /// Returns the healthy instances of a service.
    ///
    /// A directory failure is logged and reported as "no instances".
    #[tracing::instrument(skip(self))]
    pub async fn resolve(&self, service_name: &str) -> Vec<ServiceInstance> {
        match self.directory.list(service_name).await {
            Ok(instances) => instances.into_iter().filter(|i| i.healthy).collect(),
            Err(e) => {
                tracing::error!(error = %e, "service discovery failed");
                Vec::new()
            }
        }
    }

    /// Resolves a service and picks one instance with the selection policy.
    pub async fn select(&self, service_name: &str) -> Option<ServiceInstance> {
        let instances = self.resolve(service_name).await;
        self.selector.select(&instances)
    }
}
