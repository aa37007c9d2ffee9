//! Self-registration and heartbeats.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::directory::Directory;
use crate::instance::{DEFAULT_CLUSTER, ServiceInstance};

/// Interval between heartbeat re-submissions.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct InstanceKey {
    service_name: String,
    port: u16,
}

impl InstanceKey {
    fn new(service_name: &str, port: u16) -> Self {
        Self {
            service_name: service_name.to_string(),
            port,
        }
    }
}

struct Heartbeat {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Maintains this process's presence in the directory.
///
/// Owned by the process startup routine and shared by reference; dropping it
/// stops every heartbeat loop it started.
pub struct Registry {
    directory: Arc<dyn Directory>,
    local_ip: String,
    heartbeat_interval: Duration,
    heartbeats: Mutex<HashMap<InstanceKey, Heartbeat>>,
}

impl Registry {
    /// Creates a registry announcing instances at `local_ip`.
    pub fn new(directory: Arc<dyn Directory>, local_ip: impl Into<String>) -> Self {
        Self {
            directory,
            local_ip: local_ip.into(),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            heartbeats: Mutex::new(HashMap::new()),
        }
    }

    /// Overrides the heartbeat interval.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Returns the address instances are announced at.
    pub fn local_ip(&self) -> &str {
        &self.local_ip
    }

    /// Registers an instance and starts its heartbeat loop.
    ///
    /// Returns false if the directory could not be reached; the caller keeps
    /// running, just undiscoverable. Registering an already registered
    /// `(service_name, port)` pair is a no-op.
    #[tracing::instrument(skip(self, metadata), fields(ip = %self.local_ip))]
    pub async fn register(
        &self,
        service_name: &str,
        port: u16,
        metadata: HashMap<String, String>,
    ) -> bool {
        let key = InstanceKey::new(service_name, port);
        let mut heartbeats = self.heartbeats.lock().await;
        if heartbeats.contains_key(&key) {
            tracing::warn!("instance already registered, heartbeat already running");
            return true;
        }

        let instance = ServiceInstance {
            service_name: service_name.to_string(),
            ip: self.local_ip.clone(),
            port,
            healthy: true,
            metadata,
            cluster: DEFAULT_CLUSTER.to_string(),
        };

        match self.directory.register(&instance).await {
            Ok(()) => {
                tracing::info!("service registered");
                metrics::counter!("registry_registrations_total").increment(1);
                let heartbeat = spawn_heartbeat(
                    Arc::clone(&self.directory),
                    instance,
                    self.heartbeat_interval,
                );
                heartbeats.insert(key, heartbeat);
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "service registration failed");
                metrics::counter!("registry_registration_failures_total").increment(1);
                false
            }
        }
    }

    /// Stops the heartbeat loop, then removes the instance from the directory.
    ///
    /// The loop is stopped even when the removal fails; the stale entry then
    /// expires on the directory side.
    #[tracing::instrument(skip(self), fields(ip = %self.local_ip))]
    pub async fn deregister(&self, service_name: &str, port: u16) -> bool {
        let key = InstanceKey::new(service_name, port);
        let heartbeat = self.heartbeats.lock().await.remove(&key);

        match heartbeat {
            Some(heartbeat) => {
                let _ = heartbeat.stop.send(true);
                if let Err(e) = heartbeat.handle.await {
                    tracing::warn!(error = %e, "heartbeat task ended abnormally");
                }
            }
            None => tracing::warn!("no heartbeat running for instance"),
        }

        match self
            .directory
            .remove(service_name, &self.local_ip, port)
            .await
        {
            Ok(()) => {
                tracing::info!("service deregistered");
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "service deregistration failed");
                false
            }
        }
    }

    /// Deregisters every instance this registry announced.
    ///
    /// Returns true if all removals succeeded.
    pub async fn deregister_all(&self) -> bool {
        let keys: Vec<InstanceKey> = self.heartbeats.lock().await.keys().cloned().collect();
        let results = join_all(
            keys.iter()
                .map(|key| self.deregister(&key.service_name, key.port)),
        )
        .await;
        results.into_iter().all(|ok| ok)
    }

    /// Returns the number of heartbeat loops still running.
    pub async fn active_heartbeats(&self) -> usize {
        self.heartbeats
            .lock()
            .await
            .values()
            .filter(|hb| !hb.handle.is_finished())
            .count()
    }

    /// Returns true if `(service_name, port)` has a running heartbeat.
    pub async fn is_registered(&self, service_name: &str, port: u16) -> bool {
        self.heartbeats
            .lock()
            .await
            .contains_key(&InstanceKey::new(service_name, port))
    }
}

fn spawn_heartbeat(
    directory: Arc<dyn Directory>,
    instance: ServiceInstance,
    interval: Duration,
) -> Heartbeat {
    let (stop, mut stop_rx) = watch::channel(false);
    let span = tracing::info_span!(
        "heartbeat",
        service = %instance.service_name,
        port = instance.port
    );

    let handle = tokio::spawn(
        async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    // A stop request or a dropped registry both end the loop.
                    _ = stop_rx.changed() => break,
                }

                match directory.register(&instance).await {
                    Ok(()) => {
                        metrics::counter!("registry_heartbeats_total").increment(1);
                        tracing::debug!("heartbeat sent");
                    }
                    Err(e) => {
                        metrics::counter!("registry_heartbeat_failures_total").increment(1);
                        tracing::warn!(error = %e, "heartbeat failed, retrying next tick");
                    }
                }
            }
            tracing::info!("heartbeat stopped");
        }
        .instrument(span),
    );

    Heartbeat { stop, handle }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::InMemoryDirectory;

    fn registry(directory: &InMemoryDirectory) -> Registry {
        Registry::new(Arc::new(directory.clone()), "10.0.0.7")
    }

    #[tokio::test]
    async fn register_announces_healthy_instance() {
        let directory = InMemoryDirectory::new();
        let registry = registry(&directory);

        let metadata = HashMap::from([("framework".to_string(), "axum".to_string())]);
        assert!(registry.register("OrderService", 8001, metadata).await);

        let instances = directory.list("OrderService").await.unwrap();
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].ip, "10.0.0.7");
        assert!(instances[0].healthy);
        assert_eq!(instances[0].metadata["framework"], "axum");
        assert_eq!(registry.active_heartbeats().await, 1);
    }

    #[tokio::test]
    async fn registering_twice_starts_a_single_heartbeat() {
        let directory = InMemoryDirectory::new();
        let registry = registry(&directory);

        assert!(registry.register("OrderService", 8001, HashMap::new()).await);
        assert!(registry.register("OrderService", 8001, HashMap::new()).await);

        assert_eq!(registry.active_heartbeats().await, 1);
        assert_eq!(directory.register_calls("OrderService").await, 1);
    }

    #[tokio::test]
    async fn distinct_ports_get_their_own_heartbeats() {
        let directory = InMemoryDirectory::new();
        let registry = registry(&directory);

        registry.register("OrderService", 8001, HashMap::new()).await;
        registry.register("OrderService", 8011, HashMap::new()).await;

        assert_eq!(registry.active_heartbeats().await, 2);
        assert_eq!(directory.instance_count("OrderService").await, 2);
    }

    #[tokio::test]
    async fn unavailable_directory_fails_registration_without_heartbeat() {
        let directory = InMemoryDirectory::new();
        directory.set_unavailable(true);
        let registry = registry(&directory);

        assert!(!registry.register("OrderService", 8001, HashMap::new()).await);
        assert_eq!(registry.active_heartbeats().await, 0);
        assert!(!registry.is_registered("OrderService", 8001).await);
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_resubmits_every_interval() {
        let directory = InMemoryDirectory::new();
        let registry = registry(&directory).with_heartbeat_interval(Duration::from_secs(5));

        registry.register("OrderService", 8001, HashMap::new()).await;
        tokio::time::sleep(Duration::from_secs(16)).await;

        assert!(directory.register_calls("OrderService").await >= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_survives_directory_outage() {
        let directory = InMemoryDirectory::with_ttl(Duration::from_secs(15));
        let registry = registry(&directory).with_heartbeat_interval(Duration::from_secs(5));
        registry.register("OrderService", 8001, HashMap::new()).await;

        directory.set_unavailable(true);
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(registry.active_heartbeats().await, 1);

        directory.set_unavailable(false);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(directory.list("OrderService").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn deregister_stops_heartbeat_and_removes_instance() {
        let directory = InMemoryDirectory::new();
        let registry = registry(&directory);
        registry.register("OrderService", 8001, HashMap::new()).await;

        assert!(registry.deregister("OrderService", 8001).await);
        assert_eq!(registry.active_heartbeats().await, 0);
        assert!(directory.list("OrderService").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deregister_stops_heartbeat_even_if_remove_fails() {
        let directory = InMemoryDirectory::new();
        let registry = registry(&directory);
        registry.register("OrderService", 8001, HashMap::new()).await;
        directory.set_fail_remove(true);

        assert!(!registry.deregister("OrderService", 8001).await);
        assert_eq!(registry.active_heartbeats().await, 0);
        assert!(!registry.is_registered("OrderService", 8001).await);
    }

    #[tokio::test]
    async fn deregister_all_clears_every_instance() {
        let directory = InMemoryDirectory::new();
        let registry = registry(&directory);
        registry.register("OrderService", 8001, HashMap::new()).await;
        registry.register("PaymentService", 8002, HashMap::new()).await;

        assert!(registry.deregister_all().await);
        assert_eq!(registry.active_heartbeats().await, 0);
        assert!(directory.list("OrderService").await.unwrap().is_empty());
        assert!(directory.list("PaymentService").await.unwrap().is_empty());
    }
}
