use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::Directory;
use crate::error::{RegistryError, Result};
use crate::instance::ServiceInstance;

/// How long an instance stays listed without a heartbeat.
pub const DEFAULT_INSTANCE_TTL: Duration = Duration::from_secs(15);

type InstanceKey = (String, String, u16);

#[derive(Debug)]
struct Entry {
    instance: ServiceInstance,
    last_seen: Instant,
}

#[derive(Debug, Default)]
struct DirectoryState {
    entries: HashMap<InstanceKey, Entry>,
    register_calls: HashMap<String, usize>,
}

/// In-process directory with server-side TTL expiry.
///
/// Used to wire services together in tests and single-host setups. Failure
/// switches let tests simulate an unreachable directory.
#[derive(Debug, Clone)]
pub struct InMemoryDirectory {
    state: Arc<RwLock<DirectoryState>>,
    ttl: Duration,
    unavailable: Arc<AtomicBool>,
    fail_remove: Arc<AtomicBool>,
}

impl Default for InMemoryDirectory {
    fn default() -> Self {
        Self::with_ttl(DEFAULT_INSTANCE_TTL)
    }
}

impl InMemoryDirectory {
    /// Creates an empty directory with the default TTL.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty directory expiring instances after `ttl`.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            state: Arc::new(RwLock::new(DirectoryState::default())),
            ttl,
            unavailable: Arc::new(AtomicBool::new(false)),
            fail_remove: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Makes every call fail as if the directory were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Makes only `remove` fail.
    pub fn set_fail_remove(&self, fail: bool) {
        self.fail_remove.store(fail, Ordering::SeqCst);
    }

    /// Returns how many register/heartbeat submissions arrived for a service.
    pub async fn register_calls(&self, service_name: &str) -> usize {
        self.state
            .read()
            .await
            .register_calls
            .get(service_name)
            .copied()
            .unwrap_or(0)
    }

    /// Returns the number of unexpired instances of a service.
    pub async fn instance_count(&self, service_name: &str) -> usize {
        let state = self.state.read().await;
        state
            .entries
            .values()
            .filter(|e| e.instance.service_name == service_name && self.is_live(e))
            .count()
    }

    fn is_live(&self, entry: &Entry) -> bool {
        entry.last_seen.elapsed() <= self.ttl
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RegistryError::Unavailable(
                "in-memory directory switched off".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Directory for InMemoryDirectory {
    async fn register(&self, instance: &ServiceInstance) -> Result<()> {
        self.check_available()?;

        let key = (
            instance.service_name.clone(),
            instance.ip.clone(),
            instance.port,
        );
        let mut state = self.state.write().await;
        *state
            .register_calls
            .entry(instance.service_name.clone())
            .or_default() += 1;
        state.entries.insert(
            key,
            Entry {
                instance: instance.clone(),
                last_seen: Instant::now(),
            },
        );
        Ok(())
    }

    async fn list(&self, service_name: &str) -> Result<Vec<ServiceInstance>> {
        self.check_available()?;

        let mut state = self.state.write().await;
        let ttl = self.ttl;
        state
            .entries
            .retain(|_, entry| entry.last_seen.elapsed() <= ttl);

        let mut instances: Vec<ServiceInstance> = state
            .entries
            .values()
            .filter(|e| e.instance.service_name == service_name)
            .map(|e| e.instance.clone())
            .collect();
        instances.sort_by(|a, b| a.ip.cmp(&b.ip).then(a.port.cmp(&b.port)));
        Ok(instances)
    }

    async fn remove(&self, service_name: &str, ip: &str, port: u16) -> Result<()> {
        self.check_available()?;
        if self.fail_remove.load(Ordering::SeqCst) {
            return Err(RegistryError::Rejected {
                status: 500,
                body: "remove rejected".to_string(),
            });
        }

        let key = (service_name.to_string(), ip.to_string(), port);
        self.state.write().await.entries.remove(&key);
        Ok(())
    }
}
