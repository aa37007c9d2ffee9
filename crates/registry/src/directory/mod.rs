//! The registry protocol and its implementations.

mod memory;
mod nacos;

use async_trait::async_trait;

pub use memory::{DEFAULT_INSTANCE_TTL, InMemoryDirectory};
pub use nacos::{NacosConfig, NacosDirectory};

use crate::error::Result;
use crate::instance::ServiceInstance;

/// Central directory of service instances.
///
/// The directory owns liveness: it expires instances whose heartbeats stop
/// arriving. Clients only ever write their own entries.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Submits (or re-submits, as a heartbeat) an instance record.
    async fn register(&self, instance: &ServiceInstance) -> Result<()>;

    /// Lists every known instance of a service, healthy or not.
    async fn list(&self, service_name: &str) -> Result<Vec<ServiceInstance>>;

    /// Removes an instance record.
    async fn remove(&self, service_name: &str, ip: &str, port: u16) -> Result<()>;
}
