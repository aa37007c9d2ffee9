use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Cluster every instance is announced in.
pub const DEFAULT_CLUSTER: &str = "DEFAULT";

/// One running, addressable copy of a service as known to the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub service_name: String,
    pub ip: String,
    pub port: u16,
    pub healthy: bool,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub cluster: String,
}

impl ServiceInstance {
    /// Creates a healthy instance in the default cluster.
    pub fn new(service_name: impl Into<String>, ip: impl Into<String>, port: u16) -> Self {
        Self {
            service_name: service_name.into(),
            ip: ip.into(),
            port,
            healthy: true,
            metadata: HashMap::new(),
            cluster: DEFAULT_CLUSTER.to_string(),
        }
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_health(mut self, healthy: bool) -> Self {
        self.healthy = healthy;
        self
    }

    /// Returns the `ip:port` pair.
    pub fn address(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }

    /// Returns the HTTP base URL of the instance.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.address())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_instance_is_healthy_in_default_cluster() {
        let instance = ServiceInstance::new("OrderService", "10.0.0.5", 8001);
        assert!(instance.healthy);
        assert_eq!(instance.cluster, DEFAULT_CLUSTER);
        assert!(instance.metadata.is_empty());
    }

    #[test]
    fn base_url_uses_ip_and_port() {
        let instance = ServiceInstance::new("OrderService", "10.0.0.5", 8001);
        assert_eq!(instance.address(), "10.0.0.5:8001");
        assert_eq!(instance.base_url(), "http://10.0.0.5:8001");
    }
}
