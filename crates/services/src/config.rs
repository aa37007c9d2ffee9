//! Service configuration loaded from environment variables.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use common::services::{NOTIFICATION_SERVICE, ORDER_SERVICE, PAYMENT_SERVICE};
use registry::NacosConfig;

/// Which of the three services this process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    Order,
    Payment,
    Notification,
}

impl ServiceKind {
    /// Name the service registers under.
    pub fn service_name(&self) -> &'static str {
        match self {
            ServiceKind::Order => ORDER_SERVICE,
            ServiceKind::Payment => PAYMENT_SERVICE,
            ServiceKind::Notification => NOTIFICATION_SERVICE,
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            ServiceKind::Order => 8001,
            ServiceKind::Payment => 8002,
            ServiceKind::Notification => 8003,
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.service_name())
    }
}

impl FromStr for ServiceKind {
    type Err = String;

    /// Accepts `order`, `payment`, `notification` or the registered names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "order" | "orders" | "orderservice" => Ok(ServiceKind::Order),
            "payment" | "payments" | "paymentservice" => Ok(ServiceKind::Payment),
            "notification" | "notifications" | "notificationservice" => {
                Ok(ServiceKind::Notification)
            }
            other => Err(format!("unknown service kind: {other}")),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Process configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `SERVICE_NAME`: registered name (default: per service kind)
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT` or `SERVICE_PORT`: listen port (default: 8001 / 8002 / 8003)
/// - `NODE_IP`: address announced to the registry (default: auto-detected)
/// - `ENVIRONMENT`: reported in instance metadata (default: `"development"`)
/// - `NACOS_SERVER`, `NACOS_NAMESPACE`, `NACOS_GROUP`, `NACOS_USERNAME`,
///   `NACOS_PASSWORD`: directory connection
/// - `REGISTER_DELAY_SECS` (3), `HEARTBEAT_INTERVAL_SECS` (5),
///   `RPC_TIMEOUT_SECS` (30)
/// - `RECONCILE_INTERVAL_SECS`: payment reconciliation sweep (default: off)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `json` for JSON lines, anything else for text
#[derive(Debug, Clone)]
pub struct Config {
    pub kind: ServiceKind,
    pub service_name: String,
    pub host: String,
    pub port: u16,
    pub node_ip: Option<String>,
    pub environment: String,
    pub nacos: NacosConfig,
    pub register_delay: Duration,
    pub heartbeat_interval: Duration,
    pub rpc_timeout: Duration,
    pub reconcile_interval: Option<Duration>,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env(kind: ServiceKind) -> Self {
        Self::from_lookup(kind, |key| std::env::var(key).ok())
    }

    /// Builds configuration from an arbitrary variable lookup.
    pub fn from_lookup(kind: ServiceKind, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::defaults(kind);
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let secs = |key: &str| non_empty(key).and_then(|v| v.trim().parse::<u64>().ok());

        let nacos = NacosConfig {
            server_addr: non_empty("NACOS_SERVER").unwrap_or(defaults.nacos.server_addr),
            namespace: non_empty("NACOS_NAMESPACE").unwrap_or(defaults.nacos.namespace),
            group: non_empty("NACOS_GROUP").unwrap_or(defaults.nacos.group),
            username: non_empty("NACOS_USERNAME"),
            password: non_empty("NACOS_PASSWORD"),
            ..defaults.nacos
        };

        Self {
            kind,
            service_name: non_empty("SERVICE_NAME").unwrap_or(defaults.service_name),
            host: non_empty("HOST").unwrap_or(defaults.host),
            port: non_empty("PORT")
                .or_else(|| non_empty("SERVICE_PORT"))
                .and_then(|p| p.trim().parse().ok())
                .unwrap_or(defaults.port),
            node_ip: non_empty("NODE_IP"),
            environment: non_empty("ENVIRONMENT").unwrap_or(defaults.environment),
            nacos,
            register_delay: secs("REGISTER_DELAY_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.register_delay),
            heartbeat_interval: secs("HEARTBEAT_INTERVAL_SECS")
                .filter(|s| *s > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.heartbeat_interval),
            rpc_timeout: secs("RPC_TIMEOUT_SECS")
                .filter(|s| *s > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.rpc_timeout),
            reconcile_interval: secs("RECONCILE_INTERVAL_SECS")
                .filter(|s| *s > 0)
                .map(Duration::from_secs),
            log_level: non_empty("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match non_empty("LOG_FORMAT") {
                Some(format) if format.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
        }
    }

    /// Default configuration for a service kind.
    pub fn defaults(kind: ServiceKind) -> Self {
        Self {
            kind,
            service_name: kind.service_name().to_string(),
            host: "0.0.0.0".to_string(),
            port: kind.default_port(),
            node_ip: None,
            environment: "development".to_string(),
            nacos: NacosConfig::default(),
            register_delay: Duration::from_secs(3),
            heartbeat_interval: registry::DEFAULT_HEARTBEAT_INTERVAL,
            rpc_timeout: rpc::DEFAULT_RPC_TIMEOUT,
            reconcile_interval: None,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Metadata attached to this process's registry entry.
    pub fn instance_metadata(&self) -> HashMap<String, String> {
        HashMap::from([
            ("framework".to_string(), "axum".to_string()),
            ("version".to_string(), env!("CARGO_PKG_VERSION").to_string()),
            ("environment".to_string(), self.environment.clone()),
        ])
    }
}
