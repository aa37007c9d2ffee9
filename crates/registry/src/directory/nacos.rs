use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use tokio::sync::Mutex;

use super::Directory;
use crate::error::{RegistryError, Result};
use crate::instance::{DEFAULT_CLUSTER, ServiceInstance};

const INSTANCE_PATH: &str = "/nacos/v1/ns/instance";
const LIST_PATH: &str = "/nacos/v1/ns/instance/list";
const LOGIN_PATH: &str = "/nacos/v1/auth/login";

/// Connection settings for a Nacos naming server.
#[derive(Debug, Clone)]
pub struct NacosConfig {
    /// `host:port` of the server, optionally prefixed with a scheme.
    pub server_addr: String,
    pub namespace: String,
    pub group: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub request_timeout: Duration,
}

impl Default for NacosConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:8848".to_string(),
            namespace: "public".to_string(),
            group: "DEFAULT_GROUP".to_string(),
            username: None,
            password: None,
            request_timeout: Duration::from_secs(5),
        }
    }
}

impl NacosConfig {
    fn base_url(&self) -> String {
        let addr = self.server_addr.trim_end_matches('/');
        if addr.starts_with("http://") || addr.starts_with("https://") {
            addr.to_string()
        } else {
            format!("http://{addr}")
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct InstanceList {
    #[serde(default)]
    hosts: Vec<NacosHost>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NacosHost {
    ip: String,
    port: u16,
    #[serde(default)]
    healthy: bool,
    #[serde(default = "enabled_by_default")]
    enabled: bool,
    #[serde(default)]
    metadata: HashMap<String, String>,
    #[serde(default)]
    cluster_name: Option<String>,
}

fn enabled_by_default() -> bool {
    true
}

/// Directory backed by a Nacos naming server over its v1 open API.
///
/// Instances are registered as ephemeral, so the server expires them once
/// heartbeats stop arriving.
pub struct NacosDirectory {
    http: Client,
    base_url: String,
    config: NacosConfig,
    token: Mutex<Option<String>>,
}

impl NacosDirectory {
    pub fn new(config: NacosConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url(),
            config,
            token: Mutex::new(None),
        })
    }

    /// Returns a cached access token, logging in first if credentials are set.
    async fn access_token(&self) -> Result<Option<String>> {
        let (Some(username), Some(password)) = (&self.config.username, &self.config.password)
        else {
            return Ok(None);
        };

        let mut token = self.token.lock().await;
        if let Some(existing) = token.as_ref() {
            return Ok(Some(existing.clone()));
        }

        let response = self
            .http
            .post(format!("{}{LOGIN_PATH}", self.base_url))
            .form(&[("username", username.as_str()), ("password", password.as_str())])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RegistryError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let login: LoginResponse = response.json().await?;
        tracing::debug!("obtained nacos access token");
        *token = Some(login.access_token.clone());
        Ok(Some(login.access_token))
    }

    async fn send(&self, method: Method, path: &str, params: Vec<(&str, String)>) -> Result<String> {
        let mut params = params;
        params.push(("namespaceId", self.config.namespace.clone()));
        params.push(("groupName", self.config.group.clone()));
        if let Some(token) = self.access_token().await? {
            params.push(("accessToken", token));
        }

        let response = self
            .http
            .request(method, format!("{}{path}", self.base_url))
            .query(&params)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            // Token may have expired; force a fresh login on the next call.
            self.token.lock().await.take();
        }
        if !status.is_success() {
            return Err(RegistryError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl Directory for NacosDirectory {
    async fn register(&self, instance: &ServiceInstance) -> Result<()> {
        let metadata = serde_json::to_string(&instance.metadata)
            .map_err(|e| RegistryError::Decode(e.to_string()))?;
        let body = self
            .send(
                Method::POST,
                INSTANCE_PATH,
                vec![
                    ("serviceName", instance.service_name.clone()),
                    ("ip", instance.ip.clone()),
                    ("port", instance.port.to_string()),
                    ("clusterName", instance.cluster.clone()),
                    ("healthy", instance.healthy.to_string()),
                    ("enabled", "true".to_string()),
                    ("ephemeral", "true".to_string()),
                    ("weight", "1.0".to_string()),
                    ("metadata", metadata),
                ],
            )
            .await?;

        if body.trim() != "ok" {
            return Err(RegistryError::Rejected { status: 200, body });
        }
        Ok(())
    }

    async fn list(&self, service_name: &str) -> Result<Vec<ServiceInstance>> {
        let body = self
            .send(
                Method::GET,
                LIST_PATH,
                vec![
                    ("serviceName", service_name.to_string()),
                    ("healthyOnly", "false".to_string()),
                ],
            )
            .await?;

        let list: InstanceList =
            serde_json::from_str(&body).map_err(|e| RegistryError::Decode(e.to_string()))?;
        Ok(list
            .hosts
            .into_iter()
            .map(|host| ServiceInstance {
                service_name: service_name.to_string(),
                ip: host.ip,
                port: host.port,
                healthy: host.healthy && host.enabled,
                metadata: host.metadata,
                cluster: host
                    .cluster_name
                    .unwrap_or_else(|| DEFAULT_CLUSTER.to_string()),
            })
            .collect())
    }

    async fn remove(&self, service_name: &str, ip: &str, port: u16) -> Result<()> {
        self.send(
            Method::DELETE,
            INSTANCE_PATH,
            vec![
                ("serviceName", service_name.to_string()),
                ("ip", ip.to_string()),
                ("port", port.to_string()),
                ("clusterName", DEFAULT_CLUSTER.to_string()),
                ("ephemeral", "true".to_string()),
            ],
        )
        .await?;
        Ok(())
    }
}
