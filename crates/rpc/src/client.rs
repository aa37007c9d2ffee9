use std::time::{Duration, Instant};

use registry::Discovery;
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;

use crate::error::{Result, RpcError};

/// Decoded JSON object returned by a peer.
pub type JsonMap = serde_json::Map<String, Value>;

/// Fixed per-call timeout.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for peer services, addressed by logical name.
#[derive(Clone)]
pub struct ServiceClient {
    discovery: Discovery,
    http: Client,
    timeout: Duration,
}

impl ServiceClient {
    pub fn new(discovery: Discovery) -> Self {
        Self {
            discovery,
            http: Client::new(),
            timeout: DEFAULT_RPC_TIMEOUT,
        }
    }

    /// Overrides the per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn discovery(&self) -> &Discovery {
        &self.discovery
    }

    /// Calls `path` on one instance of `service_name`.
    pub async fn call(
        &self,
        service_name: &str,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<JsonMap> {
        self.call_with_headers(service_name, method, path, body, &[])
            .await
    }

    /// Calls `path` on one instance of `service_name`, attaching extra
    /// request headers.
    ///
    /// Fails fast with [`RpcError::ServiceUnavailable`] when discovery finds
    /// nothing. A 204 or empty body decodes to an empty map.
    #[tracing::instrument(skip(self, body, headers))]
    pub async fn call_with_headers(
        &self,
        service_name: &str,
        method: Method,
        path: &str,
        body: Option<&Value>,
        headers: &[(&str, String)],
    ) -> Result<JsonMap> {
        let Some(instance) = self.discovery.select(service_name).await else {
            tracing::warn!("no healthy instance available");
            metrics::counter!("rpc_calls_total", "service" => service_name.to_string(), "outcome" => "unavailable")
                .increment(1);
            return Err(RpcError::ServiceUnavailable(service_name.to_string()));
        };

        let url = format!("{}/{}", instance.base_url(), path.trim_start_matches('/'));
        tracing::debug!(%url, "calling peer");

        let mut request = self
            .http
            .request(method, &url)
            .timeout(self.timeout)
            .header(reqwest::header::ACCEPT, "application/json");
        for (name, value) in headers {
            request = request.header(*name, value.as_str());
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let started = Instant::now();
        let result = self.send(service_name, request).await;
        metrics::histogram!("rpc_call_duration_seconds", "service" => service_name.to_string())
            .record(started.elapsed().as_secs_f64());

        let outcome = match &result {
            Ok(_) => "ok",
            Err(RpcError::DecodeFailure { .. }) => "decode_failure",
            Err(_) => "error",
        };
        metrics::counter!("rpc_calls_total", "service" => service_name.to_string(), "outcome" => outcome)
            .increment(1);
        if let Err(e) = &result {
            tracing::warn!(error = %e, "peer call failed");
        }
        result
    }

    async fn send(&self, service_name: &str, request: reqwest::RequestBuilder) -> Result<JsonMap> {
        let response = request.send().await.map_err(|e| {
            let message = if e.is_timeout() {
                format!("timed out after {:?}", self.timeout)
            } else {
                e.to_string()
            };
            RpcError::RemoteCall {
                service: service_name.to_string(),
                status: None,
                body: None,
                message,
            }
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| RpcError::RemoteCall {
            service: service_name.to_string(),
            status: Some(status.as_u16()),
            body: None,
            message: e.to_string(),
        })?;

        if !status.is_success() {
            return Err(RpcError::RemoteCall {
                service: service_name.to_string(),
                status: Some(status.as_u16()),
                message: format!("peer answered {status}"),
                body: Some(text),
            });
        }

        if status == StatusCode::NO_CONTENT || text.trim().is_empty() {
            return Ok(JsonMap::new());
        }

        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(RpcError::DecodeFailure {
                service: service_name.to_string(),
                message: format!("expected a JSON object, got {other}"),
            }),
            Err(e) => Err(RpcError::DecodeFailure {
                service: service_name.to_string(),
                message: e.to_string(),
            }),
        }
    }

    pub async fn get(&self, service_name: &str, path: &str) -> Result<JsonMap> {
        self.call(service_name, Method::GET, path, None).await
    }

    pub async fn post(&self, service_name: &str, path: &str, body: &Value) -> Result<JsonMap> {
        self.call(service_name, Method::POST, path, Some(body)).await
    }

    pub async fn put(&self, service_name: &str, path: &str, body: &Value) -> Result<JsonMap> {
        self.call(service_name, Method::PUT, path, Some(body)).await
    }

    pub async fn patch(&self, service_name: &str, path: &str, body: &Value) -> Result<JsonMap> {
        self.call(service_name, Method::PATCH, path, Some(body)).await
    }

    pub async fn delete(&self, service_name: &str, path: &str) -> Result<JsonMap> {
        self.call(service_name, Method::DELETE, path, None).await
    }
}
