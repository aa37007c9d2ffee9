//! Notification service gateway.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::services::NOTIFICATION_SERVICE;
use domain::NotificationDraft;
use rpc::{RpcError, ServiceClient};

use super::unreachable_peer;

/// Sink for user notifications. Callers treat every failure as best-effort.
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    async fn send(&self, draft: &NotificationDraft) -> Result<(), RpcError>;
}

/// Notification gateway over HTTP.
#[derive(Clone)]
pub struct HttpNotificationGateway {
    client: ServiceClient,
}

impl HttpNotificationGateway {
    pub fn new(client: ServiceClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NotificationGateway for HttpNotificationGateway {
    async fn send(&self, draft: &NotificationDraft) -> Result<(), RpcError> {
        let body = serde_json::to_value(draft).map_err(|e| RpcError::DecodeFailure {
            service: NOTIFICATION_SERVICE.to_string(),
            message: e.to_string(),
        })?;
        let response = self
            .client
            .post(NOTIFICATION_SERVICE, "/notifications/internal/create", &body)
            .await?;
        rpc::unwrap_data(NOTIFICATION_SERVICE, response)?;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct InMemoryNotificationState {
    sent: Vec<NotificationDraft>,
    unreachable: bool,
}

/// In-memory notification service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotificationGateway {
    state: Arc<RwLock<InMemoryNotificationState>>,
}

impl InMemoryNotificationGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.write().unwrap().unreachable = unreachable;
    }

    pub fn sent(&self) -> Vec<NotificationDraft> {
        self.state.read().unwrap().sent.clone()
    }

    pub fn sent_count(&self) -> usize {
        self.state.read().unwrap().sent.len()
    }
}

#[async_trait]
impl NotificationGateway for InMemoryNotificationGateway {
    async fn send(&self, draft: &NotificationDraft) -> Result<(), RpcError> {
        let mut state = self.state.write().unwrap();
        if state.unreachable {
            return Err(unreachable_peer(NOTIFICATION_SERVICE));
        }
        state.sent.push(draft.clone());
        Ok(())
    }
}
