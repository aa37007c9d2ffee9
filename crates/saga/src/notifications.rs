//! The notification service's inbox.
//!
//! Notifications are an informational sink: they are created by peers through
//! the internal create call and never feed back into the saga.

use chrono::Utc;
use common::UserId;
use domain::{Notification, NotificationDraft, NotificationType};
use serde::Deserialize;
use store::{Repository, RepositoryExt, Versioned};

use crate::error::{Result, SagaError};

/// Filters for a user's notification listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationQuery {
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub read: Option<bool>,
}

pub struct NotificationInbox<R> {
    notifications: R,
}

impl<R: Repository<Notification>> NotificationInbox<R> {
    pub fn new(notifications: R) -> Self {
        Self { notifications }
    }

    #[tracing::instrument(skip(self, draft), fields(user = %draft.user_uuid, kind = %draft.kind))]
    pub async fn create(&self, draft: NotificationDraft) -> Result<Notification> {
        let id = self.notifications.next_sequence().await?;
        let notification = Notification::new(id, draft, Utc::now())?;
        let stored = self.notifications.insert(notification).await?;
        tracing::info!(id, "notification created");
        Ok(stored.record)
    }

    /// Lists the caller's notifications, newest first.
    pub async fn list(&self, user: UserId, query: &NotificationQuery) -> Result<Vec<Notification>> {
        let kind: Option<NotificationType> = match query.kind.as_deref() {
            None | Some("") => None,
            Some(kind) => Some(kind.parse()?),
        };
        let read = query.read;

        let mut found: Vec<Notification> = self
            .notifications
            .find(&move |n: &Notification| {
                n.user_uuid == user
                    && kind.is_none_or(|k| n.kind == k)
                    && read.is_none_or(|r| n.read == r)
            })
            .await?
            .into_iter()
            .map(Versioned::into_inner)
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(found)
    }

    pub async fn mark_read(&self, user: UserId, id: u64) -> Result<Notification> {
        let Versioned {
            record: mut notification,
            version,
        } = self.load_owned(user, id).await?;
        if notification.mark_read(Utc::now()) {
            self.notifications
                .update(notification.clone(), version)
                .await?;
        }
        Ok(notification)
    }

    /// Marks every unread notification of the caller read. Returns how many
    /// changed.
    pub async fn mark_all_read(&self, user: UserId) -> Result<usize> {
        let unread = self
            .notifications
            .find(&move |n: &Notification| n.user_uuid == user && !n.read)
            .await?;

        let now = Utc::now();
        let mut updated = 0;
        for Versioned {
            record: mut notification,
            version,
        } in unread
        {
            if notification.mark_read(now) {
                self.notifications.update(notification, version).await?;
                updated += 1;
            }
        }
        Ok(updated)
    }

    pub async fn unread_count(&self, user: UserId) -> Result<usize> {
        Ok(self
            .notifications
            .find(&move |n: &Notification| n.user_uuid == user && !n.read)
            .await?
            .len())
    }

    pub async fn delete(&self, user: UserId, id: u64) -> Result<()> {
        self.load_owned(user, id).await?;
        self.notifications.delete(&id).await?;
        Ok(())
    }

    async fn load_owned(&self, user: UserId, id: u64) -> Result<Versioned<Notification>> {
        match self.notifications.get(&id).await? {
            Some(found) if found.record.user_uuid == user => Ok(found),
            _ => Err(SagaError::not_found("notification", id)),
        }
    }
}
