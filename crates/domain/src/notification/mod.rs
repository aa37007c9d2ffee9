//! User notifications.

use chrono::{DateTime, Utc};
use common::UserId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::DomainError;
use crate::wire::CodeOrName;

const MAX_TITLE_LEN: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "CodeOrName", into = "&'static str")]
pub enum NotificationType {
    Transaction,
    System,
    Promotion,
}

impl NotificationType {
    const ALL: [NotificationType; 3] = [
        NotificationType::Transaction,
        NotificationType::System,
        NotificationType::Promotion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Transaction => "transaction",
            NotificationType::System => "system",
            NotificationType::Promotion => "promotion",
        }
    }

    fn code(&self) -> i64 {
        match self {
            NotificationType::Transaction => 0,
            NotificationType::System => 1,
            NotificationType::Promotion => 2,
        }
    }
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for NotificationType {
    type Err = DomainError;

    /// Accepts the name in any case, or the numeric code as text.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        NotificationType::ALL
            .into_iter()
            .find(|t| t.as_str() == lowered || t.code().to_string() == lowered)
            .ok_or_else(|| DomainError::UnknownValue {
                kind: "notification type",
                value: s.to_string(),
            })
    }
}

impl TryFrom<CodeOrName> for NotificationType {
    type Error = DomainError;

    fn try_from(value: CodeOrName) -> Result<Self, Self::Error> {
        match value {
            CodeOrName::Name(name) => name.parse(),
            CodeOrName::Code(code) => NotificationType::ALL
                .into_iter()
                .find(|t| t.code() == code)
                .ok_or_else(|| DomainError::UnknownValue {
                    kind: "notification type",
                    value: code.to_string(),
                }),
        }
    }
}

impl From<NotificationType> for &'static str {
    fn from(kind: NotificationType) -> Self {
        kind.as_str()
    }
}

/// Payload of the internal create call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationDraft {
    pub user_uuid: UserId,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_data: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: u64,
    pub notification_uuid: Uuid,
    pub user_uuid: UserId,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub title: String,
    pub content: String,
    pub related_id: Option<String>,
    pub related_data: Option<Value>,
    pub read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(id: u64, draft: NotificationDraft, now: DateTime<Utc>) -> Result<Self, DomainError> {
        let title = draft.title.trim();
        if title.is_empty() || title.chars().count() > MAX_TITLE_LEN {
            return Err(DomainError::Validation(format!(
                "title must be 1 to {MAX_TITLE_LEN} characters"
            )));
        }
        if draft.content.trim().is_empty() {
            return Err(DomainError::Validation("content is required".to_string()));
        }

        Ok(Self {
            id,
            notification_uuid: Uuid::new_v4(),
            user_uuid: draft.user_uuid,
            kind: draft.kind,
            title: title.to_string(),
            content: draft.content,
            related_id: draft.related_id,
            related_data: draft.related_data,
            read: false,
            read_at: None,
            created_at: now,
        })
    }

    /// Marks the notification read. Returns false if it already was.
    pub fn mark_read(&mut self, now: DateTime<Utc>) -> bool {
        if self.read {
            return false;
        }
        self.read = true;
        self.read_at = Some(now);
        true
    }
}

impl store::Record for Notification {
    type Key = u64;

    fn record_type() -> &'static str {
        "notification"
    }

    fn key(&self) -> Self::Key {
        self.id
    }
}
