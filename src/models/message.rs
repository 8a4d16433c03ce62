use super::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type MessageId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageCategory {
    Marketplace,
    Community,
    Dating,
}

impl MessageCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageCategory::Marketplace => "marketplace",
            MessageCategory::Community => "community",
            MessageCategory::Dating => "dating",
        }
    }
}

impl fmt::Display for MessageCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "marketplace" => Ok(MessageCategory::Marketplace),
            "community" => Ok(MessageCategory::Community),
            "dating" => Ok(MessageCategory::Dating),
            other => Err(format!("unknown message category: {other}")),
        }
    }
}

/// Relay view of a chat message, built per relay call and never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub sender_id: UserId,
    pub recipient_id: UserId,
    pub body: Option<String>,
    pub attachment_ref: Option<String>,
    pub category: MessageCategory,
    pub client_sent_at: Option<DateTime<Utc>>,
}

impl ChatMessage {
    /// Body with surrounding whitespace removed, `None` when nothing remains.
    pub fn trimmed_body(&self) -> Option<&str> {
        self.body
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
    }

    pub fn has_attachment(&self) -> bool {
        self.attachment_ref
            .as_deref()
            .map(|a| !a.trim().is_empty())
            .unwrap_or(false)
    }
}

/// Durable identity assigned by the persistence collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredMessage {
    pub id: MessageId,
    pub created_at: DateTime<Utc>,
}

/// A message flipped to read, with the sender its receipt belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadMark {
    pub message_id: MessageId,
    pub sender_id: UserId,
}
