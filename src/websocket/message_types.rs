use crate::models::{MessageCategory, MessageId, PresenceState, UserDisplayInfo, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Inbound chat frames from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientFrame {
    Message {
        recipient_id: UserId,
        #[serde(default)]
        body: Option<String>,
        #[serde(default)]
        attachment_ref: Option<String>,
        category: MessageCategory,
        /// Client-side correlation id echoed back in the ack.
        #[serde(default)]
        client_message_id: Option<String>,
        #[serde(default)]
        client_sent_at: Option<DateTime<Utc>>,
    },
    Typing {
        to_user_id: UserId,
        is_typing: bool,
    },
    /// Receipts are routed to the stored sender of each message.
    ReadReceipt {
        message_ids: Vec<MessageId>,
    },
    Ping,
}

/// Outbound chat frames from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerFrame {
    MessageSent {
        id: MessageId,
        #[serde(skip_serializing_if = "Option::is_none")]
        client_message_id: Option<String>,
        created_at: DateTime<Utc>,
    },
    MessageFailed {
        #[serde(skip_serializing_if = "Option::is_none")]
        client_message_id: Option<String>,
        reason: String,
        retryable: bool,
    },
    NewMessage {
        id: MessageId,
        sender_id: UserId,
        recipient_id: UserId,
        #[serde(skip_serializing_if = "Option::is_none")]
        body: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        attachment_ref: Option<String>,
        category: MessageCategory,
        created_at: DateTime<Utc>,
        #[serde(skip_serializing_if = "Option::is_none")]
        client_sent_at: Option<DateTime<Utc>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        sender: Option<UserDisplayInfo>,
    },
    Typing {
        from_user_id: UserId,
        is_typing: bool,
    },
    ReadReceipt {
        reader_id: UserId,
        message_ids: Vec<MessageId>,
        read_at: DateTime<Utc>,
    },
    ReadReceiptFailed {
        message_ids: Vec<MessageId>,
    },
    Presence {
        user_id: UserId,
        state: PresenceState,
        occurred_at: DateTime<Utc>,
    },
    OnlineUsers {
        user_ids: Vec<UserId>,
    },
    Notification {
        notification_type: String,
        title: String,
        body: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<serde_json::Value>,
        created_at: DateTime<Utc>,
    },
    Pong,
    Error {
        code: String,
        message: String,
    },
}

impl ServerFrame {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        ServerFrame::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }
}
