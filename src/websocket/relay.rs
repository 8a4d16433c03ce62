//! Chat message relay
//!
//! Turns a submitted message into a durable record, acknowledges the sender
//! on the originating handle, then pushes the record to every live handle of
//! the recipient. An offline recipient is the normal path, not an error: the
//! message stays durable and shows up on their next fetch.

use super::fanout::{self, push_to_handles, FanoutReport};
use super::message_types::ServerFrame;
use super::{ConnectionHandle, ConnectionRegistry};
use crate::error::{RelayError, ValidationError};
use crate::metrics;
use crate::models::{ChatMessage, StoredMessage};
use crate::services::{ChatStore, UserDirectory};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayOutcome {
    pub stored: StoredMessage,
    pub acked: bool,
    pub fanout: FanoutReport,
}

#[derive(Clone)]
pub struct MessageRelay {
    registry: ConnectionRegistry,
    store: Arc<dyn ChatStore>,
    directory: Arc<dyn UserDirectory>,
    send_timeout: Duration,
    max_body_bytes: usize,
}

impl MessageRelay {
    pub fn new(
        registry: ConnectionRegistry,
        store: Arc<dyn ChatStore>,
        directory: Arc<dyn UserDirectory>,
        send_timeout: Duration,
        max_body_bytes: usize,
    ) -> Self {
        Self {
            registry,
            store,
            directory,
            send_timeout,
            max_body_bytes,
        }
    }

    /// Relay one message submitted through `origin`.
    ///
    /// On success the sender got exactly one `message-sent` on `origin`.
    /// On error nothing was persisted or pushed; the caller reports the
    /// failure to the sender.
    pub async fn relay(
        &self,
        origin: &ConnectionHandle,
        message: ChatMessage,
        client_message_id: Option<String>,
    ) -> Result<RelayOutcome, RelayError> {
        let result = self.persist_and_deliver(origin, message, client_message_id).await;
        let outcome = match &result {
            Ok(_) => "delivered",
            Err(RelayError::Validation(_)) => "invalid",
            Err(RelayError::Persistence(_)) => "persistence_failed",
        };
        metrics::MESSAGES_RELAYED_TOTAL
            .with_label_values(&[outcome])
            .inc();
        result
    }

    async fn persist_and_deliver(
        &self,
        origin: &ConnectionHandle,
        message: ChatMessage,
        client_message_id: Option<String>,
    ) -> Result<RelayOutcome, RelayError> {
        self.validate(&message).await?;

        let stored = self.store.insert_message(&message).await.map_err(|e| {
            tracing::error!(
                sender_id = message.sender_id,
                recipient_id = message.recipient_id,
                error = %e,
                "failed to persist chat message"
            );
            RelayError::from(e)
        })?;

        let ack = ServerFrame::MessageSent {
            id: stored.id,
            client_message_id,
            created_at: stored.created_at,
        };
        let acked = match origin.send_frame(&ack, self.send_timeout).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    message_id = stored.id,
                    connection_id = %origin.id(),
                    error = %e,
                    "failed to ack sender"
                );
                fanout::record_failure(&e);
                false
            }
        };

        let recipients = self.registry.live_handles_for(message.recipient_id);
        let fanout = if recipients.is_empty() {
            tracing::debug!(
                message_id = stored.id,
                recipient_id = message.recipient_id,
                "recipient offline, message kept for next fetch"
            );
            FanoutReport::default()
        } else {
            let sender = match self.directory.get_user_display_info(message.sender_id).await {
                Ok(info) => info,
                Err(e) => {
                    tracing::warn!(sender_id = message.sender_id, error = %e, "sender display lookup failed");
                    None
                }
            };
            let push = ServerFrame::NewMessage {
                id: stored.id,
                sender_id: message.sender_id,
                recipient_id: message.recipient_id,
                body: message.body,
                attachment_ref: message.attachment_ref,
                category: message.category,
                created_at: stored.created_at,
                client_sent_at: message.client_sent_at,
                sender,
            };
            push_to_handles(&recipients, &push, self.send_timeout).await
        };

        tracing::info!(
            message_id = stored.id,
            sender_id = message.sender_id,
            recipient_id = message.recipient_id,
            delivered = fanout.delivered,
            "message relayed"
        );

        Ok(RelayOutcome {
            stored,
            acked,
            fanout,
        })
    }

    async fn validate(&self, message: &ChatMessage) -> Result<(), RelayError> {
        if message.trimmed_body().is_none() && !message.has_attachment() {
            return Err(ValidationError::EmptyMessage.into());
        }
        // The stored and pushed body is the raw one, padding included.
        if message.body.as_deref().map(str::len).unwrap_or(0) > self.max_body_bytes {
            return Err(ValidationError::BodyTooLong {
                max: self.max_body_bytes,
            }
            .into());
        }

        if !self.store.user_exists(message.recipient_id).await? {
            return Err(ValidationError::UnknownRecipient(message.recipient_id).into());
        }
        Ok(())
    }
}
