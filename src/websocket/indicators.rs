//! Typing indicators and read receipts.
//!
//! Both are best-effort pushes between two users. Typing is never stored;
//! read receipts are stored first and only confirmed ids are forwarded.

use super::fanout::{push_to_handles, FanoutReport};
use super::message_types::ServerFrame;
use super::{ConnectionHandle, ConnectionRegistry};
use crate::models::{MessageId, UserId};
use crate::services::ChatStore;
use chrono::Utc;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadReceiptOutcome {
    pub confirmed: Vec<MessageId>,
    pub failed: Vec<MessageId>,
    pub fanout: FanoutReport,
}

#[derive(Clone)]
pub struct IndicatorRelay {
    registry: ConnectionRegistry,
    store: Arc<dyn ChatStore>,
    send_timeout: Duration,
}

impl IndicatorRelay {
    pub fn new(
        registry: ConnectionRegistry,
        store: Arc<dyn ChatStore>,
        send_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            store,
            send_timeout,
        }
    }

    /// Push a typing state to every handle of `to_user_id`; dropped if offline.
    pub async fn relay_typing(
        &self,
        from_user_id: UserId,
        to_user_id: UserId,
        is_typing: bool,
    ) -> FanoutReport {
        let handles = self.registry.live_handles_for(to_user_id);
        if handles.is_empty() {
            return FanoutReport::default();
        }
        let frame = ServerFrame::Typing {
            from_user_id,
            is_typing,
        };
        push_to_handles(&handles, &frame, self.send_timeout).await
    }

    /// Mark `message_ids` read by `reader` and tell each message's sender.
    ///
    /// Recipients of the receipt come from the stored rows, never from the
    /// client. Ids are persisted independently; one failing id does not hold
    /// back the others. Failed ids, including ids not addressed to the reader,
    /// go back to the reader on `origin` and never to a sender.
    pub async fn relay_read_receipt(
        &self,
        origin: &ConnectionHandle,
        reader_id: UserId,
        message_ids: Vec<MessageId>,
    ) -> ReadReceiptOutcome {
        let mut ids = message_ids;
        ids.sort_unstable();
        ids.dedup();
        if ids.is_empty() {
            return ReadReceiptOutcome::default();
        }

        let marks = ids.iter().map(|id| async move {
            let result = self.store.mark_messages_read(reader_id, &[*id]).await;
            (*id, result)
        });

        let mut outcome = ReadReceiptOutcome::default();
        let mut by_sender: BTreeMap<UserId, Vec<MessageId>> = BTreeMap::new();
        for (id, result) in join_all(marks).await {
            match result {
                Ok(marked) => match marked.iter().find(|mark| mark.message_id == id) {
                    Some(mark) => {
                        outcome.confirmed.push(id);
                        by_sender.entry(mark.sender_id).or_default().push(id);
                    }
                    None => {
                        tracing::debug!(reader_id, message_id = id, "message not addressed to reader");
                        outcome.failed.push(id);
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        reader_id,
                        message_id = id,
                        error = %e,
                        "failed to mark message read"
                    );
                    outcome.failed.push(id);
                }
            }
        }

        let read_at = Utc::now();
        for (sender_id, message_ids) in by_sender {
            let frame = ServerFrame::ReadReceipt {
                reader_id,
                message_ids,
                read_at,
            };
            let handles = self.registry.live_handles_for(sender_id);
            outcome
                .fanout
                .merge(push_to_handles(&handles, &frame, self.send_timeout).await);
        }

        if !outcome.failed.is_empty() {
            let frame = ServerFrame::ReadReceiptFailed {
                message_ids: outcome.failed.clone(),
            };
            if let Err(e) = origin.send_frame(&frame, self.send_timeout).await {
                tracing::debug!(connection_id = %origin.id(), error = %e, "could not report failed receipts");
            }
        }

        outcome
    }
}
