//! Chat service wiring: connection lifecycle plus inbound frame dispatch.

use super::fanout::{push_to_handles, FanoutReport};
use super::heartbeat::HeartbeatMonitor;
use super::indicators::IndicatorRelay;
use super::message_types::{ClientFrame, ServerFrame};
use super::presence::PresenceBroadcaster;
use super::relay::MessageRelay;
use super::session::FrameHandler;
use super::{ConnectionHandle, ConnectionRegistry, PresenceTransition};
use crate::config::WsConfig;
use crate::error::ValidationError;
use crate::models::{ChatMessage, PresenceState, UserId};
use crate::services::{ChatStore, UserDirectory};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct ChatHub {
    registry: ConnectionRegistry,
    presence: PresenceBroadcaster,
    relay: MessageRelay,
    indicators: IndicatorRelay,
    heartbeat: HeartbeatMonitor,
    send_timeout: Duration,
}

impl ChatHub {
    pub fn new(
        registry: ConnectionRegistry,
        store: Arc<dyn ChatStore>,
        directory: Arc<dyn UserDirectory>,
        ws: &WsConfig,
    ) -> Self {
        Self {
            presence: PresenceBroadcaster::new(registry.clone(), ws.send_timeout),
            relay: MessageRelay::new(
                registry.clone(),
                store.clone(),
                directory,
                ws.send_timeout,
                ws.max_body_bytes,
            ),
            indicators: IndicatorRelay::new(registry.clone(), store, ws.send_timeout),
            heartbeat: HeartbeatMonitor::new(ws.heartbeat_interval),
            send_timeout: ws.send_timeout,
            registry,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Register an authenticated handle and start probing it.
    ///
    /// The first handle of a user announces them online; every new handle gets
    /// a snapshot of who else is online.
    pub async fn connect(&self, user_id: UserId, handle: &ConnectionHandle) -> PresenceTransition {
        let transition = self.registry.register(user_id, handle.clone());
        if handle.user_id() != Some(user_id) || !handle.is_alive() {
            return PresenceTransition::Unchanged;
        }

        if transition == PresenceTransition::BecameOnline {
            self.presence
                .broadcast_presence(user_id, PresenceState::Online)
                .await;
        }

        let online = ServerFrame::OnlineUsers {
            user_ids: self
                .registry
                .all_online_user_ids()
                .into_iter()
                .filter(|id| *id != user_id)
                .collect(),
        };
        if let Err(e) = handle.send_frame(&online, self.send_timeout).await {
            tracing::debug!(connection_id = %handle.id(), error = %e, "could not send online snapshot");
        }

        let hub = self.clone();
        self.heartbeat.watch(handle.clone(), move |dead| async move {
            hub.disconnect(user_id, &dead).await;
        });

        tracing::info!(
            user_id,
            connection_id = %handle.id(),
            connections = self.registry.connection_count(user_id),
            "chat connection opened"
        );
        transition
    }

    /// Close and deregister. Safe to call more than once for the same handle.
    pub async fn disconnect(&self, user_id: UserId, handle: &ConnectionHandle) -> PresenceTransition {
        handle.close();
        let transition = self.registry.deregister(user_id, handle);
        if transition == PresenceTransition::BecameOffline {
            self.presence
                .broadcast_presence(user_id, PresenceState::Offline)
                .await;
        }
        tracing::debug!(
            user_id,
            connection_id = %handle.id(),
            open_secs = (chrono::Utc::now() - handle.opened_at()).num_seconds(),
            remaining = self.registry.connection_count(user_id),
            "chat connection closed"
        );
        transition
    }

    /// Dispatch one raw client frame from `handle`, owned by `user_id`.
    pub async fn handle_frame(&self, user_id: UserId, handle: &ConnectionHandle, text: &str) {
        let frame = match serde_json::from_str::<ClientFrame>(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(user_id, error = %e, "malformed client frame");
                let err = ValidationError::MalformedFrame(e.to_string());
                self.reply(handle, &ServerFrame::error(err.code(), err.to_string()))
                    .await;
                return;
            }
        };

        match frame {
            ClientFrame::Message {
                recipient_id,
                body,
                attachment_ref,
                category,
                client_message_id,
                client_sent_at,
            } => {
                let message = ChatMessage {
                    sender_id: user_id,
                    recipient_id,
                    body,
                    attachment_ref,
                    category,
                    client_sent_at,
                };
                if let Err(e) = self
                    .relay
                    .relay(handle, message, client_message_id.clone())
                    .await
                {
                    let failed = ServerFrame::MessageFailed {
                        client_message_id,
                        reason: e.to_string(),
                        retryable: e.is_retryable(),
                    };
                    self.reply(handle, &failed).await;
                }
            }
            ClientFrame::Typing {
                to_user_id,
                is_typing,
            } => {
                self.indicators
                    .relay_typing(user_id, to_user_id, is_typing)
                    .await;
            }
            ClientFrame::ReadReceipt { message_ids } => {
                self.indicators
                    .relay_read_receipt(handle, user_id, message_ids)
                    .await;
            }
            ClientFrame::Ping => {
                handle.record_heartbeat();
                self.reply(handle, &ServerFrame::Pong).await;
            }
        }
    }

    /// Push a `notification` frame to every live handle of `user_id`.
    pub async fn notify(
        &self,
        user_id: UserId,
        notification_type: String,
        title: String,
        body: String,
        data: Option<serde_json::Value>,
    ) -> FanoutReport {
        let handles = self.registry.live_handles_for(user_id);
        let frame = ServerFrame::Notification {
            notification_type,
            title,
            body,
            data,
            created_at: chrono::Utc::now(),
        };
        push_to_handles(&handles, &frame, self.send_timeout).await
    }

    async fn reply(&self, handle: &ConnectionHandle, frame: &ServerFrame) {
        if let Err(e) = handle.send_frame(frame, self.send_timeout).await {
            tracing::debug!(connection_id = %handle.id(), error = %e, "reply dropped");
        }
    }
}

/// One authenticated chat connection.
pub struct ChatConnection {
    hub: ChatHub,
    user_id: UserId,
}

impl ChatConnection {
    pub fn new(hub: ChatHub, user_id: UserId) -> Self {
        Self { hub, user_id }
    }
}

#[async_trait]
impl FrameHandler for ChatConnection {
    async fn on_open(&self, handle: &ConnectionHandle) {
        self.hub.connect(self.user_id, handle).await;
    }

    async fn on_frame(&self, handle: &ConnectionHandle, text: String) {
        self.hub.handle_frame(self.user_id, handle, &text).await;
    }

    async fn on_close(&self, handle: &ConnectionHandle) {
        self.hub.disconnect(self.user_id, handle).await;
    }
}
