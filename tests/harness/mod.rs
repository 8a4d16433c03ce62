//! In-process gateway for integration tests: real hub, registry and relays,
//! in-memory persistence. Clients are bare handles driven through the hub.

#![allow(dead_code)]

pub mod server;

use realtime_gateway::config::WsConfig;
use realtime_gateway::models::UserId;
use realtime_gateway::services::memory::InMemoryChatStore;
use realtime_gateway::state::AppState;
use realtime_gateway::websocket::{ConnectionHandle, OutboundFrame};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::Receiver;

pub struct TestGateway {
    pub state: AppState,
    pub store: Arc<InMemoryChatStore>,
}

impl TestGateway {
    pub fn new(users: &[(UserId, &str)]) -> Self {
        let store = Arc::new(InMemoryChatStore::new());
        for (id, name) in users {
            store.add_user(*id, name);
        }
        let ws = WsConfig {
            heartbeat_interval: Duration::from_secs(30),
            send_timeout: Duration::from_millis(100),
            ..WsConfig::default()
        };
        let state = AppState::new(store.clone(), store.clone(), &ws);
        Self { state, store }
    }

    pub async fn connect(&self, user_id: UserId) -> TestClient {
        let (handle, rx) = ConnectionHandle::open(32);
        self.state.chat.connect(user_id, &handle).await;
        TestClient {
            user_id,
            handle,
            rx,
            state: self.state.clone(),
        }
    }
}

pub struct TestClient {
    pub user_id: UserId,
    pub handle: ConnectionHandle,
    rx: Receiver<OutboundFrame>,
    state: AppState,
}

impl TestClient {
    pub async fn send(&self, frame: Value) {
        self.state
            .chat
            .handle_frame(self.user_id, &self.handle, &frame.to_string())
            .await;
    }

    pub async fn disconnect(&self) {
        self.state.chat.disconnect(self.user_id, &self.handle).await;
    }

    /// Drain queued JSON frames, skipping control frames.
    pub fn frames(&mut self) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(frame) = self.rx.try_recv() {
            if let OutboundFrame::Text(text) = frame {
                out.push(serde_json::from_str(&text).expect("server sent invalid JSON"));
            }
        }
        out
    }

    pub fn frames_of(&mut self, kind: &str) -> Vec<Value> {
        self.frames()
            .into_iter()
            .filter(|f| f["type"] == kind)
            .collect()
    }

    pub fn pings(&mut self) -> usize {
        let mut count = 0;
        while let Ok(frame) = self.rx.try_recv() {
            if frame == OutboundFrame::Ping {
                count += 1;
            }
        }
        count
    }
}
