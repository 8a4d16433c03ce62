use crate::config::WsConfig;
use crate::meeting::{MeetingHub, RoomRegistry};
use crate::services::{ChatStore, UserDirectory};
use crate::websocket::hub::ChatHub;
use crate::websocket::ConnectionRegistry;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub registry: ConnectionRegistry,
    pub chat: ChatHub,
    pub meeting: MeetingHub,
}

impl AppState {
    pub fn new(
        store: Arc<dyn ChatStore>,
        directory: Arc<dyn UserDirectory>,
        ws: &WsConfig,
    ) -> Self {
        let registry = ConnectionRegistry::new();
        Self {
            chat: ChatHub::new(registry.clone(), store, directory, ws),
            meeting: MeetingHub::new(RoomRegistry::new(), ws.heartbeat_interval, ws.send_timeout),
            registry,
        }
    }
}
