use super::chat::cookie_header;
use super::dispatcher::RealtimeService;
use crate::error::UpgradeError;
use crate::meeting::{parse_room_name, MeetingConnection, MeetingHub};
use crate::services::SessionAuthenticator;
use crate::websocket::session::{start_transport, TransportQueues};
use actix_web::{web, HttpRequest, HttpResponse};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct RoomQuery {
    room: Option<String>,
}

/// Video-meeting signaling: `?room=<name>` selects the room.
pub struct MeetingService {
    path: String,
    authenticator: SessionAuthenticator,
    hub: MeetingHub,
    queues: TransportQueues,
}

impl MeetingService {
    pub fn new(
        path: impl Into<String>,
        authenticator: SessionAuthenticator,
        hub: MeetingHub,
        queues: TransportQueues,
    ) -> Self {
        Self {
            path: path.into(),
            authenticator,
            hub,
            queues,
        }
    }
}

#[async_trait(?Send)]
impl RealtimeService for MeetingService {
    fn name(&self) -> &'static str {
        "meeting"
    }

    fn path(&self) -> &str {
        &self.path
    }

    async fn accept_connection(
        &self,
        req: &HttpRequest,
        payload: web::Payload,
    ) -> Result<HttpResponse, UpgradeError> {
        let query = web::Query::<RoomQuery>::from_query(req.query_string())
            .map_err(|e| UpgradeError::BadRequest(e.to_string()))?;
        let room = parse_room_name(query.room.as_deref())
            .ok_or_else(|| UpgradeError::BadRequest("room query parameter required".into()))?;

        let user_id = self.authenticator.authenticate(cookie_header(req)).await?;
        tracing::debug!(user_id, room = %room, "meeting upgrade authenticated");

        let connection = Arc::new(MeetingConnection::new(self.hub.clone(), room, user_id));
        start_transport(req, payload, self.queues, connection)
    }
}
