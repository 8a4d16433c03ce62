use super::dispatcher::RealtimeService;
use crate::error::UpgradeError;
use crate::services::SessionAuthenticator;
use crate::websocket::hub::{ChatConnection, ChatHub};
use crate::websocket::session::{start_transport, TransportQueues};
use actix_web::{http::header, web, HttpRequest, HttpResponse};
use async_trait::async_trait;
use std::sync::Arc;

/// Chat, presence, typing and read receipts over one socket.
pub struct ChatService {
    path: String,
    authenticator: SessionAuthenticator,
    hub: ChatHub,
    queues: TransportQueues,
}

impl ChatService {
    pub fn new(
        path: impl Into<String>,
        authenticator: SessionAuthenticator,
        hub: ChatHub,
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

pub(crate) fn cookie_header(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get(header::COOKIE)
        .and_then(|value| value.to_str().ok())
}

#[async_trait(?Send)]
impl RealtimeService for ChatService {
    fn name(&self) -> &'static str {
        "chat"
    }

    fn path(&self) -> &str {
        &self.path
    }

    async fn accept_connection(
        &self,
        req: &HttpRequest,
        payload: web::Payload,
    ) -> Result<HttpResponse, UpgradeError> {
        let user_id = self.authenticator.authenticate(cookie_header(req)).await?;
        tracing::debug!(user_id, "chat upgrade authenticated");

        let connection = Arc::new(ChatConnection::new(self.hub.clone(), user_id));
        start_transport(req, payload, self.queues, connection)
    }
}
