pub mod chat;
pub mod dispatcher;
pub mod meeting;
pub mod status;

use crate::config::Config;
use crate::error::AppError;
use crate::services::SessionAuthenticator;
use crate::state::AppState;
use crate::websocket::session::TransportQueues;
use chat::ChatService;
use dispatcher::UpgradeDispatcher;
use meeting::MeetingService;
use std::sync::Arc;

/// Mount the chat and meeting services on their configured paths.
pub fn build_dispatcher(
    config: &Config,
    state: &AppState,
    authenticator: SessionAuthenticator,
) -> Result<UpgradeDispatcher, AppError> {
    let queues = TransportQueues {
        inbound: config.ws.inbound_buffer,
        outbound: config.ws.outbound_buffer,
    };
    let mut dispatcher = UpgradeDispatcher::new();
    dispatcher
        .register(Arc::new(ChatService::new(
            config.paths.chat.clone(),
            authenticator.clone(),
            state.chat.clone(),
            queues,
        )))
        .map_err(AppError::Config)?;
    dispatcher
        .register(Arc::new(MeetingService::new(
            config.paths.meeting.clone(),
            authenticator,
            state.meeting.clone(),
            queues,
        )))
        .map_err(AppError::Config)?;
    Ok(dispatcher)
}
