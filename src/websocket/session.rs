//! WebSocket transport actor shared by every real-time service.
//!
//! The actor only moves bytes. Inbound text frames go, in arrival order, to
//! a per-connection task driven by [`run_inbound_loop`]; outbound frames come
//! from the [`ConnectionHandle`] queue. Services plug their semantics in
//! through [`FrameHandler`].

use super::{ConnectionHandle, OutboundFrame};
use crate::error::UpgradeError;
use actix::{Actor, ActorContext, AsyncContext, StreamHandler};
use actix_http::ws::Item;
use actix_web::{web, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_stream::wrappers::ReceiverStream;

/// How often the actor notices a handle closed from outside (reaper, registry).
const LIVENESS_POLL: Duration = Duration::from_millis(500);

/// Upper bound for a text message reassembled from continuation frames.
pub const MAX_MESSAGE_BYTES: usize = 64 * 1024;

/// Sent in place of a frame dropped because the inbound queue was full.
pub const RATE_LIMITED_FRAME: &str =
    r#"{"type":"error","code":"rate_limited","message":"too many frames in flight, frame dropped"}"#;

/// Per-connection application logic.
#[async_trait]
pub trait FrameHandler: Send + Sync + 'static {
    async fn on_open(&self, handle: &ConnectionHandle);

    async fn on_frame(&self, handle: &ConnectionHandle, text: String);

    async fn on_close(&self, handle: &ConnectionHandle);
}

/// Queue depths for one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportQueues {
    /// Client frames waiting for the handler.
    pub inbound: usize,
    /// Server frames waiting for the socket.
    pub outbound: usize,
}

/// Drive one connection: open, then every inbound frame in order, then close.
///
/// Returns once the transport is gone and `on_close` has run.
pub async fn run_inbound_loop(
    handler: Arc<dyn FrameHandler>,
    handle: ConnectionHandle,
    mut inbound: mpsc::Receiver<String>,
) {
    handler.on_open(&handle).await;

    while let Some(text) = inbound.recv().await {
        if !handle.is_alive() {
            break;
        }
        handler.on_frame(&handle, text).await;
    }

    handler.on_close(&handle).await;
}

/// Complete the WebSocket handshake and hand the connection to `handler`.
pub fn start_transport(
    req: &HttpRequest,
    payload: web::Payload,
    queues: TransportQueues,
    handler: Arc<dyn FrameHandler>,
) -> Result<HttpResponse, UpgradeError> {
    let (handle, outbound) = ConnectionHandle::open(queues.outbound);
    let (inbound_tx, inbound_rx) = mpsc::channel(queues.inbound.max(1));

    let response = ws::start(
        WsConnection::new(handle.clone(), inbound_tx, outbound),
        req,
        payload,
    )
    .map_err(UpgradeError::Handshake)?;

    tokio::spawn(run_inbound_loop(handler, handle, inbound_rx));
    Ok(response)
}

pub struct WsConnection {
    handle: ConnectionHandle,
    inbound: Option<mpsc::Sender<String>>,
    outbound: Option<mpsc::Receiver<OutboundFrame>>,
    /// Text message being reassembled from continuation frames.
    fragments: Option<Vec<u8>>,
}

impl WsConnection {
    pub fn new(
        handle: ConnectionHandle,
        inbound: mpsc::Sender<String>,
        outbound: mpsc::Receiver<OutboundFrame>,
    ) -> Self {
        Self {
            handle,
            inbound: Some(inbound),
            outbound: Some(outbound),
            fragments: None,
        }
    }

    /// Hand a text message to the inbound loop without waiting.
    ///
    /// A full queue drops the frame and tells the client; a gone consumer
    /// ends the connection.
    fn forward(&mut self, text: String, ctx: &mut ws::WebsocketContext<Self>) {
        let Some(tx) = self.inbound.as_ref() else {
            ctx.stop();
            return;
        };
        match tx.try_send(text) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::debug!(connection_id = %self.handle.id(), "inbound queue full, frame dropped");
                ctx.text(RATE_LIMITED_FRAME);
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(connection_id = %self.handle.id(), "inbound consumer gone, closing");
                ctx.stop();
            }
        }
    }

    fn continuation(&mut self, item: Item, ctx: &mut ws::WebsocketContext<Self>) {
        let (chunk, last) = match item {
            Item::FirstText(chunk) => {
                if self.fragments.is_some() {
                    let reason = "fragment interleaved with another message";
                    return self.close_with(ctx, ws::CloseCode::Protocol, reason);
                }
                self.fragments = Some(Vec::new());
                (chunk, false)
            }
            Item::FirstBinary(_) => {
                let reason = "binary messages not supported";
                return self.close_with(ctx, ws::CloseCode::Unsupported, reason);
            }
            Item::Continue(chunk) => (chunk, false),
            Item::Last(chunk) => (chunk, true),
        };

        let Some(buffer) = self.fragments.as_mut() else {
            let reason = "continuation without a first fragment";
            return self.close_with(ctx, ws::CloseCode::Protocol, reason);
        };
        if buffer.len() + chunk.len() > MAX_MESSAGE_BYTES {
            self.fragments = None;
            return self.close_with(ctx, ws::CloseCode::Size, "message too large");
        }
        buffer.extend_from_slice(&chunk);

        if last {
            let bytes = self.fragments.take().unwrap_or_default();
            match String::from_utf8(bytes) {
                Ok(text) => self.forward(text, ctx),
                Err(_) => {
                    let reason = "text message is not valid UTF-8";
                    self.close_with(ctx, ws::CloseCode::Invalid, reason)
                }
            }
        }
    }

    fn close_with(
        &mut self,
        ctx: &mut ws::WebsocketContext<Self>,
        code: ws::CloseCode,
        description: &str,
    ) {
        tracing::warn!(connection_id = %self.handle.id(), ?code, description, "closing websocket");
        ctx.close(Some(ws::CloseReason {
            code,
            description: Some(description.to_string()),
        }));
        ctx.stop();
    }
}

impl Actor for WsConnection {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::debug!(connection_id = %self.handle.id(), "websocket transport started");

        if let Some(outbound) = self.outbound.take() {
            ctx.add_stream(ReceiverStream::new(outbound));
        }

        ctx.run_interval(LIVENESS_POLL, |act, ctx| {
            if !act.handle.is_alive() {
                ctx.close(None);
                ctx.stop();
            }
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.handle.close();
        // Dropping the sender ends the inbound loop, which deregisters.
        self.inbound.take();
        tracing::debug!(
            connection_id = %self.handle.id(),
            user_id = ?self.handle.user_id(),
            "websocket transport stopped"
        );
    }
}

/// Frames queued by relays and the heartbeat monitor.
impl StreamHandler<OutboundFrame> for WsConnection {
    fn handle(&mut self, frame: OutboundFrame, ctx: &mut Self::Context) {
        match frame {
            OutboundFrame::Text(text) => ctx.text(text),
            OutboundFrame::Ping => ctx.ping(b""),
            OutboundFrame::Close => {
                ctx.close(None);
                ctx.stop();
            }
        }
    }
}

/// Frames arriving from the client.
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsConnection {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.handle.record_heartbeat();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.handle.record_heartbeat();
            }
            Ok(ws::Message::Text(text)) => {
                self.forward(text.to_string(), ctx);
            }
            Ok(ws::Message::Binary(_)) => {
                tracing::warn!(connection_id = %self.handle.id(), "binary frames not supported");
            }
            Ok(ws::Message::Close(reason)) => {
                tracing::debug!(connection_id = %self.handle.id(), ?reason, "client closed");
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(item)) => self.continuation(item, ctx),
            Ok(ws::Message::Nop) => {}
            Err(e) => {
                tracing::warn!(connection_id = %self.handle.id(), error = %e, "websocket protocol error");
                ctx.stop();
            }
        }
    }
}
