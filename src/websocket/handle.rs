use crate::error::DeliveryError;
use crate::models::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::SendTimeoutError, error::TrySendError};
use tokio::time::Instant;
use uuid::Uuid;

/// Unique identifier for a live connection
///
/// Each transport gets its own ID, so one user can hold several handles
/// (tabs, devices) and each can be removed precisely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// What the transport actor is asked to put on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    Text(String),
    /// Liveness probe, written as a WebSocket ping control frame.
    Ping,
    Close,
}

#[derive(Debug)]
struct HeartbeatState {
    last_ack: Instant,
    last_probe: Option<Instant>,
}

struct HandleInner {
    id: ConnectionId,
    user_id: OnceLock<UserId>,
    opened_at: DateTime<Utc>,
    alive: AtomicBool,
    heartbeat: Mutex<HeartbeatState>,
    outbound: mpsc::Sender<OutboundFrame>,
}

/// Bidirectional, message-framed endpoint of one live connection.
///
/// Cloning is cheap; clones refer to the same transport. The registry entry
/// holding the handle owns its lifecycle, everybody else only borrows it for
/// the duration of a push.
#[derive(Clone)]
pub struct ConnectionHandle {
    inner: Arc<HandleInner>,
}

impl ConnectionHandle {
    /// Create a handle plus the receiving end the transport drains.
    pub fn open(buffer: usize) -> (Self, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let handle = Self {
            inner: Arc::new(HandleInner {
                id: ConnectionId::new(),
                user_id: OnceLock::new(),
                opened_at: Utc::now(),
                alive: AtomicBool::new(true),
                heartbeat: Mutex::new(HeartbeatState {
                    last_ack: Instant::now(),
                    last_probe: None,
                }),
                outbound: tx,
            }),
        };
        (handle, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    /// Owning user, `None` until the connection is authenticated and bound.
    pub fn user_id(&self) -> Option<UserId> {
        self.inner.user_id.get().copied()
    }

    /// Bind the owning user. A handle belongs to exactly one user for life;
    /// returns false when already bound to someone else.
    pub fn bind_user(&self, user_id: UserId) -> bool {
        match self.inner.user_id.set(user_id) {
            Ok(()) => true,
            Err(_) => self.user_id() == Some(user_id),
        }
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.inner.opened_at
    }

    pub fn is_alive(&self) -> bool {
        self.inner.alive.load(Ordering::Acquire) && !self.inner.outbound.is_closed()
    }

    /// Mark the handle dead and ask the transport to close. Idempotent.
    pub fn close(&self) {
        if self.inner.alive.swap(false, Ordering::AcqRel) {
            // Best effort: the actor also polls liveness in case the queue is full.
            let _ = self.inner.outbound.try_send(OutboundFrame::Close);
        }
    }

    /// Queue a text frame, waiting at most `timeout` for queue space.
    pub async fn send_text(&self, text: String, timeout: Duration) -> Result<(), DeliveryError> {
        if !self.is_alive() {
            return Err(DeliveryError::Closed);
        }
        match self
            .inner
            .outbound
            .send_timeout(OutboundFrame::Text(text), timeout)
            .await
        {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => Err(DeliveryError::Timeout),
            Err(SendTimeoutError::Closed(_)) => {
                self.inner.alive.store(false, Ordering::Release);
                Err(DeliveryError::Closed)
            }
        }
    }

    /// Serialize and queue a frame.
    pub async fn send_frame<T: Serialize>(
        &self,
        frame: &T,
        timeout: Duration,
    ) -> Result<(), DeliveryError> {
        let text = serde_json::to_string(frame)
            .map_err(|e| DeliveryError::Serialization(e.to_string()))?;
        self.send_text(text, timeout).await
    }

    /// Queue a liveness probe and remember when it went out.
    ///
    /// A full queue still counts as a sent probe: a client that stopped
    /// draining its socket is as dead as one that stopped answering.
    pub fn probe(&self) -> Result<(), DeliveryError> {
        if !self.is_alive() {
            return Err(DeliveryError::Closed);
        }
        self.heartbeat().last_probe = Some(Instant::now());
        match self.inner.outbound.try_send(OutboundFrame::Ping) {
            Ok(()) | Err(TrySendError::Full(_)) => Ok(()),
            Err(TrySendError::Closed(_)) => Err(DeliveryError::Closed),
        }
    }

    /// Record a liveness acknowledgment from the client.
    pub fn record_heartbeat(&self) {
        self.heartbeat().last_ack = Instant::now();
    }

    /// True when the most recent probe has not been acknowledged yet.
    pub fn awaiting_heartbeat(&self) -> bool {
        let hb = self.heartbeat();
        matches!(hb.last_probe, Some(probe) if hb.last_ack < probe)
    }

    fn heartbeat(&self) -> std::sync::MutexGuard<'_, HeartbeatState> {
        self.inner
            .heartbeat
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for ConnectionHandle {}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.inner.id)
            .field("user_id", &self.user_id())
            .field("alive", &self.is_alive())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_text_reaches_receiver() {
        let (handle, mut rx) = ConnectionHandle::open(4);
        handle
            .send_text("hello".into(), Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(rx.recv().await, Some(OutboundFrame::Text("hello".into())));
    }

    #[tokio::test]
    async fn test_send_after_receiver_dropped_is_closed() {
        let (handle, rx) = ConnectionHandle::open(4);
        drop(rx);
        let result = handle.send_text("x".into(), Duration::from_millis(50)).await;
        assert_eq!(result, Err(DeliveryError::Closed));
        assert!(!handle.is_alive());
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_queue_times_out() {
        let (handle, _rx) = ConnectionHandle::open(1);
        handle
            .send_text("first".into(), Duration::from_millis(10))
            .await
            .unwrap();
        let result = handle
            .send_text("second".into(), Duration::from_millis(10))
            .await;
        assert_eq!(result, Err(DeliveryError::Timeout));
        assert!(handle.is_alive());
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_sends_one_close() {
        let (handle, mut rx) = ConnectionHandle::open(4);
        handle.close();
        handle.close();
        assert!(!handle.is_alive());
        assert_eq!(rx.recv().await, Some(OutboundFrame::Close));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_then_ack_clears_awaiting() {
        let (handle, mut rx) = ConnectionHandle::open(4);
        assert!(!handle.awaiting_heartbeat());

        tokio::time::advance(Duration::from_millis(5)).await;
        handle.probe().unwrap();
        assert!(handle.awaiting_heartbeat());
        assert_eq!(rx.recv().await, Some(OutboundFrame::Ping));

        tokio::time::advance(Duration::from_millis(5)).await;
        handle.record_heartbeat();
        assert!(!handle.awaiting_heartbeat());
    }

    #[test]
    fn test_bind_user_once() {
        let (handle, _rx) = ConnectionHandle::open(1);
        assert_eq!(handle.user_id(), None);
        assert!(handle.bind_user(7));
        assert!(handle.bind_user(7));
        assert!(!handle.bind_user(8));
        assert_eq!(handle.user_id(), Some(7));
    }
}
