//! Video-meeting signaling.
//!
//! Participants join a named room and exchange opaque SDP/ICE payloads. The
//! server never inspects a payload; it only knows who is in which room.

pub mod message_types;

use crate::error::ValidationError;
use crate::models::UserId;
use crate::websocket::fanout::push_to_handles;
use crate::websocket::heartbeat::HeartbeatMonitor;
use crate::websocket::session::FrameHandler;
use crate::websocket::{ConnectionHandle, ConnectionId};
use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use message_types::{MeetingClientFrame, MeetingServerFrame, Peer};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const MAX_ROOM_NAME: usize = 128;

/// Validate a `room` query value.
pub fn parse_room_name(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|room| !room.is_empty() && room.len() <= MAX_ROOM_NAME)
        .map(str::to_string)
}

/// room -> participants by connection id. A room exists only while occupied.
#[derive(Default, Clone)]
pub struct RoomRegistry {
    rooms: Arc<DashMap<String, HashMap<ConnectionId, (UserId, ConnectionHandle)>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a participant and return the peers that were already there.
    pub fn join(&self, room: &str, user_id: UserId, handle: ConnectionHandle) -> Vec<Peer> {
        let mut participants = self.rooms.entry(room.to_string()).or_default();
        let existing = participants
            .iter()
            .filter(|(id, _)| **id != handle.id())
            .map(|(id, (user_id, _))| Peer {
                user_id: *user_id,
                connection_id: *id,
            })
            .collect();
        participants.insert(handle.id(), (user_id, handle));
        existing
    }

    /// Remove a participant. Returns false if it was not in the room.
    pub fn leave(&self, room: &str, connection_id: ConnectionId) -> bool {
        match self.rooms.entry(room.to_string()) {
            Entry::Occupied(mut entry) => {
                let removed = entry.get_mut().remove(&connection_id).is_some();
                if entry.get().is_empty() {
                    entry.remove();
                }
                removed
            }
            Entry::Vacant(_) => false,
        }
    }

    /// Live handles in `room`, excluding `except`.
    pub fn others(&self, room: &str, except: ConnectionId) -> Vec<ConnectionHandle> {
        self.rooms
            .get(room)
            .map(|participants| {
                participants
                    .iter()
                    .filter(|(id, (_, handle))| **id != except && handle.is_alive())
                    .map(|(_, (_, handle))| handle.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn find(&self, room: &str, connection_id: ConnectionId) -> Option<ConnectionHandle> {
        self.rooms
            .get(room)
            .and_then(|participants| participants.get(&connection_id).map(|(_, h)| h.clone()))
    }

    pub fn participant_count(&self, room: &str) -> usize {
        self.rooms.get(room).map(|p| p.len()).unwrap_or(0)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

#[derive(Clone)]
pub struct MeetingHub {
    rooms: RoomRegistry,
    heartbeat: HeartbeatMonitor,
    send_timeout: Duration,
}

impl MeetingHub {
    pub fn new(rooms: RoomRegistry, heartbeat_interval: Duration, send_timeout: Duration) -> Self {
        Self {
            rooms,
            heartbeat: HeartbeatMonitor::new(heartbeat_interval),
            send_timeout,
        }
    }

    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    pub async fn join(&self, room: &str, user_id: UserId, handle: &ConnectionHandle) {
        if !handle.is_alive() || !handle.bind_user(user_id) {
            return;
        }
        let me = Peer {
            user_id,
            connection_id: handle.id(),
        };
        let peers = self.rooms.join(room, user_id, handle.clone());

        let welcome = MeetingServerFrame::RoomPeers {
            room: room.to_string(),
            me,
            peers,
        };
        if let Err(e) = handle.send_frame(&welcome, self.send_timeout).await {
            tracing::debug!(connection_id = %handle.id(), error = %e, "could not send room peers");
        }

        let joined = MeetingServerFrame::PeerJoined {
            user_id,
            connection_id: handle.id(),
        };
        push_to_handles(&self.rooms.others(room, handle.id()), &joined, self.send_timeout).await;

        let hub = self.clone();
        let room_name = room.to_string();
        self.heartbeat.watch(handle.clone(), move |dead| async move {
            hub.leave(&room_name, user_id, &dead).await;
        });

        tracing::info!(
            room,
            user_id,
            connection_id = %handle.id(),
            participants = self.rooms.participant_count(room),
            "joined meeting room"
        );
    }

    /// Idempotent; only the first call announces `peer-left`.
    pub async fn leave(&self, room: &str, user_id: UserId, handle: &ConnectionHandle) {
        handle.close();
        if !self.rooms.leave(room, handle.id()) {
            return;
        }
        let left = MeetingServerFrame::PeerLeft {
            user_id,
            connection_id: handle.id(),
        };
        push_to_handles(&self.rooms.others(room, handle.id()), &left, self.send_timeout).await;
        tracing::info!(room, user_id, connection_id = %handle.id(), "left meeting room");
    }

    pub async fn handle_frame(&self, room: &str, user_id: UserId, handle: &ConnectionHandle, text: &str) {
        let frame = match serde_json::from_str::<MeetingClientFrame>(text) {
            Ok(frame) => frame,
            Err(e) => {
                let err = ValidationError::MalformedFrame(e.to_string());
                self.reply(handle, error_frame(err.code(), err.to_string())).await;
                return;
            }
        };

        match frame {
            MeetingClientFrame::Signal { to, payload } => {
                let targets = match to {
                    Some(target) if target == handle.id() => Vec::new(),
                    Some(target) => match self.rooms.find(room, target) {
                        Some(peer) => vec![peer],
                        None => {
                            self.reply(
                                handle,
                                error_frame("unknown_peer", format!("{target} is not in this room")),
                            )
                            .await;
                            return;
                        }
                    },
                    None => self.rooms.others(room, handle.id()),
                };
                let signal = MeetingServerFrame::Signal {
                    from: Peer {
                        user_id,
                        connection_id: handle.id(),
                    },
                    payload,
                };
                push_to_handles(&targets, &signal, self.send_timeout).await;
            }
            MeetingClientFrame::Ping => {
                handle.record_heartbeat();
                self.reply(handle, MeetingServerFrame::Pong).await;
            }
        }
    }

    async fn reply(&self, handle: &ConnectionHandle, frame: MeetingServerFrame) {
        if let Err(e) = handle.send_frame(&frame, self.send_timeout).await {
            tracing::debug!(connection_id = %handle.id(), error = %e, "reply dropped");
        }
    }
}

fn error_frame(code: &str, message: String) -> MeetingServerFrame {
    MeetingServerFrame::Error {
        code: code.to_string(),
        message,
    }
}

/// One participant's connection to one room.
pub struct MeetingConnection {
    hub: MeetingHub,
    room: String,
    user_id: UserId,
}

impl MeetingConnection {
    pub fn new(hub: MeetingHub, room: String, user_id: UserId) -> Self {
        Self { hub, room, user_id }
    }
}

#[async_trait]
impl FrameHandler for MeetingConnection {
    async fn on_open(&self, handle: &ConnectionHandle) {
        self.hub.join(&self.room, self.user_id, handle).await;
    }

    async fn on_frame(&self, handle: &ConnectionHandle, text: String) {
        self.hub
            .handle_frame(&self.room, self.user_id, handle, &text)
            .await;
    }

    async fn on_close(&self, handle: &ConnectionHandle) {
        self.hub.leave(&self.room, self.user_id, handle).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::OutboundFrame;
    use serde_json::json;
    use tokio::sync::mpsc::Receiver;

    fn frames(rx: &mut Receiver<OutboundFrame>) -> Vec<serde_json::Value> {
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            if let OutboundFrame::Text(text) = frame {
                out.push(serde_json::from_str(&text).unwrap());
            }
        }
        out
    }

    fn hub() -> MeetingHub {
        MeetingHub::new(
            RoomRegistry::new(),
            Duration::from_secs(30),
            Duration::from_millis(50),
        )
    }

    #[test]
    fn test_parse_room_name() {
        assert_eq!(parse_room_name(Some(" standup ")), Some("standup".into()));
        assert_eq!(parse_room_name(Some("  ")), None);
        assert_eq!(parse_room_name(None), None);
        assert_eq!(parse_room_name(Some(&"r".repeat(200))), None);
    }

    #[tokio::test]
    async fn test_join_announces_and_lists_peers() {
        let hub = hub();
        let (a, mut a_rx) = ConnectionHandle::open(8);
        let (b, mut b_rx) = ConnectionHandle::open(8);

        hub.join("standup", 1, &a).await;
        let welcome = frames(&mut a_rx);
        assert_eq!(welcome[0]["type"], "room-peers");
        assert_eq!(welcome[0]["peers"], json!([]));

        hub.join("standup", 2, &b).await;
        let welcome = frames(&mut b_rx);
        assert_eq!(welcome[0]["peers"][0]["userId"], 1);
        assert_eq!(welcome[0]["peers"][0]["connectionId"], a.id().to_string());
        assert_eq!(welcome[0]["self"]["userId"], 2);

        let joined = frames(&mut a_rx);
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0]["type"], "peer-joined");
        assert_eq!(joined[0]["userId"], 2);
    }

    #[tokio::test]
    async fn test_signal_targeted_and_broadcast() {
        let hub = hub();
        let (a, mut a_rx) = ConnectionHandle::open(8);
        let (b, mut b_rx) = ConnectionHandle::open(8);
        let (c, mut c_rx) = ConnectionHandle::open(8);
        hub.join("r", 1, &a).await;
        hub.join("r", 2, &b).await;
        hub.join("r", 3, &c).await;
        for rx in [&mut a_rx, &mut b_rx, &mut c_rx] {
            frames(rx);
        }

        let offer = json!({"type": "signal", "to": b.id(), "payload": {"sdp": "offer"}});
        hub.handle_frame("r", 1, &a, &offer.to_string()).await;
        let got = frames(&mut b_rx);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0]["from"]["userId"], 1);
        assert_eq!(got[0]["payload"]["sdp"], "offer");
        assert!(frames(&mut c_rx).is_empty());

        let candidate = json!({"type": "signal", "payload": {"candidate": "x"}});
        hub.handle_frame("r", 3, &c, &candidate.to_string()).await;
        assert_eq!(frames(&mut a_rx).len(), 1);
        assert_eq!(frames(&mut b_rx).len(), 1);
        assert!(frames(&mut c_rx).is_empty());
    }

    #[tokio::test]
    async fn test_signal_to_unknown_peer_is_an_error() {
        let hub = hub();
        let (a, mut a_rx) = ConnectionHandle::open(8);
        hub.join("r", 1, &a).await;
        frames(&mut a_rx);

        let stray = json!({"type": "signal", "to": ConnectionId::new(), "payload": {}});
        hub.handle_frame("r", 1, &a, &stray.to_string()).await;
        let got = frames(&mut a_rx);
        assert_eq!(got[0]["type"], "error");
        assert_eq!(got[0]["code"], "unknown_peer");
    }

    #[tokio::test]
    async fn test_leave_announces_once_and_removes_empty_room() {
        let hub = hub();
        let (a, mut a_rx) = ConnectionHandle::open(8);
        let (b, _b_rx) = ConnectionHandle::open(8);
        hub.join("r", 1, &a).await;
        hub.join("r", 2, &b).await;
        frames(&mut a_rx);

        hub.leave("r", 2, &b).await;
        hub.leave("r", 2, &b).await;
        let got = frames(&mut a_rx);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0]["type"], "peer-left");
        assert_eq!(hub.rooms().participant_count("r"), 1);

        hub.leave("r", 1, &a).await;
        assert_eq!(hub.rooms().room_count(), 0);
    }
}
