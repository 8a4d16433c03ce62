use crate::models::UserId;
use crate::websocket::ConnectionId;
use serde::{Deserialize, Serialize};

/// A participant as other participants see it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Peer {
    pub user_id: UserId,
    pub connection_id: ConnectionId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum MeetingClientFrame {
    /// Opaque SDP/ICE payload; `to` targets one connection, absent means everyone else.
    Signal {
        #[serde(default)]
        to: Option<ConnectionId>,
        payload: serde_json::Value,
    },
    Ping,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum MeetingServerFrame {
    RoomPeers {
        room: String,
        #[serde(rename = "self")]
        me: Peer,
        peers: Vec<Peer>,
    },
    PeerJoined {
        user_id: UserId,
        connection_id: ConnectionId,
    },
    PeerLeft {
        user_id: UserId,
        connection_id: ConnectionId,
    },
    Signal {
        from: Peer,
        payload: serde_json::Value,
    },
    Pong,
    Error {
        code: String,
        message: String,
    },
}
