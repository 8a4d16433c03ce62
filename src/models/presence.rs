use super::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceState {
    Online,
    Offline,
}

/// Transient presence change. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceEvent {
    pub subject_user_id: UserId,
    pub state: PresenceState,
    pub occurred_at: DateTime<Utc>,
}

impl PresenceEvent {
    pub fn now(subject_user_id: UserId, state: PresenceState) -> Self {
        Self {
            subject_user_id,
            state,
            occurred_at: Utc::now(),
        }
    }
}
