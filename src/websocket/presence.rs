use super::fanout::{push_to_handles, FanoutReport};
use super::message_types::ServerFrame;
use super::ConnectionRegistry;
use crate::models::{PresenceEvent, PresenceState, UserId};
use std::time::Duration;

/// Announces online/offline transitions to every other online user.
///
/// The audience is deliberately unfiltered: every other user with a live
/// handle hears about every transition. Narrowing it to a contact graph is a
/// product decision, not something this type decides.
#[derive(Clone)]
pub struct PresenceBroadcaster {
    registry: ConnectionRegistry,
    send_timeout: Duration,
}

impl PresenceBroadcaster {
    pub fn new(registry: ConnectionRegistry, send_timeout: Duration) -> Self {
        Self {
            registry,
            send_timeout,
        }
    }

    pub async fn broadcast_presence(
        &self,
        subject_user_id: UserId,
        state: PresenceState,
    ) -> FanoutReport {
        self.broadcast_event(PresenceEvent::now(subject_user_id, state))
            .await
    }

    pub async fn broadcast_event(&self, event: PresenceEvent) -> FanoutReport {
        let handles: Vec<_> = self
            .registry
            .all_online_user_ids()
            .into_iter()
            .filter(|user_id| *user_id != event.subject_user_id)
            .flat_map(|user_id| self.registry.live_handles_for(user_id))
            .collect();

        let frame = ServerFrame::Presence {
            user_id: event.subject_user_id,
            state: event.state,
            occurred_at: event.occurred_at,
        };

        let report = push_to_handles(&handles, &frame, self.send_timeout).await;
        tracing::debug!(
            user_id = event.subject_user_id,
            state = ?event.state,
            delivered = report.delivered,
            failed = report.failed,
            "presence broadcast"
        );
        report
    }
}
