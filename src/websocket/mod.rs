use crate::metrics;
use crate::models::UserId;
use dashmap::{mapref::entry::Entry, DashMap};
use std::collections::HashMap;
use std::sync::Arc;

pub mod fanout;
pub mod handle;
pub mod heartbeat;
pub mod hub;
pub mod indicators;
pub mod message_types;
pub mod presence;
pub mod relay;
pub mod session;

pub use handle::{ConnectionHandle, ConnectionId, OutboundFrame};

/// Zero/non-zero transition of a user's live connection count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceTransition {
    BecameOnline,
    BecameOffline,
    Unchanged,
}

/// Connection registry for live handles
///
/// Source of truth for which users are online and through which handles.
/// Keys are sharded by `DashMap`, so register/deregister for different users
/// never contend on one lock. A user key exists only while its handle set is
/// non-empty.
#[derive(Default, Clone)]
pub struct ConnectionRegistry {
    // user_id -> live handles by connection id
    inner: Arc<DashMap<UserId, HashMap<ConnectionId, ConnectionHandle>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handle to the user's set.
    ///
    /// Closed handles are refused, and a handle already bound to another user
    /// is refused too. Returns `BecameOnline` when this created the entry.
    pub fn register(&self, user_id: UserId, handle: ConnectionHandle) -> PresenceTransition {
        if !handle.is_alive() || !handle.bind_user(user_id) {
            tracing::debug!(
                user_id,
                connection_id = %handle.id(),
                "refusing to register closed or foreign handle"
            );
            return PresenceTransition::Unchanged;
        }

        let transition = match self.inner.entry(user_id) {
            Entry::Occupied(mut entry) => {
                if entry.get_mut().insert(handle.id(), handle.clone()).is_none() {
                    metrics::LIVE_CONNECTIONS.inc();
                }
                PresenceTransition::Unchanged
            }
            Entry::Vacant(entry) => {
                let mut set = HashMap::new();
                set.insert(handle.id(), handle.clone());
                entry.insert(set);
                metrics::LIVE_CONNECTIONS.inc();
                metrics::ONLINE_USERS.inc();
                PresenceTransition::BecameOnline
            }
        };

        tracing::debug!(
            user_id,
            connection_id = %handle.id(),
            connections = self.connection_count(user_id),
            "registered connection"
        );
        transition
    }

    /// Remove a handle; deletes the entry when it was the last one.
    ///
    /// Idempotent: removing an unknown handle is `Unchanged`.
    pub fn deregister(&self, user_id: UserId, handle: &ConnectionHandle) -> PresenceTransition {
        match self.inner.entry(user_id) {
            Entry::Occupied(mut entry) => {
                if entry.get_mut().remove(&handle.id()).is_none() {
                    return PresenceTransition::Unchanged;
                }
                metrics::LIVE_CONNECTIONS.dec();

                if entry.get().is_empty() {
                    entry.remove();
                    metrics::ONLINE_USERS.dec();
                    tracing::debug!(user_id, "removed empty registry entry");
                    PresenceTransition::BecameOffline
                } else {
                    tracing::debug!(
                        user_id,
                        connection_id = %handle.id(),
                        remaining = entry.get().len(),
                        "deregistered connection"
                    );
                    PresenceTransition::Unchanged
                }
            }
            Entry::Vacant(_) => PresenceTransition::Unchanged,
        }
    }

    /// Snapshot of the user's live handles, possibly empty.
    pub fn live_handles_for(&self, user_id: UserId) -> Vec<ConnectionHandle> {
        self.inner
            .get(&user_id)
            .map(|set| set.values().filter(|h| h.is_alive()).cloned().collect())
            .unwrap_or_default()
    }

    /// Snapshot of every user with at least one live handle.
    pub fn all_online_user_ids(&self) -> Vec<UserId> {
        self.inner.iter().map(|entry| *entry.key()).collect()
    }

    pub fn is_online(&self, user_id: UserId) -> bool {
        self.inner.contains_key(&user_id)
    }

    pub fn connection_count(&self, user_id: UserId) -> usize {
        self.inner.get(&user_id).map(|set| set.len()).unwrap_or(0)
    }

    pub fn total_connections(&self) -> usize {
        self.inner.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn connected_users_count(&self) -> usize {
        self.inner.len()
    }
}
