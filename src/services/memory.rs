//! In-process collaborators for tests and local runs without Redis/PostgreSQL.

use super::chat_store::{ChatStore, UserDirectory};
use super::session_store::{SessionRecord, SessionStore};
use crate::error::{PersistenceError, SessionStoreError};
use crate::models::{ChatMessage, MessageId, ReadMark, StoredMessage, UserDisplayInfo, UserId};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<String, SessionRecord>>,
    unavailable: AtomicBool,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session_id: &str, record: SessionRecord) {
        lock(&self.sessions).insert(session_id.to_string(), record);
    }

    pub fn revoke(&self, session_id: &str) {
        lock(&self.sessions).remove(session_id);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn lookup_session(
        &self,
        session_id: &str,
    ) -> Result<Option<SessionRecord>, SessionStoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SessionStoreError::Unreachable("session store offline".into()));
        }
        Ok(lock(&self.sessions).get(session_id).cloned())
    }
}

/// Stored row, as the HTTP query path would later read it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRow {
    pub id: MessageId,
    pub message: ChatMessage,
    pub is_read: bool,
}

#[derive(Default)]
struct ChatTables {
    users: HashMap<UserId, UserDisplayInfo>,
    messages: Vec<StoredRow>,
    failing_reads: HashSet<MessageId>,
}

/// Chat store with failure injection.
#[derive(Default)]
pub struct InMemoryChatStore {
    tables: Mutex<ChatTables>,
    fail_inserts: AtomicBool,
}

impl InMemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, user_id: UserId, name: &str) {
        lock(&self.tables).users.insert(
            user_id,
            UserDisplayInfo {
                name: name.to_string(),
                avatar_ref: None,
            },
        );
    }

    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    /// Make `mark_messages_read` fail whenever it touches `message_id`.
    pub fn fail_read_for(&self, message_id: MessageId) {
        lock(&self.tables).failing_reads.insert(message_id);
    }

    pub fn messages(&self) -> Vec<StoredRow> {
        lock(&self.tables).messages.clone()
    }
}

#[async_trait]
impl ChatStore for InMemoryChatStore {
    async fn user_exists(&self, user_id: UserId) -> Result<bool, PersistenceError> {
        Ok(lock(&self.tables).users.contains_key(&user_id))
    }

    async fn insert_message(
        &self,
        message: &ChatMessage,
    ) -> Result<StoredMessage, PersistenceError> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(PersistenceError::Unavailable("insert disabled".into()));
        }
        let mut tables = lock(&self.tables);
        let id = tables.messages.len() as MessageId + 1;
        tables.messages.push(StoredRow {
            id,
            message: message.clone(),
            is_read: false,
        });
        Ok(StoredMessage {
            id,
            created_at: Utc::now(),
        })
    }

    async fn mark_messages_read(
        &self,
        reader_id: UserId,
        message_ids: &[MessageId],
    ) -> Result<Vec<ReadMark>, PersistenceError> {
        let mut tables = lock(&self.tables);
        if let Some(id) = message_ids.iter().find(|id| tables.failing_reads.contains(*id)) {
            return Err(PersistenceError::Query(format!("cannot mark message {id}")));
        }
        let marks = tables
            .messages
            .iter_mut()
            .filter(|row| message_ids.contains(&row.id) && row.message.recipient_id == reader_id)
            .map(|row| {
                row.is_read = true;
                ReadMark {
                    message_id: row.id,
                    sender_id: row.message.sender_id,
                }
            })
            .collect();
        Ok(marks)
    }
}

#[async_trait]
impl UserDirectory for InMemoryChatStore {
    async fn get_user_display_info(
        &self,
        user_id: UserId,
    ) -> Result<Option<UserDisplayInfo>, PersistenceError> {
        Ok(lock(&self.tables).users.get(&user_id).cloned())
    }
}
