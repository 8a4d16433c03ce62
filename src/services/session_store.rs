use crate::error::SessionStoreError;
use crate::models::UserId;
use crate::redis_client::RedisClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use serde_json::Value;

/// Live session as seen by the real-time core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub user_id: UserId,
    pub expires_at: Option<DateTime<Utc>>,
}

impl SessionRecord {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(expires_at) if expires_at <= now)
    }

    /// Read an express-session style document.
    ///
    /// The user id is taken from `userId`, falling back to `passport.user`;
    /// numeric strings are accepted. Documents without a user are anonymous
    /// sessions and yield `None`.
    pub fn from_session_json(doc: &Value) -> Option<Self> {
        let user = doc
            .get("userId")
            .or_else(|| doc.get("passport").and_then(|p| p.get("user")))?;
        let user_id = match user {
            Value::Number(n) => n.as_i64()?,
            Value::String(s) => s.parse().ok()?,
            _ => return None,
        };

        let expires_at = doc
            .get("cookie")
            .and_then(|c| c.get("expires"))
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        Some(Self {
            user_id,
            expires_at,
        })
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// `Ok(None)` when no live session exists for the id.
    async fn lookup_session(
        &self,
        session_id: &str,
    ) -> Result<Option<SessionRecord>, SessionStoreError>;
}

/// Reads the sessions the HTTP layer writes to Redis.
#[derive(Clone)]
pub struct RedisSessionStore {
    redis: RedisClient,
    key_prefix: String,
}

impl RedisSessionStore {
    pub fn new(redis: RedisClient, key_prefix: impl Into<String>) -> Self {
        Self {
            redis,
            key_prefix: key_prefix.into(),
        }
    }

    fn key(&self, session_id: &str) -> String {
        format!("{}{}", self.key_prefix, session_id)
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn lookup_session(
        &self,
        session_id: &str,
    ) -> Result<Option<SessionRecord>, SessionStoreError> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;
        let raw: Option<String> = conn.get(self.key(session_id)).await?;

        let Some(raw) = raw else {
            return Ok(None);
        };

        match serde_json::from_str::<Value>(&raw) {
            Ok(doc) => Ok(SessionRecord::from_session_json(&doc)),
            Err(e) => {
                tracing::warn!(error = %e, "unparseable session document");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_user_id_field() {
        let doc = json!({
            "cookie": {"originalMaxAge": 86400000, "expires": "2030-01-01T00:00:00.000Z"},
            "userId": 12
        });
        let record = SessionRecord::from_session_json(&doc).unwrap();
        assert_eq!(record.user_id, 12);
        assert_eq!(
            record.expires_at.unwrap().to_rfc3339(),
            "2030-01-01T00:00:00+00:00"
        );
    }

    #[test]
    fn test_passport_user_fallback() {
        let doc = json!({"cookie": {}, "passport": {"user": "33"}});
        let record = SessionRecord::from_session_json(&doc).unwrap();
        assert_eq!(record.user_id, 33);
        assert_eq!(record.expires_at, None);
    }

    #[test]
    fn test_anonymous_session_has_no_record() {
        let doc = json!({"cookie": {"expires": null}});
        assert_eq!(SessionRecord::from_session_json(&doc), None);
    }

    #[test]
    fn test_expiry_check() {
        let now = Utc::now();
        let record = SessionRecord {
            user_id: 1,
            expires_at: Some(now - chrono::Duration::seconds(1)),
        };
        assert!(record.is_expired_at(now));
        assert!(!SessionRecord {
            user_id: 1,
            expires_at: None
        }
        .is_expired_at(now));
    }
}
