//! Cookie-based authentication for real-time connections.
//!
//! Reuses the HTTP layer's signed session cookie so clients need no separate
//! real-time login. Cookie values look like `s:<sid>.<sig>` (URL-encoded),
//! where `sig` is unpadded base64 of HMAC-SHA256 over `<sid>`.

use super::session_store::SessionStore;
use crate::error::AuthError;
use crate::models::UserId;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine as _;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;

type HmacSha256 = Hmac<Sha256>;

const SIGNED_PREFIX: &str = "s:";

#[derive(Clone)]
pub struct SessionAuthenticator {
    cookie_name: String,
    secrets: Vec<Vec<u8>>,
    store: Arc<dyn SessionStore>,
}

impl SessionAuthenticator {
    pub fn new(
        cookie_name: impl Into<String>,
        secrets: &[String],
        store: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            cookie_name: cookie_name.into(),
            secrets: secrets.iter().map(|s| s.as_bytes().to_vec()).collect(),
            store,
        }
    }

    /// Resolve the user behind a raw `Cookie` header. Read-only.
    pub async fn authenticate(&self, cookie_header: Option<&str>) -> Result<UserId, AuthError> {
        let raw = cookie_header
            .and_then(|header| find_cookie(header, &self.cookie_name))
            .ok_or(AuthError::Missing)?;

        let session_id = self.unsign(raw)?;

        let record = self
            .store
            .lookup_session(&session_id)
            .await?
            .ok_or(AuthError::NotFound)?;

        if record.is_expired_at(Utc::now()) {
            return Err(AuthError::Expired);
        }

        Ok(record.user_id)
    }

    /// Verify the signature and return the bare session id.
    pub fn unsign(&self, raw_value: &str) -> Result<String, AuthError> {
        let decoded = urlencoding::decode(raw_value).map_err(|_| AuthError::Invalid)?;
        let signed = decoded
            .strip_prefix(SIGNED_PREFIX)
            .ok_or(AuthError::Invalid)?;
        let (session_id, signature) = signed.rsplit_once('.').ok_or(AuthError::Invalid)?;
        if session_id.is_empty() {
            return Err(AuthError::Invalid);
        }

        let signature = STANDARD_NO_PAD
            .decode(signature.trim_end_matches('='))
            .or_else(|_| STANDARD.decode(signature))
            .map_err(|_| AuthError::Invalid)?;

        let verified = self.secrets.iter().any(|secret| {
            HmacSha256::new_from_slice(secret)
                .map(|mut mac| {
                    mac.update(session_id.as_bytes());
                    mac.verify_slice(&signature).is_ok()
                })
                .unwrap_or(false)
        });

        if verified {
            Ok(session_id.to_string())
        } else {
            Err(AuthError::Invalid)
        }
    }

    /// Produce a cookie value the way the HTTP layer does, using the current secret.
    pub fn sign(&self, session_id: &str) -> Option<String> {
        let secret = self.secrets.first()?;
        let mut mac = HmacSha256::new_from_slice(secret).ok()?;
        mac.update(session_id.as_bytes());
        let signature = STANDARD_NO_PAD.encode(mac.finalize().into_bytes());
        Some(urlencoding::encode(&format!("{SIGNED_PREFIX}{session_id}.{signature}")).into_owned())
    }
}

fn find_cookie<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| value.trim().trim_matches('"'))
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::memory::InMemorySessionStore;
    use crate::services::session_store::SessionRecord;

    fn authenticator(store: Arc<InMemorySessionStore>) -> SessionAuthenticator {
        SessionAuthenticator::new(
            "connect.sid",
            &["current-secret".to_string(), "old-secret".to_string()],
            store,
        )
    }

    fn live(user_id: UserId) -> SessionRecord {
        SessionRecord {
            user_id,
            expires_at: Some(Utc::now() + chrono::Duration::hours(1)),
        }
    }

    #[tokio::test]
    async fn test_valid_cookie_resolves_user() {
        let store = Arc::new(InMemorySessionStore::new());
        store.insert("abc123", live(42));
        let auth = authenticator(store);

        let cookie = format!("theme=dark; connect.sid={}", auth.sign("abc123").unwrap());
        assert_eq!(auth.authenticate(Some(&cookie)).await, Ok(42));
    }

    #[tokio::test]
    async fn test_rotated_secret_still_verifies() {
        let store = Arc::new(InMemorySessionStore::new());
        store.insert("sid-old", live(7));
        let old = SessionAuthenticator::new(
            "connect.sid",
            &["old-secret".to_string()],
            store.clone(),
        );
        let cookie = format!("connect.sid={}", old.sign("sid-old").unwrap());

        assert_eq!(authenticator(store).authenticate(Some(&cookie)).await, Ok(7));
    }

    #[tokio::test]
    async fn test_missing_cookie() {
        let auth = authenticator(Arc::new(InMemorySessionStore::new()));
        assert_eq!(auth.authenticate(None).await, Err(AuthError::Missing));
        assert_eq!(
            auth.authenticate(Some("other=1")).await,
            Err(AuthError::Missing)
        );
    }

    #[tokio::test]
    async fn test_tampered_signature_is_invalid() {
        let store = Arc::new(InMemorySessionStore::new());
        store.insert("abc123", live(42));
        let auth = authenticator(store);
        let forged = auth.sign("abc123").unwrap().replace("abc123", "abc124");

        assert_eq!(
            auth.authenticate(Some(&format!("connect.sid={forged}"))).await,
            Err(AuthError::Invalid)
        );
        assert_eq!(
            auth.authenticate(Some("connect.sid=abc123")).await,
            Err(AuthError::Invalid)
        );
    }

    #[tokio::test]
    async fn test_unknown_and_expired_sessions() {
        let store = Arc::new(InMemorySessionStore::new());
        store.insert(
            "stale",
            SessionRecord {
                user_id: 5,
                expires_at: Some(Utc::now() - chrono::Duration::minutes(1)),
            },
        );
        let auth = authenticator(store);

        let unknown = format!("connect.sid={}", auth.sign("nobody").unwrap());
        assert_eq!(
            auth.authenticate(Some(&unknown)).await,
            Err(AuthError::NotFound)
        );

        let stale = format!("connect.sid={}", auth.sign("stale").unwrap());
        assert_eq!(auth.authenticate(Some(&stale)).await, Err(AuthError::Expired));
    }

    #[tokio::test]
    async fn test_store_outage_is_reported() {
        let store = Arc::new(InMemorySessionStore::new());
        store.set_unavailable(true);
        let auth = authenticator(store);
        let cookie = format!("connect.sid={}", auth.sign("any").unwrap());

        assert!(matches!(
            auth.authenticate(Some(&cookie)).await,
            Err(AuthError::StoreUnavailable(_))
        ));
    }

    #[test]
    fn test_find_cookie() {
        assert_eq!(find_cookie("a=1; b=2", "b"), Some("2"));
        assert_eq!(find_cookie("a=1;b=\"q\"", "b"), Some("q"));
        assert_eq!(find_cookie("a=1", "b"), None);
        assert_eq!(find_cookie("b=", "b"), None);
    }
}
