pub mod chat_store;
pub mod memory;
pub mod session_auth;
pub mod session_store;

pub use chat_store::{ChatStore, PgChatStore, UserDirectory};
pub use session_auth::SessionAuthenticator;
pub use session_store::{RedisSessionStore, SessionRecord, SessionStore};
