pub mod message;
pub mod presence;
pub mod user;

pub use message::{ChatMessage, MessageCategory, MessageId, ReadMark, StoredMessage};
pub use presence::{PresenceEvent, PresenceState};
pub use user::{UserDisplayInfo, UserId};
