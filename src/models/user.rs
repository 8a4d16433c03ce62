use serde::{Deserialize, Serialize};

/// User identity issued by the identity collaborator.
pub type UserId = i64;

/// Sender metadata attached to live message pushes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDisplayInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_ref: Option<String>,
}
