//! User directory models.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub created_at: String,
}

/// The `@username` form used in rosters and posts.
pub fn handle(username: &str) -> String {
    format!("@{}", username)
}

/// Request body for registering a user.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl CreateUserRequest {
    /// Trimmed username if it is 2-50 characters of `[A-Za-z0-9._-]`.
    pub fn normalized_username(&self) -> Option<String> {
        let name = self.username.trim().trim_start_matches('@');
        let valid_len = (2..=50).contains(&name.chars().count());
        let valid_chars = name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
        (valid_len && valid_chars).then(|| name.to_string())
    }
}

/// Request body for replacing a user's mutewords.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutewordsData {
    pub mutewords: Vec<String>,
}
