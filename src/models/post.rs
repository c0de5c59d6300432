//! Fez discussion posts.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::handle;
use crate::errors::AppError;

/// Longest post body accepted, in characters.
pub const MAX_POST_LEN: usize = 2000;

/// A post in a fez's discussion thread.
#[derive(Debug, Clone)]
pub struct FezPost {
    pub id: Uuid,
    pub fez_id: Uuid,
    pub author_id: Uuid,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Request body for `POST /api/fez/{id}/post`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePostRequest {
    pub text: String,
}

impl CreatePostRequest {
    /// The trimmed post body, if it is non-empty and short enough.
    pub fn validated_text(&self) -> Result<String, AppError> {
        let text = self.text.trim();
        if text.is_empty() {
            return Err(AppError::Validation("Post text is required".to_string()));
        }
        if text.chars().count() > MAX_POST_LEN {
            return Err(AppError::Validation(format!(
                "Post text exceeds {} characters",
                MAX_POST_LEN
            )));
        }
        Ok(text.to_string())
    }
}

/// A post as rendered to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FezPostData {
    pub post_id: Uuid,
    pub fez_id: Uuid,
    pub author_id: Uuid,
    pub author: String,
    pub text: String,
    pub created_at: String,
}

impl FezPostData {
    pub fn render(post: &FezPost, usernames: &HashMap<Uuid, String>) -> Self {
        Self {
            post_id: post.id,
            fez_id: post.fez_id,
            author_id: post.author_id,
            author: usernames
                .get(&post.author_id)
                .map(|name| handle(name))
                .unwrap_or_else(|| handle(&post.author_id.to_string())),
            text: post.text.clone(),
            created_at: post.created_at.to_rfc3339(),
        }
    }
}
