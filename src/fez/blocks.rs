//! Block relationships as seen by the membership engine.

use std::collections::HashSet;

use async_trait::async_trait;
use uuid::Uuid;

use crate::db::Repository;
use crate::errors::AppError;

/// Read-only view of user block relationships.
///
/// Relationships are symmetric: if either user blocked the other, each is in
/// the other's block set.
#[async_trait]
pub trait BlockRegistry: Send + Sync {
    /// Users who block, or are blocked by, `user_id`.
    async fn block_set(&self, user_id: Uuid) -> Result<HashSet<Uuid>, AppError>;

    async fn is_blocked(&self, a: Uuid, b: Uuid) -> Result<bool, AppError> {
        Ok(self.block_set(a).await?.contains(&b))
    }
}

#[async_trait]
impl BlockRegistry for Repository {
    async fn block_set(&self, user_id: Uuid) -> Result<HashSet<Uuid>, AppError> {
        self.blocked_user_ids(user_id).await
    }
}
