//! Read-only projections over all fezzes.

use std::cmp::Ordering;
use std::sync::Arc;

use uuid::Uuid;

use super::{BlockRegistry, Fez, MembershipEngine};
use crate::errors::AppError;
use crate::models::FezType;

/// Per-user listing views.
pub struct ListingService {
    engine: Arc<MembershipEngine>,
    blocks: Arc<dyn BlockRegistry>,
}

impl ListingService {
    pub fn new(engine: Arc<MembershipEngine>, blocks: Arc<dyn BlockRegistry>) -> Self {
        Self { engine, blocks }
    }

    /// Fezzes with a free seat whose owner is not block-related to the user.
    ///
    /// Ordered by start time; fezzes without a start time come last, then by
    /// creation time.
    pub async fn list_open(&self, user_id: Uuid) -> Result<Vec<Fez>, AppError> {
        let block_set = self.blocks.block_set(user_id).await?;
        let mut open: Vec<Fez> = self
            .engine
            .all()
            .await
            .into_iter()
            .filter(|fez| fez.is_open() && fez.is_visible_to(user_id, &block_set))
            .collect();
        open.sort_by(by_start_time);
        Ok(open)
    }

    /// Fezzes where the user holds a seat. Waitlist entries do not count.
    pub async fn list_joined(&self, user_id: Uuid) -> Vec<Fez> {
        let mut joined: Vec<Fez> = self
            .engine
            .all()
            .await
            .into_iter()
            .filter(|fez| fez.is_participant(user_id))
            .collect();
        joined.sort_by(by_start_time);
        joined
    }

    pub async fn list_owned(&self, user_id: Uuid) -> Vec<Fez> {
        let mut owned: Vec<Fez> = self
            .engine
            .all()
            .await
            .into_iter()
            .filter(|fez| fez.owner_id == user_id)
            .collect();
        owned.sort_by(by_start_time);
        owned
    }

    pub fn list_types(&self) -> Vec<&'static str> {
        FezType::ALL.iter().map(|t| t.as_str()).collect()
    }

    /// A single fez as `viewer` may see it. Hidden fezzes are reported as not found.
    pub async fn visible_fez(&self, fez_id: Uuid, viewer: Uuid) -> Result<Fez, AppError> {
        let fez = self.engine.get(fez_id).await?;
        let block_set = self.blocks.block_set(viewer).await?;
        if !fez.is_visible_to(viewer, &block_set) {
            return Err(AppError::NotFound(format!("Fez {} not found", fez_id)));
        }
        Ok(fez)
    }

    /// The fezzes among `ids` that `viewer` may see, in the given order.
    ///
    /// Unknown, private and hidden fezzes are skipped.
    pub async fn visible_fezzes(&self, ids: &[Uuid], viewer: Uuid) -> Result<Vec<Fez>, AppError> {
        let block_set = self.blocks.block_set(viewer).await?;
        let mut visible = Vec::with_capacity(ids.len());
        for id in ids {
            let Ok(fez) = self.engine.get(*id).await else {
                continue;
            };
            if !fez.is_closed() && fez.is_visible_to(viewer, &block_set) {
                visible.push(fez);
            }
        }
        Ok(visible)
    }
}

fn by_start_time(a: &Fez, b: &Fez) -> Ordering {
    let start = match (a.start_time, b.start_time) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    start
        .then(a.created_at.cmp(&b.created_at))
        .then(a.id.cmp(&b.id))
}
