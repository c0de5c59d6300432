//! Membership state machine.
//!
//! Every fez lives in its own `Mutex` cell. A mutating operation takes that
//! cell's lock, runs its block and capacity checks, builds the next
//! roster/waitlist value on a clone, and hands the guard to [`commit`], which
//! persists the clone and swaps it in on a spawned task. A request cancelled
//! mid-flight therefore either leaves the fez untouched or completes the whole
//! transition. Creation inserts the stored row and the new cell on a spawned
//! task for the same reason. No operation holds more than one cell lock.
//!
//! [`commit`]: MembershipEngine::commit

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

use super::{BlockRegistry, Fez, JoinOutcome, NewFez, Release};
use crate::db::Repository;
use crate::errors::AppError;
use crate::models::FezPost;

type FezCell = Arc<Mutex<Fez>>;

/// Owns all live fez state.
pub struct MembershipEngine {
    repo: Arc<Repository>,
    blocks: Arc<dyn BlockRegistry>,
    cells: Arc<RwLock<HashMap<Uuid, FezCell>>>,
}

fn fez_not_found(fez_id: Uuid) -> AppError {
    AppError::NotFound(format!("Fez {} not found", fez_id))
}

fn user_not_found(user_id: Uuid) -> AppError {
    AppError::NotFound(format!("User {} not found", user_id))
}

fn participants_fixed() -> AppError {
    AppError::BadRequest("Participants of a private fez cannot be changed".to_string())
}

impl MembershipEngine {
    pub fn new(repo: Arc<Repository>, blocks: Arc<dyn BlockRegistry>) -> Self {
        Self {
            repo,
            blocks,
            cells: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Load every stored fez into memory. Returns the number loaded.
    pub async fn load(&self) -> Result<usize, AppError> {
        let fezzes = self.repo.list_fezzes().await?;
        let mut cells = self.cells.write().await;
        for fez in fezzes {
            cells.insert(fez.id, Arc::new(Mutex::new(fez)));
        }
        Ok(cells.len())
    }

    /// Current state of one fez, without visibility checks.
    pub async fn get(&self, fez_id: Uuid) -> Result<Fez, AppError> {
        let cell = self.cell(fez_id).await?;
        let fez = cell.lock().await;
        Ok(fez.clone())
    }

    /// Consistent copy of every fez. Each cell is locked in turn, never two at once.
    pub async fn all(&self) -> Vec<Fez> {
        let cells: Vec<FezCell> = self.cells.read().await.values().cloned().collect();
        let mut fezzes = Vec::with_capacity(cells.len());
        for cell in cells {
            fezzes.push(cell.lock().await.clone());
        }
        fezzes
    }

    /// Create a fez with the owner in seat 0.
    ///
    /// For a private (closed) fez the roster is the owner plus the requested
    /// participants. Participants who are block-related to the owner are
    /// dropped silently.
    pub async fn create(&self, owner_id: Uuid, mut draft: NewFez) -> Result<Fez, AppError> {
        if !draft.participants.is_empty() {
            let known = self.repo.usernames(&draft.participants).await?;
            if let Some(missing) = draft.participants.iter().find(|id| !known.contains_key(id)) {
                return Err(AppError::Validation(format!(
                    "Unknown participant {}",
                    missing
                )));
            }
            let block_set = self.blocks.block_set(owner_id).await?;
            draft.participants.retain(|id| !block_set.contains(id));
        }

        let fez = Fez::new(owner_id, draft);
        let repo = Arc::clone(&self.repo);
        let cells = Arc::clone(&self.cells);
        let fez = tokio::spawn(async move {
            repo.insert_fez(&fez).await?;
            cells
                .write()
                .await
                .insert(fez.id, Arc::new(Mutex::new(fez.clone())));
            Ok::<Fez, AppError>(fez)
        })
        .await
        .map_err(|e| AppError::Internal(format!("Fez creation aborted: {}", e)))??;

        tracing::info!(
            fez_id = %fez.id,
            owner_id = %owner_id,
            fez_type = fez.fez_type.as_str(),
            seats = fez.roster.len(),
            "Fez created"
        );
        Ok(fez)
    }

    /// Self-join: take a free seat, or queue on the waitlist when full.
    pub async fn join(&self, fez_id: Uuid, user_id: Uuid) -> Result<Fez, AppError> {
        let guard = self.cell(fez_id).await?.lock_owned().await;

        let block_set = self.blocks.block_set(user_id).await?;
        if !guard.is_visible_to(user_id, &block_set) || guard.seats_anyone_in(&block_set) {
            tracing::debug!(fez_id = %fez_id, user_id = %user_id, "Join masked as not found");
            return Err(fez_not_found(fez_id));
        }
        if guard.is_closed() {
            return Err(participants_fixed());
        }
        if guard.is_participant(user_id) {
            return Err(AppError::AlreadyMember(
                "User is already a member of this fez".to_string(),
            ));
        }
        if guard.waitlist.contains(user_id) {
            return Err(AppError::AlreadyMember(
                "User is already on the waitlist".to_string(),
            ));
        }

        let mut next = guard.clone();
        let outcome = next.seat_or_enqueue(user_id);
        let fez = self.commit(guard, next).await?;

        match outcome {
            JoinOutcome::Seated(position) => {
                tracing::info!(fez_id = %fez_id, user_id = %user_id, position, "Joined fez")
            }
            JoinOutcome::Waitlisted(position) => {
                tracing::info!(fez_id = %fez_id, user_id = %user_id, position, "Waitlisted for fez")
            }
        }
        Ok(fez)
    }

    /// Leave a seat, promoting the head of the waitlist into it.
    pub async fn unjoin(&self, fez_id: Uuid, user_id: Uuid) -> Result<Fez, AppError> {
        let guard = self.cell(fez_id).await?.lock_owned().await;

        if !guard.is_participant(user_id) {
            return Err(fez_not_found(fez_id));
        }
        if guard.is_closed() {
            return Err(participants_fixed());
        }

        let mut next = guard.clone();
        let release = next.release(user_id);
        let fez = self.commit(guard, next).await?;

        log_release(fez_id, user_id, release);
        Ok(fez)
    }

    /// Owner seats another user. Never waitlists.
    pub async fn owner_add(
        &self,
        fez_id: Uuid,
        acting_user_id: Uuid,
        target_user_id: Uuid,
    ) -> Result<Fez, AppError> {
        let guard = self.cell(fez_id).await?.lock_owned().await;
        self.ensure_owner(&guard, acting_user_id).await?;

        if self.repo.get_user(target_user_id).await?.is_none()
            || self.blocks.is_blocked(guard.owner_id, target_user_id).await?
        {
            return Err(user_not_found(target_user_id));
        }
        if guard.is_participant(target_user_id) {
            return Err(AppError::AlreadyMember(
                "User is already a member of this fez".to_string(),
            ));
        }

        let mut next = guard.clone();
        let position = next
            .seat(target_user_id)
            .ok_or_else(|| AppError::Full("Fez is full".to_string()))?;
        let fez = self.commit(guard, next).await?;

        tracing::info!(
            fez_id = %fez_id,
            owner_id = %acting_user_id,
            user_id = %target_user_id,
            position,
            "Owner added user to fez"
        );
        Ok(fez)
    }

    /// Owner frees another user's seat.
    pub async fn owner_remove(
        &self,
        fez_id: Uuid,
        acting_user_id: Uuid,
        target_user_id: Uuid,
    ) -> Result<Fez, AppError> {
        let guard = self.cell(fez_id).await?.lock_owned().await;
        self.ensure_owner(&guard, acting_user_id).await?;

        if target_user_id == guard.owner_id {
            return Err(AppError::BadRequest(
                "Owners leave their own fez via unjoin".to_string(),
            ));
        }
        if !guard.is_participant(target_user_id) {
            return Err(AppError::NotAMember(
                "User is not a member of this fez".to_string(),
            ));
        }

        let mut next = guard.clone();
        let release = next.release(target_user_id);
        let fez = self.commit(guard, next).await?;

        log_release(fez_id, target_user_id, release);
        Ok(fez)
    }

    /// Store a post by a seated member. Membership is checked under the cell lock.
    pub async fn post(
        &self,
        fez_id: Uuid,
        author_id: Uuid,
        text: &str,
    ) -> Result<FezPost, AppError> {
        let guard = self.cell(fez_id).await?.lock_owned().await;
        if !guard.is_participant(author_id) {
            return Err(AppError::Forbidden("Only fez members can post".to_string()));
        }
        self.repo.create_post(fez_id, author_id, text).await
    }

    async fn cell(&self, fez_id: Uuid) -> Result<FezCell, AppError> {
        self.cells
            .read()
            .await
            .get(&fez_id)
            .cloned()
            .ok_or_else(|| fez_not_found(fez_id))
    }

    /// Owner-only gate. Non-owners who are block-related to the owner see 404, others 403.
    async fn ensure_owner(&self, fez: &Fez, acting_user_id: Uuid) -> Result<(), AppError> {
        if fez.owner_id != acting_user_id {
            let block_set = self.blocks.block_set(acting_user_id).await?;
            if !fez.is_visible_to(acting_user_id, &block_set) {
                return Err(fez_not_found(fez.id));
            }
            return Err(AppError::Forbidden(
                "Only the fez owner can modify its members".to_string(),
            ));
        }
        if fez.is_closed() {
            return Err(participants_fixed());
        }
        Ok(())
    }

    /// Persist `next` and swap it into the cell as one unit.
    ///
    /// Runs on its own task holding the cell guard, so dropping the calling
    /// future cannot interrupt the store write and the in-memory swap halfway.
    async fn commit(&self, mut guard: OwnedMutexGuard<Fez>, mut next: Fez) -> Result<Fez, AppError> {
        next.updated_at = Utc::now();
        let repo = Arc::clone(&self.repo);

        tokio::spawn(async move {
            repo.save_membership(&next).await?;
            *guard = next.clone();
            Ok::<Fez, AppError>(next)
        })
        .await
        .map_err(|e| AppError::Internal(format!("Membership commit aborted: {}", e)))?
    }
}

fn log_release(fez_id: Uuid, user_id: Uuid, release: Option<Release>) {
    match release {
        Some(Release::Promoted {
            position,
            user_id: promoted,
        }) => tracing::info!(
            fez_id = %fez_id,
            user_id = %user_id,
            promoted = %promoted,
            position,
            "Seat released and waitlist promoted"
        ),
        Some(Release::Opened { position }) => tracing::info!(
            fez_id = %fez_id,
            user_id = %user_id,
            position,
            "Seat released"
        ),
        None => {}
    }
}
