//! User directory and block endpoints.

use axum::{
    extract::{Path, State},
    Json,
};

use super::{created, error, parse_id, success, ApiResult};
use crate::auth::CurrentUser;
use crate::errors::AppError;
use crate::models::{CreateUserRequest, MutewordsData, User};
use crate::AppState;

/// POST /api/users - Register a user.
pub async fn create_user(
    State(state): State<AppState>,
    Json(request): Json<CreateUserRequest>,
) -> ApiResult<User> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.create_user(&request).await {
        Ok(user) => {
            tracing::info!(user_id = %user.id, username = %user.username, "User registered");
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            created(user, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/users/whoami - The acting user.
pub async fn whoami(State(state): State<AppState>, CurrentUser(user): CurrentUser) -> ApiResult<User> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);
    success(user, revision_id)
}

/// GET /api/users/find/{username} - Look up a user by username.
pub async fn find_user(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(username): Path<String>,
) -> ApiResult<User> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);
    let name = username.trim().trim_start_matches('@');

    match state.repo.find_user_by_username(name).await {
        Ok(Some(user)) => success(user, revision_id),
        Ok(None) => error(
            AppError::NotFound(format!("User {} not found", name)),
            revision_id,
        ),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/users/{user_id}/block - Block a user.
pub async fn block_user(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(target): Path<String>,
) -> ApiResult<User> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let result = async {
        let target_id = parse_id("User", &target)?;
        if target_id == user.id {
            return Err(AppError::BadRequest("You cannot block yourself".to_string()));
        }
        let blocked = state
            .repo
            .get_user(target_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", target_id)))?;
        state.repo.add_block(user.id, target_id).await?;
        tracing::info!(user_id = %user.id, blocked_id = %target_id, "User blocked");
        Ok(blocked)
    }
    .await;

    match result {
        Ok(blocked) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            created(blocked, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/users/{user_id}/unblock - Remove a block.
pub async fn unblock_user(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(target): Path<String>,
) -> ApiResult<User> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let result = async {
        let target_id = parse_id("User", &target)?;
        let unblocked = state
            .repo
            .get_user(target_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", target_id)))?;
        state.repo.remove_block(user.id, target_id).await?;
        tracing::info!(user_id = %user.id, blocked_id = %target_id, "User unblocked");
        Ok::<_, AppError>(unblocked)
    }
    .await;

    match result {
        Ok(unblocked) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(unblocked, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// PUT /api/users/mutewords - Replace the caller's mutewords.
pub async fn set_mutewords(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<MutewordsData>,
) -> ApiResult<MutewordsData> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.set_mutewords(user.id, &request.mutewords).await {
        Ok(mutewords) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(MutewordsData { mutewords }, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}
