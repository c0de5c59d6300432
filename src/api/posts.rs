//! Fez discussion post endpoints.

use axum::{
    extract::{Path, State},
    Json,
};

use super::{created, error, parse_id, success, ApiResult};
use crate::auth::CurrentUser;
use crate::errors::AppError;
use crate::models::{CreatePostRequest, FezPostData};
use crate::AppState;

/// POST /api/fez/{id}/post - Post to a fez the caller is seated in.
pub async fn create_post(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    Json(request): Json<CreatePostRequest>,
) -> ApiResult<FezPostData> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let result = async {
        let fez_id = parse_id("Fez", &id)?;
        state.listing.visible_fez(fez_id, user.id).await?;
        let text = request.validated_text()?;

        let post = state.engine.post(fez_id, user.id, &text).await?;
        tracing::info!(fez_id = %fez_id, post_id = %post.id, author_id = %user.id, "Fez post created");

        let usernames = state.repo.usernames(&[user.id]).await?;
        Ok(FezPostData::render(&post, &usernames))
    }
    .await;

    match result {
        Ok(data) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            created(data, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/fez/post/{post_id}/delete - Delete one of the caller's posts.
pub async fn delete_post(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(post_id): Path<String>,
) -> ApiResult<()> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let result = async {
        let post_id = parse_id("Post", &post_id)?;
        let post = state
            .repo
            .get_post(post_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Post {} not found", post_id)))?;
        if post.author_id != user.id {
            return Err(AppError::Forbidden(
                "Only the author can delete a post".to_string(),
            ));
        }
        state.repo.delete_post(post_id).await
    }
    .await;

    match result {
        Ok(()) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success((), new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}
