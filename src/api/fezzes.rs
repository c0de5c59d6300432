//! Fez API endpoints.

use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{created, error, parse_id, success, ApiResult};
use crate::auth::CurrentUser;
use crate::errors::AppError;
use crate::fez::Fez;
use crate::filter::ContentFilterable;
use crate::models::{FezCreateRequest, FezData, FezDetailData, FezPostData};
use crate::AppState;

/// Resolve every referenced user and render one fez.
async fn render_fez(state: &AppState, fez: &Fez) -> Result<FezData, AppError> {
    let usernames = state.repo.usernames(&fez.referenced_users()).await?;
    Ok(FezData::render(fez, &usernames))
}

async fn render_fezzes(state: &AppState, fezzes: &[Fez]) -> Result<Vec<FezData>, AppError> {
    let mut ids: Vec<Uuid> = fezzes.iter().flat_map(Fez::referenced_users).collect();
    ids.sort();
    ids.dedup();
    let usernames = state.repo.usernames(&ids).await?;
    Ok(fezzes
        .iter()
        .map(|fez| FezData::render(fez, &usernames))
        .collect())
}

/// GET /api/fez/types - List the fez type tokens.
pub async fn list_types(
    State(state): State<AppState>,
    _user: CurrentUser,
) -> ApiResult<Vec<&'static str>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);
    success(state.listing.list_types(), revision_id)
}

/// POST /api/fez/create - Create a fez owned by the caller.
pub async fn create_fez(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<FezCreateRequest>,
) -> ApiResult<FezData> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let draft = match request.validate() {
        Ok(draft) => draft,
        Err(e) => return error(e, revision_id),
    };

    let result = async {
        let fez = state.engine.create(user.id, draft).await?;
        if let Err(e) = state.search.index_fez(&fez).await {
            tracing::warn!("Failed to index fez {}: {}", fez.id, e);
        }
        render_fez(&state, &fez).await
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

/// GET /api/fez/{id} - A fez with the posts the caller may see.
pub async fn get_fez(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<FezDetailData> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let result = async {
        let fez_id = parse_id("Fez", &id)?;
        let fez = state.listing.visible_fez(fez_id, user.id).await?;

        let block_set = state.repo.blocked_user_ids(user.id).await?;
        let mutewords = state.repo.get_mutewords(user.id).await?;
        let posts: Vec<_> = state
            .repo
            .list_posts(fez_id)
            .await?
            .into_iter()
            .filter(|post| !block_set.contains(&post.author_id))
            .filter_map(|post| post.filter_mutewords(Some(mutewords.as_slice())))
            .collect();

        let mut ids = fez.referenced_users();
        ids.extend(posts.iter().map(|p| p.author_id));
        let usernames = state.repo.usernames(&ids).await?;

        Ok::<_, AppError>(FezDetailData {
            fez: FezData::render(&fez, &usernames),
            posts: posts
                .iter()
                .map(|post| FezPostData::render(post, &usernames))
                .collect(),
        })
    }
    .await;

    match result {
        Ok(data) => success(data, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/fez/{id}/join - Join a fez, or its waitlist when full.
pub async fn join_fez(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<FezData> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let result = async {
        let fez_id = parse_id("Fez", &id)?;
        let fez = state.engine.join(fez_id, user.id).await?;
        render_fez(&state, &fez).await
    }
    .await;

    match result {
        Ok(data) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(data, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/fez/{id}/unjoin - Leave a fez.
pub async fn unjoin_fez(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<FezData> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let result = async {
        let fez_id = parse_id("Fez", &id)?;
        let fez = state.engine.unjoin(fez_id, user.id).await?;
        render_fez(&state, &fez).await
    }
    .await;

    match result {
        Ok(data) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(data, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/fez/{id}/user/{user_id}/add - Owner seats a user.
pub async fn add_member(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((id, target)): Path<(String, String)>,
) -> ApiResult<FezData> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let result = async {
        let fez_id = parse_id("Fez", &id)?;
        let target_id = parse_id("User", &target)?;
        let fez = state.engine.owner_add(fez_id, user.id, target_id).await?;
        render_fez(&state, &fez).await
    }
    .await;

    match result {
        Ok(data) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(data, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/fez/{id}/user/{user_id}/remove - Owner frees a user's seat.
pub async fn remove_member(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((id, target)): Path<(String, String)>,
) -> ApiResult<FezData> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let result = async {
        let fez_id = parse_id("Fez", &id)?;
        let target_id = parse_id("User", &target)?;
        let fez = state
            .engine
            .owner_remove(fez_id, user.id, target_id)
            .await?;
        render_fez(&state, &fez).await
    }
    .await;

    match result {
        Ok(data) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(data, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/fez/open - Fezzes with a free seat.
pub async fn list_open(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Vec<FezData>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let result = async {
        let fezzes = state.listing.list_open(user.id).await?;
        render_fezzes(&state, &fezzes).await
    }
    .await;

    match result {
        Ok(data) => success(data, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/fez/joined - Fezzes where the caller holds a seat.
pub async fn list_joined(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Vec<FezData>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);
    let fezzes = state.listing.list_joined(user.id).await;

    match render_fezzes(&state, &fezzes).await {
        Ok(data) => success(data, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/fez/owner - Fezzes the caller owns.
pub async fn list_owned(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Vec<FezData>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);
    let fezzes = state.listing.list_owned(user.id).await;

    match render_fezzes(&state, &fezzes).await {
        Ok(data) => success(data, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// Search query parameters.
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
    /// Maximum number of results (default: 20).
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    20
}

/// Maximum number of search results allowed.
const MAX_SEARCH_LIMIT: usize = 100;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub results: Vec<SearchResultItem>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResultItem {
    pub fez: FezData,
    pub score: f32,
}

/// GET /api/fez/search - Full-text search over fezzes the caller may see.
pub async fn search_fezzes(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(params): Query<SearchQuery>,
) -> ApiResult<SearchResponse> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);
    let limit = params.limit.min(MAX_SEARCH_LIMIT);

    let result = async {
        let hits = state.search.search(&params.q, limit, params.offset)?;
        let scores: HashMap<Uuid, f32> = hits.iter().map(|h| (h.fez_id, h.score)).collect();
        let ids: Vec<Uuid> = hits.iter().map(|h| h.fez_id).collect();

        let fezzes = state.listing.visible_fezzes(&ids, user.id).await?;
        let rendered = render_fezzes(&state, &fezzes).await?;
        Ok::<_, AppError>(
            rendered
                .into_iter()
                .map(|fez| SearchResultItem {
                    score: scores.get(&fez.fez_id).copied().unwrap_or_default(),
                    fez,
                })
                .collect::<Vec<_>>(),
        )
    }
    .await;

    match result {
        Ok(results) => {
            let total = results.len();
            success(
                SearchResponse {
                    results,
                    total,
                    limit,
                    offset: params.offset,
                },
                revision_id,
            )
        }
        Err(e) => error(e, revision_id),
    }
}
