//! Picture listing and deletion

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::models::{Category, Page, Picture};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<String>,
    pub category: Option<String>,
}

/// GET /api/pictures?page=&category=
pub async fn list_pictures(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<Picture>>> {
    let page = query
        .page
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .map(str::parse::<Page>)
        .transpose()?;
    let category = query
        .category
        .as_deref()
        .filter(|c| !c.trim().is_empty())
        .map(str::parse::<Category>)
        .transpose()?;

    Ok(Json(state.orchestrator.list_pictures(page, category).await?))
}

/// GET /api/pictures/:id
pub async fn get_picture(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Picture>> {
    Ok(Json(state.orchestrator.get_picture(id).await?))
}

/// DELETE /api/pictures/:id
///
/// Frees the slot; returns the deleted record.
pub async fn delete_picture(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Picture>> {
    Ok(Json(state.orchestrator.delete_picture(id).await?))
}

pub fn picture_routes() -> Router<AppState> {
    Router::new()
        .route("/api/pictures", get(list_pictures))
        .route("/api/pictures/:id", get(get_picture).delete(delete_picture))
}
