//! Upload wizard endpoints
//!
//! The admin UI drives a server-side wizard: each call applies one input
//! and answers with the resulting view (state plus step indicators).
//! Commit and confirm answer once the upload and write have finished.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{ApiResult, MediaError, MediaResult};
use crate::models::{Category, Page};
use crate::services::{UploadFile, WizardView};
use crate::wizard::WizardInput;
use crate::AppState;

/// JSON command accepted by `POST /api/wizards/:id/input`
///
/// ```json
/// {"action": "choose_page", "page": "gallery"}
/// {"action": "enter_slot", "slot_number": 3}
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum WizardCommand {
    ChoosePage { page: String },
    ChooseCategory { category: String },
    SetAutoAssign { enabled: bool },
    EnterSlot { slot_number: i64 },
    Advance,
    Back,
    Commit,
    ConfirmReplacement,
    DeclineReplacement,
    Cancel,
}

impl WizardCommand {
    pub fn into_input(self) -> MediaResult<WizardInput> {
        Ok(match self {
            WizardCommand::ChoosePage { page } => WizardInput::ChoosePage(page.parse::<Page>()?),
            WizardCommand::ChooseCategory { category } => {
                WizardInput::ChooseCategory(category.parse::<Category>()?)
            }
            WizardCommand::SetAutoAssign { enabled } => WizardInput::SetAutoAssign(enabled),
            WizardCommand::EnterSlot { slot_number } => WizardInput::EnterSlot(slot_number),
            WizardCommand::Advance => WizardInput::Advance,
            WizardCommand::Back => WizardInput::Back,
            WizardCommand::Commit => WizardInput::Commit,
            WizardCommand::ConfirmReplacement => WizardInput::ConfirmReplacement,
            WizardCommand::DeclineReplacement => WizardInput::DeclineReplacement,
            WizardCommand::Cancel => WizardInput::Cancel,
        })
    }
}

/// POST /api/wizards
pub async fn start_wizard(State(state): State<AppState>) -> (StatusCode, Json<WizardView>) {
    (StatusCode::CREATED, Json(state.wizards.start().await))
}

/// GET /api/wizards/:id
pub async fn get_wizard(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<WizardView>> {
    Ok(Json(state.wizards.view(id).await?))
}

/// POST /api/wizards/:id/input
pub async fn wizard_input(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(command): Json<WizardCommand>,
) -> ApiResult<Json<WizardView>> {
    let input = command.into_input()?;
    Ok(Json(state.wizards.apply(id, input).await?))
}

#[derive(Debug, Deserialize)]
pub struct AttachQuery {
    pub file_name: String,
}

/// PUT /api/wizards/:id/file?file_name=
///
/// Raw file bytes in the body; the Content-Type header names the format.
pub async fn attach_file(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<AttachQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<WizardView>> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| MediaError::Validation("Content-Type header is required".to_string()))?;

    let file = UploadFile::new(query.file_name, content_type, body.to_vec());
    Ok(Json(state.wizards.attach_file(id, file).await?))
}

/// POST /api/wizards/:id/commit
pub async fn commit(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<WizardView>> {
    Ok(Json(state.wizards.apply(id, WizardInput::Commit).await?))
}

/// POST /api/wizards/:id/confirm
pub async fn confirm_replacement(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<WizardView>> {
    Ok(Json(
        state
            .wizards
            .apply(id, WizardInput::ConfirmReplacement)
            .await?,
    ))
}

/// POST /api/wizards/:id/decline
pub async fn decline_replacement(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<WizardView>> {
    Ok(Json(
        state
            .wizards
            .apply(id, WizardInput::DeclineReplacement)
            .await?,
    ))
}

/// DELETE /api/wizards/:id
pub async fn close_wizard(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.wizards.close(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn wizard_routes() -> Router<AppState> {
    Router::new()
        .route("/api/wizards", post(start_wizard))
        .route("/api/wizards/:id", get(get_wizard).delete(close_wizard))
        .route("/api/wizards/:id/input", post(wizard_input))
        .route("/api/wizards/:id/file", put(attach_file))
        .route("/api/wizards/:id/commit", post(commit))
        .route("/api/wizards/:id/confirm", post(confirm_replacement))
        .route("/api/wizards/:id/decline", post(decline_replacement))
}
