//! Slot suggestion and occupancy endpoints
//!
//! Both are advisory reads; commits re-check on their own.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::parse_page_and_category;
use crate::error::{ApiResult, MediaError};
use crate::models::{Category, Page, Picture};
use crate::services::Occupancy;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct NextSlotQuery {
    pub page: String,
    pub category: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NextSlotResponse {
    pub page: Page,
    pub category: Option<Category>,
    pub slot_number: u32,
    /// The page is full and the suggestion is its last slot
    pub clamped: bool,
}

/// GET /api/slots/next?page=&category=
pub async fn next_slot(
    State(state): State<AppState>,
    Query(query): Query<NextSlotQuery>,
) -> ApiResult<Json<NextSlotResponse>> {
    let (page, category) = parse_page_and_category(&query.page, query.category.as_deref())?;
    let suggestion = state.orchestrator.suggest_slot(page, category).await?;

    Ok(Json(NextSlotResponse {
        page,
        category,
        slot_number: suggestion.slot_number,
        clamped: suggestion.clamped,
    }))
}

#[derive(Debug, Deserialize)]
pub struct CheckSlotQuery {
    pub page: String,
    /// Kept as text so malformed numbers get the usual error body
    pub slot: String,
    pub category: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckSlotResponse {
    pub page: Page,
    pub category: Option<Category>,
    pub slot_number: i64,
    pub occupied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existing: Option<Picture>,
}

/// GET /api/slots/check?page=&slot=&category=
pub async fn check_slot(
    State(state): State<AppState>,
    Query(query): Query<CheckSlotQuery>,
) -> ApiResult<Json<CheckSlotResponse>> {
    let (page, category) = parse_page_and_category(&query.page, query.category.as_deref())?;
    let slot_number: i64 = query.slot.trim().parse().map_err(|_| {
        MediaError::Validation(format!("Slot number must be an integer (got '{}')", query.slot))
    })?;

    let occupancy = state
        .orchestrator
        .check_slot(page, slot_number, category)
        .await?;

    let existing = match occupancy {
        Occupancy::Occupied { existing } => Some(existing),
        Occupancy::Free => None,
    };

    Ok(Json(CheckSlotResponse {
        page,
        category,
        slot_number,
        occupied: existing.is_some(),
        existing,
    }))
}

pub fn slot_routes() -> Router<AppState> {
    Router::new()
        .route("/api/slots/next", get(next_slot))
        .route("/api/slots/check", get(check_slot))
}
