//! Slot resolver
//!
//! Suggests the next slot number for a `(page, category?)` space: one past
//! the highest occupied slot, capped at the page capacity. Gaps left by
//! deleted pictures are not reused. A full page yields its last slot,
//! which then routes through the replacement protocol.

use serde::Serialize;
use std::sync::Arc;

use crate::db::PictureStore;
use crate::error::MediaResult;
use crate::models::{Category, Page, PageCatalog, PageDefinition, SlotSpace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SlotSuggestion {
    pub slot_number: u32,
    /// `max_occupied + 1` exceeded the page capacity
    pub clamped: bool,
}

/// Candidate slot after `max_occupied`
pub fn candidate_slot(max_occupied: u32, definition: &PageDefinition) -> SlotSuggestion {
    let next = max_occupied.saturating_add(1);
    match definition.max_slots {
        Some(max_slots) if next > max_slots => SlotSuggestion {
            slot_number: max_slots,
            clamped: true,
        },
        _ => SlotSuggestion {
            slot_number: next,
            clamped: false,
        },
    }
}

#[derive(Clone)]
pub struct SlotResolver {
    store: PictureStore,
    catalog: Arc<PageCatalog>,
}

impl SlotResolver {
    pub fn new(store: PictureStore, catalog: Arc<PageCatalog>) -> Self {
        Self { store, catalog }
    }

    /// Suggestion inside an already validated space. Read-only.
    pub async fn suggest(&self, space: &SlotSpace) -> MediaResult<SlotSuggestion> {
        let definition = self.catalog.definition_for(space.page())?;
        let max_occupied = self.store.max_occupied_slot(space).await?;
        let suggestion = candidate_slot(max_occupied, definition);

        tracing::debug!(
            space = %space,
            max_occupied,
            slot_number = suggestion.slot_number,
            clamped = suggestion.clamped,
            "Resolved next slot"
        );
        Ok(suggestion)
    }

    pub async fn next_available_slot(
        &self,
        page: Page,
        category: Option<Category>,
    ) -> MediaResult<u32> {
        let space = self.catalog.slot_space(page, category)?;
        Ok(self.suggest(&space).await?.slot_number)
    }
}
