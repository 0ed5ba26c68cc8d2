//! Occupancy checker
//!
//! Advisory "is this slot taken, and by whom" reads. Results shown while the
//! user is choosing a slot are never trusted for writes; commits re-check.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::db::PictureStore;
use crate::error::MediaResult;
use crate::models::{Category, Page, PageCatalog, Picture, SlotAddress};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Occupancy {
    Free,
    Occupied { existing: Picture },
}

impl Occupancy {
    pub fn is_occupied(&self) -> bool {
        matches!(self, Occupancy::Occupied { .. })
    }
}

#[derive(Clone)]
pub struct OccupancyChecker {
    store: PictureStore,
    catalog: Arc<PageCatalog>,
}

impl OccupancyChecker {
    pub fn new(store: PictureStore, catalog: Arc<PageCatalog>) -> Self {
        Self { store, catalog }
    }

    pub async fn is_occupied(&self, slot: &SlotAddress) -> MediaResult<Occupancy> {
        let existing = self
            .store
            .find_by_slot(&slot.space(), slot.slot_number())
            .await?;

        Ok(match existing {
            Some(existing) => Occupancy::Occupied { existing },
            None => Occupancy::Free,
        })
    }

    /// Validate raw input, then check the slot
    pub async fn check(
        &self,
        page: Page,
        slot_number: i64,
        category: Option<Category>,
    ) -> MediaResult<Occupancy> {
        let slot = self.catalog.slot_address(page, category, slot_number)?;
        self.is_occupied(&slot).await
    }
}

/// Latest-wins debounce for checks triggered by typing
///
/// Every keystroke takes a ticket; after the delay only the holder of the
/// newest ticket runs its check.
#[derive(Debug, Clone)]
pub struct CheckDebouncer {
    delay: Duration,
    latest: Arc<AtomicU64>,
}

impl CheckDebouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            latest: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn ticket(&self) -> u64 {
        self.latest.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Wait out the delay; true if `ticket` is still the newest
    pub async fn settle(&self, ticket: u64) -> bool {
        tokio::time::sleep(self.delay).await;
        self.latest.load(Ordering::SeqCst) == ticket
    }
}
