//! Picture records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Category, Page};

/// A stored image occupying one slot
///
/// `id`, `page`, `category` and `slot_number` never change after creation;
/// replacement only touches `asset_url` and `updated_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Picture {
    pub id: Uuid,
    pub page: Page,
    pub category: Option<Category>,
    pub slot_number: u32,
    /// Opaque reference returned by the blob store
    pub asset_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Picture {
    /// Human-readable slot label, e.g. `gallery/education/3`
    pub fn slot_label(&self) -> String {
        match self.category {
            Some(category) => format!("{}/{}/{}", self.page, category, self.slot_number),
            None => format!("{}/{}", self.page, self.slot_number),
        }
    }
}
