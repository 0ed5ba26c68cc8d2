//! Page catalog: per-page slot capacity and category policy
//!
//! The catalog is built once at startup and shared read-only. It is also
//! the only way to obtain a [`SlotSpace`] or [`SlotAddress`], so every value
//! of those types already satisfies the capacity and category invariants.

use serde::Serialize;
use std::fmt;

use super::{Category, Page};
use crate::error::{MediaError, MediaResult};

/// Version of the built-in page table
pub const CATALOG_VERSION: u32 = 1;

/// Slot policy of one image-bearing page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageDefinition {
    pub page: Page,
    /// `None` means unbounded (scrolling gallery)
    pub max_slots: Option<u32>,
    pub uses_categories: bool,
}

impl PageDefinition {
    pub const fn bounded(page: Page, max_slots: u32) -> Self {
        Self {
            page,
            max_slots: Some(max_slots),
            uses_categories: false,
        }
    }

    pub const fn unbounded_categorised(page: Page) -> Self {
        Self {
            page,
            max_slots: None,
            uses_categories: true,
        }
    }

    /// True when `slot_number` fits the page's capacity
    pub fn admits(&self, slot_number: u32) -> bool {
        slot_number >= 1 && self.max_slots.map_or(true, |max| slot_number <= max)
    }
}

/// A validated `(page, category?)` slot numbering space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SlotSpace {
    page: Page,
    category: Option<Category>,
}

impl SlotSpace {
    pub fn page(&self) -> Page {
        self.page
    }

    pub fn category(&self) -> Option<Category> {
        self.category
    }
}

impl fmt::Display for SlotSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.category {
            Some(category) => write!(f, "{}/{}", self.page, category),
            None => write!(f, "{}", self.page),
        }
    }
}

/// A validated `(page, category?, slot_number)` tuple
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SlotAddress {
    page: Page,
    category: Option<Category>,
    slot_number: u32,
}

impl SlotAddress {
    pub fn page(&self) -> Page {
        self.page
    }

    pub fn category(&self) -> Option<Category> {
        self.category
    }

    pub fn slot_number(&self) -> u32 {
        self.slot_number
    }

    pub fn space(&self) -> SlotSpace {
        SlotSpace {
            page: self.page,
            category: self.category,
        }
    }
}

impl fmt::Display for SlotAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.space(), self.slot_number)
    }
}

/// Static lookup table of image-bearing pages
#[derive(Debug, Clone)]
pub struct PageCatalog {
    version: u32,
    definitions: Vec<PageDefinition>,
    categories: Vec<Category>,
}

impl PageCatalog {
    /// The site's page table
    pub fn builtin() -> Self {
        Self {
            version: CATALOG_VERSION,
            definitions: vec![
                PageDefinition::bounded(Page::Home, 5),
                PageDefinition::bounded(Page::About, 4),
                PageDefinition::bounded(Page::Programs, 6),
                PageDefinition::bounded(Page::GetInvolved, 3),
                PageDefinition::unbounded_categorised(Page::Gallery),
            ],
            categories: Category::ALL.to_vec(),
        }
    }

    /// Custom table, mainly for tests
    ///
    /// Rejects zero capacities, duplicate pages, and categorised pages
    /// without any category to choose from.
    pub fn from_definitions(
        version: u32,
        definitions: Vec<PageDefinition>,
        categories: Vec<Category>,
    ) -> MediaResult<Self> {
        for (i, def) in definitions.iter().enumerate() {
            if def.max_slots == Some(0) {
                return Err(MediaError::Validation(format!(
                    "Page '{}' must allow at least one slot",
                    def.page
                )));
            }
            if definitions[..i].iter().any(|d| d.page == def.page) {
                return Err(MediaError::Validation(format!(
                    "Page '{}' defined twice",
                    def.page
                )));
            }
            if def.uses_categories && categories.is_empty() {
                return Err(MediaError::Validation(format!(
                    "Page '{}' uses categories but none are defined",
                    def.page
                )));
            }
        }

        Ok(Self {
            version,
            definitions,
            categories,
        })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn definition_for(&self, page: Page) -> MediaResult<&PageDefinition> {
        self.definitions
            .iter()
            .find(|d| d.page == page)
            .ok_or_else(|| {
                MediaError::Validation(format!("Page '{}' does not accept images", page))
            })
    }

    pub fn accepts_images(&self, page: Page) -> bool {
        self.definitions.iter().any(|d| d.page == page)
    }

    pub fn image_pages(&self) -> &[PageDefinition] {
        &self.definitions
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// Validate `(page, category?)` against category consistency
    pub fn slot_space(&self, page: Page, category: Option<Category>) -> MediaResult<SlotSpace> {
        let def = self.definition_for(page)?;

        match (def.uses_categories, category) {
            (true, None) => Err(MediaError::Validation(format!(
                "Page '{}' requires a category",
                page
            ))),
            (false, Some(category)) => Err(MediaError::Validation(format!(
                "Page '{}' does not use categories (got '{}')",
                page, category
            ))),
            (true, Some(category)) if !self.categories.contains(&category) => {
                Err(MediaError::Validation(format!(
                    "Category '{}' is not offered for page '{}'",
                    category, page
                )))
            }
            _ => Ok(SlotSpace { page, category }),
        }
    }

    /// Validate a full slot address
    ///
    /// `slot_number` is taken signed so that zero and negative input from
    /// callers surfaces as a validation error rather than a parse failure.
    pub fn slot_address(
        &self,
        page: Page,
        category: Option<Category>,
        slot_number: i64,
    ) -> MediaResult<SlotAddress> {
        let space = self.slot_space(page, category)?;
        self.address_in(&space, slot_number)
    }

    /// Validate a slot number inside an already validated space
    pub fn address_in(&self, space: &SlotSpace, slot_number: i64) -> MediaResult<SlotAddress> {
        if slot_number < 1 {
            return Err(MediaError::Validation(format!(
                "Slot number must be a positive integer (got {})",
                slot_number
            )));
        }

        let def = self.definition_for(space.page)?;
        if let Some(max_slots) = def.max_slots {
            if slot_number > i64::from(max_slots) {
                return Err(MediaError::CapacityExceeded {
                    page: space.page,
                    requested: slot_number,
                    max_slots,
                });
            }
        }

        let slot_number = u32::try_from(slot_number).map_err(|_| {
            MediaError::Validation(format!("Slot number {} is out of range", slot_number))
        })?;

        Ok(SlotAddress {
            page: space.page,
            category: space.category,
            slot_number,
        })
    }
}

impl Default for PageCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
