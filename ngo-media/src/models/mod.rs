//! Domain models for the media slot service

pub mod catalog;
pub mod page;
pub mod picture;

pub use catalog::{PageCatalog, PageDefinition, SlotAddress, SlotSpace, CATALOG_VERSION};
pub use page::{Category, Page};
pub use picture::Picture;
