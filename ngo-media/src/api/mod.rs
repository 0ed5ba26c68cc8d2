//! HTTP API handlers for ngo-media
//!
//! JSON over HTTP for the admin UI, plus an SSE stream of media events.

pub mod health;
pub mod pages;
pub mod pictures;
pub mod slots;
pub mod sse;
pub mod wizards;

pub use health::health_routes;
pub use pages::page_routes;
pub use pictures::picture_routes;
pub use slots::slot_routes;
pub use sse::event_stream;
pub use wizards::wizard_routes;

use crate::error::MediaResult;
use crate::models::{Category, Page};

/// Parse the `page` / `category` pair used by several query strings
pub(crate) fn parse_page_and_category(
    page: &str,
    category: Option<&str>,
) -> MediaResult<(Page, Option<Category>)> {
    let page: Page = page.parse()?;
    let category = category
        .filter(|c| !c.trim().is_empty())
        .map(str::parse::<Category>)
        .transpose()?;
    Ok((page, category))
}
