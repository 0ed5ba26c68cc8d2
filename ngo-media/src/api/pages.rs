//! Page catalog endpoint

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::models::{Category, Page, PageDefinition};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct CatalogResponse {
    pub version: u32,
    pub pages: Vec<PageDefinition>,
    pub categories: Vec<Category>,
    /// Pages that exist on the site but take no images
    pub non_image_pages: Vec<Page>,
}

/// GET /api/pages
pub async fn get_catalog(State(state): State<AppState>) -> Json<CatalogResponse> {
    let catalog = &state.catalog;

    Json(CatalogResponse {
        version: catalog.version(),
        pages: catalog.image_pages().to_vec(),
        categories: catalog.categories().to_vec(),
        non_image_pages: Page::ALL
            .iter()
            .copied()
            .filter(|p| !catalog.accepts_images(*p))
            .collect(),
    })
}

pub fn page_routes() -> Router<AppState> {
    Router::new().route("/api/pages", get(get_catalog))
}
