//! Database access for ngo-media
//!
//! Schema creation and migrations live in `ngo_common::db`; this module
//! holds the media-specific queries.

pub mod pictures;

pub use pictures::PictureStore;

use ngo_common::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Open (or create) the shared database and apply migrations
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    let pool = ngo_common::db::init_database(db_path).await?;
    tracing::info!("Database ready: {}", db_path.display());
    Ok(pool)
}
