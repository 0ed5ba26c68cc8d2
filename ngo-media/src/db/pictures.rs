//! Slot occupancy store
//!
//! Persistence boundary over Picture records. Slot uniqueness is enforced
//! by the `idx_pictures_slot` unique index, so `insert` is an atomic
//! compare-and-insert: of two concurrent inserts into one slot exactly one
//! succeeds and the other maps to [`MediaError::Conflict`].

use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use uuid::Uuid;

use crate::error::{MediaError, MediaResult};
use crate::models::{Category, Page, Picture, SlotAddress, SlotSpace};
use crate::utils::retry_on_lock;

const SELECT_BY_SLOT: &str = r#"
    SELECT id, page, category, slot_number, asset_url, created_at, updated_at
    FROM pictures
    WHERE page = ? AND IFNULL(category, '') = IFNULL(?, '') AND slot_number = ?
"#;

const SELECT_BY_ID: &str = r#"
    SELECT id, page, category, slot_number, asset_url, created_at, updated_at
    FROM pictures
    WHERE id = ?
"#;

const SELECT_FILTERED: &str = r#"
    SELECT id, page, category, slot_number, asset_url, created_at, updated_at
    FROM pictures
    WHERE (?1 IS NULL OR page = ?1)
      AND (?2 IS NULL OR category = ?2)
    ORDER BY page, IFNULL(category, ''), slot_number
"#;

/// SQLite-backed Picture store
#[derive(Clone)]
pub struct PictureStore {
    pool: SqlitePool,
    max_lock_wait_ms: u64,
}

impl PictureStore {
    pub fn new(pool: SqlitePool, max_lock_wait_ms: u64) -> Self {
        Self {
            pool,
            max_lock_wait_ms,
        }
    }

    pub async fn find_by_slot(
        &self,
        space: &SlotSpace,
        slot_number: u32,
    ) -> MediaResult<Option<Picture>> {
        let row = sqlx::query(SELECT_BY_SLOT)
            .bind(space.page().as_str())
            .bind(space.category().map(|c| c.as_str()))
            .bind(i64::from(slot_number))
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(row_to_picture).transpose()?)
    }

    /// Highest occupied slot number in `space`, 0 when empty
    pub async fn max_occupied_slot(&self, space: &SlotSpace) -> MediaResult<u32> {
        let max: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(MAX(slot_number), 0)
            FROM pictures
            WHERE page = ? AND IFNULL(category, '') = IFNULL(?, '')
            "#,
        )
        .bind(space.page().as_str())
        .bind(space.category().map(|c| c.as_str()))
        .fetch_one(&self.pool)
        .await?;

        u32::try_from(max).map_err(|_| {
            MediaError::Store(ngo_common::Error::InvalidInput(format!(
                "Stored slot number {} out of range for {}",
                max, space
            )))
        })
    }

    /// Create a Picture in `slot`
    ///
    /// Fails with [`MediaError::Conflict`] when the slot is taken at commit
    /// time.
    pub async fn insert(&self, slot: &SlotAddress, asset_url: &str) -> MediaResult<Picture> {
        let now = Utc::now();
        let picture = Picture {
            id: Uuid::new_v4(),
            page: slot.page(),
            category: slot.category(),
            slot_number: slot.slot_number(),
            asset_url: asset_url.to_string(),
            created_at: now,
            updated_at: now,
        };

        let id_str = picture.id.to_string();
        let id: &str = &id_str;
        let page = picture.page.as_str();
        let category = picture.category.map(|c| c.as_str());
        let slot_number = i64::from(picture.slot_number);
        let timestamp_str = now.to_rfc3339();
        let timestamp: &str = &timestamp_str;
        let pool = &self.pool;

        let result = retry_on_lock("picture insert", self.max_lock_wait_ms, || async move {
            sqlx::query(
                r#"
                INSERT INTO pictures (id, page, category, slot_number, asset_url, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(id)
            .bind(page)
            .bind(category)
            .bind(slot_number)
            .bind(asset_url)
            .bind(timestamp)
            .bind(timestamp)
            .execute(pool)
            .await?;
            Ok::<(), ngo_common::Error>(())
        })
        .await;

        match result {
            Ok(()) => {
                tracing::info!(
                    picture_id = %picture.id,
                    slot = %slot,
                    "Picture created"
                );
                Ok(picture)
            }
            Err(e) if e.is_unique_violation() => {
                tracing::warn!(slot = %slot, "Insert lost the race for slot");
                Err(MediaError::Conflict { slot: *slot })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Point an existing Picture at a new asset
    ///
    /// Only `asset_url` and `updated_at` change. Fails with
    /// [`MediaError::NotFound`] if `id` no longer exists.
    pub async fn replace_asset(&self, id: Uuid, new_asset_url: &str) -> MediaResult<Picture> {
        let id_str = id.to_string();
        let id_ref: &str = &id_str;
        let timestamp_str = Utc::now().to_rfc3339();
        let timestamp: &str = &timestamp_str;
        let pool = &self.pool;

        let replaced = retry_on_lock("picture replace", self.max_lock_wait_ms, || async move {
            let mut tx = pool.begin().await?;

            let result = sqlx::query("UPDATE pictures SET asset_url = ?, updated_at = ? WHERE id = ?")
                .bind(new_asset_url)
                .bind(timestamp)
                .bind(id_ref)
                .execute(&mut *tx)
                .await?;

            if result.rows_affected() == 0 {
                tx.rollback().await?;
                return Ok::<Option<Picture>, ngo_common::Error>(None);
            }

            let row = sqlx::query(SELECT_BY_ID)
                .bind(id_ref)
                .fetch_one(&mut *tx)
                .await?;
            let picture = row_to_picture(&row)?;

            tx.commit().await?;
            Ok(Some(picture))
        })
        .await?;

        match replaced {
            Some(picture) => {
                tracing::info!(
                    picture_id = %id,
                    slot = %picture.slot_label(),
                    "Picture asset replaced"
                );
                Ok(picture)
            }
            None => Err(MediaError::NotFound { id }),
        }
    }

    pub async fn get(&self, id: Uuid) -> MediaResult<Option<Picture>> {
        let row = sqlx::query(SELECT_BY_ID)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(row_to_picture).transpose()?)
    }

    /// Pictures ordered by page, category, slot; both filters optional
    pub async fn list(
        &self,
        page: Option<Page>,
        category: Option<Category>,
    ) -> MediaResult<Vec<Picture>> {
        let rows = sqlx::query(SELECT_FILTERED)
            .bind(page.map(|p| p.as_str()))
            .bind(category.map(|c| c.as_str()))
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| row_to_picture(row).map_err(MediaError::from))
            .collect()
    }

    /// Delete a Picture, freeing its slot; returns the removed record
    pub async fn delete(&self, id: Uuid) -> MediaResult<Picture> {
        let id_str = id.to_string();
        let id_ref: &str = &id_str;
        let pool = &self.pool;

        let deleted = retry_on_lock("picture delete", self.max_lock_wait_ms, || async move {
            let mut tx = pool.begin().await?;

            let row = sqlx::query(SELECT_BY_ID)
                .bind(id_ref)
                .fetch_optional(&mut *tx)
                .await?;
            let Some(row) = row else {
                tx.rollback().await?;
                return Ok::<Option<Picture>, ngo_common::Error>(None);
            };
            let picture = row_to_picture(&row)?;

            sqlx::query("DELETE FROM pictures WHERE id = ?")
                .bind(id_ref)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
            Ok(Some(picture))
        })
        .await?;

        match deleted {
            Some(picture) => {
                tracing::info!(picture_id = %id, slot = %picture.slot_label(), "Picture deleted");
                Ok(picture)
            }
            None => Err(MediaError::NotFound { id }),
        }
    }

    /// True while any Picture still references `asset_url`
    pub async fn asset_in_use(&self, asset_url: &str) -> MediaResult<bool> {
        let in_use: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM pictures WHERE asset_url = ?)")
                .bind(asset_url)
                .fetch_one(&self.pool)
                .await?;
        Ok(in_use)
    }
}

fn row_to_picture(row: &SqliteRow) -> ngo_common::Result<Picture> {
    let id: String = row.try_get("id")?;
    let id = Uuid::parse_str(&id)
        .map_err(|e| corrupt_row(&id, format!("id: {}", e)))?;

    let page: String = row.try_get("page")?;
    let page: Page = page
        .parse()
        .map_err(|e: MediaError| corrupt_row(&id.to_string(), e.to_string()))?;

    let category: Option<String> = row.try_get("category")?;
    let category: Option<Category> = category
        .map(|c| c.parse())
        .transpose()
        .map_err(|e: MediaError| corrupt_row(&id.to_string(), e.to_string()))?;

    let slot_number: i64 = row.try_get("slot_number")?;
    let slot_number = u32::try_from(slot_number)
        .map_err(|_| corrupt_row(&id.to_string(), format!("slot_number {}", slot_number)))?;

    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(Picture {
        id,
        page,
        category,
        slot_number,
        asset_url: row.try_get("asset_url")?,
        created_at: parse_timestamp(&id, "created_at", &created_at)?,
        updated_at: parse_timestamp(&id, "updated_at", &updated_at)?,
    })
}

fn parse_timestamp(id: &Uuid, column: &str, value: &str) -> ngo_common::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| corrupt_row(&id.to_string(), format!("{}: {}", column, e)))
}

fn corrupt_row(id: &str, detail: String) -> ngo_common::Error {
    ngo_common::Error::InvalidInput(format!("Corrupt picture row {}: {}", id, detail))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PageCatalog;
    use tempfile::TempDir;

    async fn test_store() -> (TempDir, PictureStore) {
        let temp_dir = TempDir::new().unwrap();
        let pool = ngo_common::db::init_database(&temp_dir.path().join("ngo-site.db"))
            .await
            .unwrap();
        (temp_dir, PictureStore::new(pool, 5000))
    }

    #[tokio::test]
    async fn test_insert_then_find_by_slot() {
        let (_dir, store) = test_store().await;
        let catalog = PageCatalog::builtin();
        let slot = catalog.slot_address(Page::Home, None, 2).unwrap();

        let created = store.insert(&slot, "/media/a.png").await.unwrap();
        let found = store.find_by_slot(&slot.space(), 2).await.unwrap();

        assert_eq!(found, Some(created.clone()));
        assert_eq!(created.slot_label(), "home/2");
        assert!(store.find_by_slot(&slot.space(), 3).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_max_occupied_slot_per_space() {
        let (_dir, store) = test_store().await;
        let catalog = PageCatalog::builtin();
        let events = catalog
            .slot_space(Page::Gallery, Some(Category::EventsActivities))
            .unwrap();
        let general = catalog.slot_space(Page::Gallery, Some(Category::General)).unwrap();

        assert_eq!(store.max_occupied_slot(&events).await.unwrap(), 0);

        for n in [1, 4] {
            let slot = catalog.address_in(&events, n).unwrap();
            store.insert(&slot, "/media/e.png").await.unwrap();
        }
        let slot = catalog.address_in(&general, 1).unwrap();
        store.insert(&slot, "/media/g.png").await.unwrap();

        assert_eq!(store.max_occupied_slot(&events).await.unwrap(), 4);
        assert_eq!(store.max_occupied_slot(&general).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_conflict() {
        let (_dir, store) = test_store().await;
        let slot = PageCatalog::builtin().slot_address(Page::About, None, 1).unwrap();

        store.insert(&slot, "/media/first.png").await.unwrap();
        let err = store.insert(&slot, "/media/second.png").await.unwrap_err();

        assert!(matches!(err, MediaError::Conflict { slot: s } if s == slot));
        let stored = store.find_by_slot(&slot.space(), 1).await.unwrap().unwrap();
        assert_eq!(stored.asset_url, "/media/first.png");
    }

    #[tokio::test]
    async fn test_replace_asset_keeps_identity() {
        let (_dir, store) = test_store().await;
        let slot = PageCatalog::builtin().slot_address(Page::Home, None, 5).unwrap();
        let original = store.insert(&slot, "/media/old.png").await.unwrap();

        let replaced = store.replace_asset(original.id, "/media/new.png").await.unwrap();

        assert_eq!(replaced.id, original.id);
        assert_eq!(replaced.slot_number, 5);
        assert_eq!(replaced.page, Page::Home);
        assert_eq!(replaced.created_at, original.created_at);
        assert_eq!(replaced.asset_url, "/media/new.png");
        assert!(replaced.updated_at >= original.updated_at);
    }

    #[tokio::test]
    async fn test_replace_missing_is_not_found() {
        let (_dir, store) = test_store().await;
        let id = Uuid::new_v4();

        let err = store.replace_asset(id, "/media/x.png").await.unwrap_err();
        assert!(matches!(err, MediaError::NotFound { id: missing } if missing == id));
    }

    #[tokio::test]
    async fn test_delete_frees_slot() {
        let (_dir, store) = test_store().await;
        let slot = PageCatalog::builtin().slot_address(Page::Programs, None, 3).unwrap();
        let picture = store.insert(&slot, "/media/p.png").await.unwrap();

        let deleted = store.delete(picture.id).await.unwrap();
        assert_eq!(deleted.id, picture.id);
        assert!(store.get(picture.id).await.unwrap().is_none());
        assert!(matches!(
            store.delete(picture.id).await,
            Err(MediaError::NotFound { .. })
        ));

        store.insert(&slot, "/media/again.png").await.unwrap();
    }

    #[tokio::test]
    async fn test_list_filters_and_orders() {
        let (_dir, store) = test_store().await;
        let catalog = PageCatalog::builtin();

        for n in [3, 1, 2] {
            let slot = catalog.slot_address(Page::Home, None, n).unwrap();
            store.insert(&slot, "/media/h.png").await.unwrap();
        }
        let slot = catalog
            .slot_address(Page::Gallery, Some(Category::Awareness), 1)
            .unwrap();
        store.insert(&slot, "/media/g.png").await.unwrap();

        let home: Vec<u32> = store
            .list(Some(Page::Home), None)
            .await
            .unwrap()
            .iter()
            .map(|p| p.slot_number)
            .collect();
        assert_eq!(home, vec![1, 2, 3]);

        let awareness = store.list(None, Some(Category::Awareness)).await.unwrap();
        assert_eq!(awareness.len(), 1);
        assert_eq!(store.list(None, None).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_asset_in_use() {
        let (_dir, store) = test_store().await;
        let slot = PageCatalog::builtin().slot_address(Page::Home, None, 1).unwrap();
        let picture = store.insert(&slot, "/media/shared.png").await.unwrap();

        assert!(store.asset_in_use("/media/shared.png").await.unwrap());
        store.replace_asset(picture.id, "/media/next.png").await.unwrap();
        assert!(!store.asset_in_use("/media/shared.png").await.unwrap());
    }
}
