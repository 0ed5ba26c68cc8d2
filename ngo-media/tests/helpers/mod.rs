//! Test Helper Utilities
//!
//! Shared setup for ngo-media integration tests. Every environment gets its
//! own temp directory holding a file-backed database and a media folder.

#![allow(dead_code)]

use async_trait::async_trait;
use ngo_common::config::TomlConfig;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::Connection;
use ngo_common::events::EventBus;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use ngo_media::db::PictureStore;
use ngo_media::error::UploadTransportError;
use ngo_media::models::{Category, Page, PageCatalog, Picture, SlotAddress};
use ngo_media::services::{BlobStore, LocalBlobStore, ProgressReporter, StoredBlob, UploadFile};
use ngo_media::AppState;

/// A running service wired against a temp directory
///
/// The TempDir must stay alive for the duration of the test.
pub struct TestEnv {
    pub dir: TempDir,
    pub state: AppState,
}

impl TestEnv {
    pub fn store(&self) -> &PictureStore {
        self.state.orchestrator.store()
    }

    pub fn media_dir(&self) -> &Path {
        &self.state.media_dir
    }

    /// Names of the finished blobs in the media folder, sorted
    pub fn media_files(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(self.media_dir()) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| !name.ends_with(".part"))
            .collect();
        names.sort();
        names
    }

    /// Occupy `slots` of a space directly through the store
    pub async fn seed(&self, page: Page, category: Option<Category>, slots: &[i64]) -> Vec<Picture> {
        let catalog = PageCatalog::builtin();
        let mut pictures = Vec::new();
        for &number in slots {
            let slot = catalog.slot_address(page, category, number).unwrap();
            let url = format!("/media/seed-{}.png", slot.to_string().replace('/', "-"));
            pictures.push(self.store().insert(&slot, &url).await.unwrap());
        }
        pictures
    }

    pub fn router(&self) -> axum::Router {
        ngo_media::build_router(self.state.clone())
    }

    pub fn db_path(&self) -> PathBuf {
        self.dir.path().join("ngo-site.db")
    }

    /// Take the database write lock from a separate connection, holding up
    /// every store write until [`WriteLock::release`]
    pub async fn hold_write_lock(&self) -> WriteLock {
        let options = SqliteConnectOptions::new().filename(self.db_path());
        let mut conn = SqliteConnection::connect_with(&options).await.unwrap();
        sqlx::query("BEGIN IMMEDIATE").execute(&mut conn).await.unwrap();
        WriteLock { conn }
    }
}

pub struct WriteLock {
    conn: SqliteConnection,
}

impl WriteLock {
    pub async fn release(mut self) {
        sqlx::query("ROLLBACK").execute(&mut self.conn).await.unwrap();
        self.conn.close().await.unwrap();
    }
}

/// Defaults with a short debounce so wizard tests stay fast
pub fn test_config() -> TomlConfig {
    let mut config = TomlConfig::default();
    config.wizard.check_debounce_ms = 20;
    config.uploads.timeout_secs = 5;
    config
}

pub async fn test_env() -> TestEnv {
    build_env(test_config(), None).await
}

pub async fn test_env_with_blob_store(blob_store: Arc<dyn BlobStore>) -> TestEnv {
    build_env(test_config(), Some(blob_store)).await
}

/// Build an environment; without `blob_store` a LocalBlobStore writes into
/// the temp media folder
pub async fn build_env(config: TomlConfig, blob_store: Option<Arc<dyn BlobStore>>) -> TestEnv {
    build_env_at(TempDir::new().unwrap(), config, blob_store).await
}

/// Like [`build_env`], for stores that need to know `<dir>/media` up front
pub async fn build_env_at(
    dir: TempDir,
    config: TomlConfig,
    blob_store: Option<Arc<dyn BlobStore>>,
) -> TestEnv {
    let pool = ngo_media::db::init_database_pool(&dir.path().join("ngo-site.db"))
        .await
        .unwrap();
    let media_dir = dir.path().join("media");
    std::fs::create_dir_all(&media_dir).unwrap();

    let blob_store = blob_store.unwrap_or_else(|| {
        Arc::new(LocalBlobStore::new(
            media_dir.clone(),
            &config.uploads.public_base_url,
        ))
    });
    let state = AppState::new(pool, blob_store, EventBus::new(256), media_dir, &config);

    TestEnv { dir, state }
}

pub fn png(name: &str, bytes: usize) -> UploadFile {
    UploadFile::new(name, "image/png", vec![0x89u8; bytes])
}

pub fn slot(page: Page, category: Option<Category>, number: i64) -> SlotAddress {
    PageCatalog::builtin()
        .slot_address(page, category, number)
        .unwrap()
}

/// Blob store whose uploads always fail
#[derive(Default)]
pub struct FailingBlobStore {
    pub discards: Mutex<Vec<String>>,
}

#[async_trait]
impl BlobStore for FailingBlobStore {
    fn backend_id(&self) -> &'static str {
        "failing"
    }

    async fn upload(
        &self,
        _file: &UploadFile,
        _progress: &ProgressReporter,
        _cancel: &CancellationToken,
    ) -> Result<StoredBlob, UploadTransportError> {
        Err(UploadTransportError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "storage backend unreachable",
        )))
    }

    async fn discard(&self, asset_url: &str) -> Result<(), UploadTransportError> {
        self.discards.lock().unwrap().push(asset_url.to_string());
        Ok(())
    }
}

/// Local store that lets a competing admin win a slot while the upload is
/// in flight
///
/// Arm it with [`RacingBlobStore::arm`]; the next upload inserts a picture
/// into that slot before returning.
pub struct RacingBlobStore {
    inner: LocalBlobStore,
    rival: Mutex<Option<(PictureStore, SlotAddress)>>,
}

impl RacingBlobStore {
    pub fn new(media_dir: PathBuf) -> Self {
        Self {
            inner: LocalBlobStore::new(media_dir, "/media"),
            rival: Mutex::new(None),
        }
    }

    pub fn arm(&self, store: PictureStore, slot: SlotAddress) {
        *self.rival.lock().unwrap() = Some((store, slot));
    }
}

#[async_trait]
impl BlobStore for RacingBlobStore {
    fn backend_id(&self) -> &'static str {
        "racing"
    }

    async fn upload(
        &self,
        file: &UploadFile,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<StoredBlob, UploadTransportError> {
        let rival = self.rival.lock().unwrap().take();
        if let Some((store, slot)) = rival {
            store.insert(&slot, "/media/rival.png").await.unwrap();
        }
        self.inner.upload(file, progress, cancel).await
    }

    async fn discard(&self, asset_url: &str) -> Result<(), UploadTransportError> {
        self.inner.discard(asset_url).await
    }
}
