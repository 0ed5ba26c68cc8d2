//! Blob store collaborator
//!
//! [`BlobStore`] turns file bytes into a public asset URL. The shipped
//! [`LocalBlobStore`] writes into `<root>/media`, which the HTTP layer
//! serves back under the public base URL. [`BlobUploader`] adds the
//! timeout, cancellation and progress events every upload goes through.

use async_trait::async_trait;
use chrono::Utc;
use ngo_common::config::UploadConfig;
use ngo_common::events::{EventBus, MediaEvent};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{MediaError, MediaResult, UploadTransportError};
use crate::wizard::FileMeta;

const PARTIAL_SUFFIX: &str = ".part";

/// How long a cancelled store gets to unwind its own work
const CANCEL_GRACE: Duration = Duration::from_secs(2);

/// File bytes plus what the client told us about them
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl UploadFile {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            data,
        }
    }

    pub fn meta(&self) -> FileMeta {
        FileMeta {
            file_name: self.file_name.clone(),
            content_type: self.content_type.clone(),
            size_bytes: self.data.len() as u64,
        }
    }

    /// Extension for the stored object, derived from the content type
    pub fn extension(&self) -> String {
        match essence(&self.content_type).as_str() {
            "image/jpeg" => return "jpg".to_string(),
            "image/png" => return "png".to_string(),
            "image/webp" => return "webp".to_string(),
            "image/gif" => return "gif".to_string(),
            _ => {}
        }

        Path::new(&self.file_name)
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_else(|| "bin".to_string())
    }
}

/// Content type without parameters, lowercased
fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub asset_url: String,
    pub size_bytes: u64,
}

/// Fractional progress callback (0.0 - 1.0)
#[derive(Clone)]
pub struct ProgressReporter {
    callback: Option<Arc<dyn Fn(f64) + Send + Sync>>,
}

impl ProgressReporter {
    pub fn new(callback: impl Fn(f64) + Send + Sync + 'static) -> Self {
        Self {
            callback: Some(Arc::new(callback)),
        }
    }

    pub fn silent() -> Self {
        Self { callback: None }
    }

    pub fn report(&self, fraction: f64) {
        if let Some(callback) = &self.callback {
            callback(fraction.clamp(0.0, 1.0));
        }
    }
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("silent", &self.callback.is_none())
            .finish()
    }
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Short identifier for logs
    fn backend_id(&self) -> &'static str;

    /// Store `file` and return its public URL
    ///
    /// Implementations should stop early once `cancel` fires. A blob that
    /// still finishes after the cancel is discarded by [`BlobUploader`].
    async fn upload(
        &self,
        file: &UploadFile,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<StoredBlob, UploadTransportError>;

    /// Remove a previously uploaded blob. Unknown URLs are not an error.
    async fn discard(&self, asset_url: &str) -> Result<(), UploadTransportError>;
}

/// Blob store writing into a local directory
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    media_dir: PathBuf,
    public_base_url: String,
    chunk_size: usize,
}

impl LocalBlobStore {
    pub fn new(media_dir: PathBuf, public_base_url: &str) -> Self {
        Self {
            media_dir,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            chunk_size: 64 * 1024,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn media_dir(&self) -> &Path {
        &self.media_dir
    }

    /// Content-addressed object name: digest prefix plus a uuid, so identical
    /// bytes uploaded twice still get distinct lifetimes
    fn object_name(&self, file: &UploadFile) -> String {
        let digest = Sha256::digest(&file.data);
        let prefix: String = digest.iter().take(8).map(|b| format!("{:02x}", b)).collect();
        format!("{}-{}.{}", prefix, Uuid::new_v4().simple(), file.extension())
    }

    fn object_path(&self, asset_url: &str) -> Result<PathBuf, UploadTransportError> {
        let name = asset_url
            .strip_prefix(&self.public_base_url)
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(|| {
                UploadTransportError::Rejected(format!("'{}' is not served by this store", asset_url))
            })?;

        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(UploadTransportError::Rejected(format!(
                "Invalid object name in '{}'",
                asset_url
            )));
        }
        Ok(self.media_dir.join(name))
    }

    async fn write_chunks(
        &self,
        path: &Path,
        file: &UploadFile,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<(), UploadTransportError> {
        let total = file.data.len().max(1) as f64;
        let mut written = 0usize;
        let mut out = tokio::fs::File::create(path).await?;

        for chunk in file.data.chunks(self.chunk_size) {
            if cancel.is_cancelled() {
                return Err(UploadTransportError::Cancelled);
            }
            out.write_all(chunk).await?;
            written += chunk.len();
            progress.report(written as f64 / total);
        }

        out.flush().await?;
        out.sync_all().await?;
        Ok(())
    }

    /// Remove leftovers of uploads interrupted mid-write
    pub async fn sweep_partial_uploads(&self) -> std::io::Result<usize> {
        let mut removed = 0;
        let mut entries = match tokio::fs::read_dir(&self.media_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_name().to_string_lossy().ends_with(PARTIAL_SUFFIX) {
                tokio::fs::remove_file(entry.path()).await?;
                removed += 1;
            }
        }

        if removed > 0 {
            info!(removed, "Removed partial uploads");
        }
        Ok(removed)
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    fn backend_id(&self) -> &'static str {
        "local"
    }

    async fn upload(
        &self,
        file: &UploadFile,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<StoredBlob, UploadTransportError> {
        tokio::fs::create_dir_all(&self.media_dir).await?;

        let name = self.object_name(file);
        let final_path = self.media_dir.join(&name);
        let partial_path = self.media_dir.join(format!("{}{}", name, PARTIAL_SUFFIX));

        let written = match self.write_chunks(&partial_path, file, progress, cancel).await {
            Ok(()) if cancel.is_cancelled() => Err(UploadTransportError::Cancelled),
            other => other,
        };
        if let Err(e) = written {
            if let Err(cleanup) = tokio::fs::remove_file(&partial_path).await {
                debug!(error = %cleanup, "Partial upload cleanup failed");
            }
            return Err(e);
        }
        tokio::fs::rename(&partial_path, &final_path).await?;

        Ok(StoredBlob {
            asset_url: format!("{}/{}", self.public_base_url, name),
            size_bytes: file.data.len() as u64,
        })
    }

    async fn discard(&self, asset_url: &str) -> Result<(), UploadTransportError> {
        let path = self.object_path(asset_url)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(asset_url, "Blob discarded");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Content-type and size gate applied when a file is attached
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    max_bytes: usize,
    allowed_content_types: Vec<String>,
}

impl UploadPolicy {
    pub fn from_config(config: &UploadConfig) -> Self {
        Self {
            max_bytes: config.max_bytes,
            allowed_content_types: config
                .allowed_content_types
                .iter()
                .map(|t| essence(t.as_str()))
                .collect(),
        }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn check(&self, file: &FileMeta) -> MediaResult<()> {
        if file.file_name.trim().is_empty() {
            return Err(MediaError::Validation("File name is required".to_string()));
        }
        if file.size_bytes == 0 {
            return Err(MediaError::Validation(format!(
                "File '{}' is empty",
                file.file_name
            )));
        }
        if file.size_bytes > self.max_bytes as u64 {
            return Err(MediaError::Validation(format!(
                "File '{}' is {} bytes; the limit is {} bytes",
                file.file_name, file.size_bytes, self.max_bytes
            )));
        }

        let content_type = essence(&file.content_type);
        if !self.allowed_content_types.contains(&content_type) {
            return Err(MediaError::Validation(format!(
                "Content type '{}' is not accepted (allowed: {})",
                file.content_type,
                self.allowed_content_types.join(", ")
            )));
        }
        Ok(())
    }
}

/// Runs blob uploads with a timeout, cancellation and progress events
#[derive(Clone)]
pub struct BlobUploader {
    store: Arc<dyn BlobStore>,
    timeout: Duration,
    event_bus: EventBus,
}

impl BlobUploader {
    pub fn new(store: Arc<dyn BlobStore>, timeout: Duration, event_bus: EventBus) -> Self {
        Self {
            store,
            timeout,
            event_bus,
        }
    }

    pub async fn upload(
        &self,
        file: &UploadFile,
        wizard_id: Option<Uuid>,
        cancel: &CancellationToken,
    ) -> Result<StoredBlob, UploadTransportError> {
        let bus = self.event_bus.clone();
        let file_name = file.file_name.clone();
        let progress = ProgressReporter::new(move |fraction| {
            bus.emit_lossy(MediaEvent::UploadProgress {
                wizard_id,
                file_name: file_name.clone(),
                fraction,
                timestamp: Utc::now(),
            });
        });

        let started = Instant::now();
        let upload = tokio::time::timeout(self.timeout, self.store.upload(file, &progress, cancel));
        tokio::pin!(upload);

        let finished = tokio::select! {
            outcome = &mut upload => {
                outcome.map_err(|_| UploadTransportError::TimedOut(self.timeout.as_secs()))
            }
            _ = cancel.cancelled() => {
                // The store sees the same token; let it unwind instead of
                // dropping it halfway through its final step
                tokio::time::timeout(CANCEL_GRACE, &mut upload)
                    .await
                    .unwrap_or(Ok(Err(UploadTransportError::Cancelled)))
                    .map_err(|_| UploadTransportError::Cancelled)
            }
        };
        let result = match finished.and_then(|result| result) {
            Ok(blob) if cancel.is_cancelled() => {
                debug!(asset_url = %blob.asset_url, "Upload finished after cancel");
                self.discard(&blob.asset_url).await;
                Err(UploadTransportError::Cancelled)
            }
            other => other,
        };

        match &result {
            Ok(blob) => info!(
                backend = self.store.backend_id(),
                file_name = %file.file_name,
                asset_url = %blob.asset_url,
                size_bytes = blob.size_bytes,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Blob uploaded"
            ),
            Err(e) => warn!(
                backend = self.store.backend_id(),
                file_name = %file.file_name,
                error = %e,
                "Blob upload failed"
            ),
        }
        result
    }

    /// Best-effort removal; failures are logged and swallowed
    pub async fn discard(&self, asset_url: &str) {
        if let Err(e) = self.store.discard(asset_url).await {
            warn!(
                backend = self.store.backend_id(),
                asset_url,
                error = %e,
                "Failed to discard blob"
            );
        }
    }
}
