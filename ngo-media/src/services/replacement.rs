//! Replacement protocol
//!
//! Commit re-checks occupancy instead of trusting what the wizard showed.
//! A free slot gets the blob uploaded and then inserted; an occupied slot
//! (or one lost to a concurrent insert) becomes a [`PendingReplacement`]
//! that needs explicit confirmation. Confirmation replaces the asset of the
//! existing record by id and never falls back to a create.

use chrono::Utc;
use ngo_common::events::{EventBus, MediaEvent};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::blob_store::{BlobUploader, UploadFile};
use super::occupancy_checker::{Occupancy, OccupancyChecker};
use crate::db::PictureStore;
use crate::error::{MediaError, MediaResult, UploadTransportError};
use crate::models::{Picture, SlotAddress};
use crate::wizard::{PendingReplacement, ReplacementCandidate};

/// Who an upload belongs to and how to abort it
#[derive(Debug, Clone, Default)]
pub struct UploadContext {
    pub wizard_id: Option<Uuid>,
    pub cancel: CancellationToken,
}

impl UploadContext {
    pub fn for_wizard(wizard_id: Uuid, cancel: CancellationToken) -> Self {
        Self {
            wizard_id: Some(wizard_id),
            cancel,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    Created(Picture),
    ReplacementRequired(PendingReplacement),
}

#[derive(Clone)]
pub struct ReplacementProtocol {
    store: PictureStore,
    checker: OccupancyChecker,
    uploader: BlobUploader,
    event_bus: EventBus,
}

impl ReplacementProtocol {
    pub fn new(
        store: PictureStore,
        checker: OccupancyChecker,
        uploader: BlobUploader,
        event_bus: EventBus,
    ) -> Self {
        Self {
            store,
            checker,
            uploader,
            event_bus,
        }
    }

    /// Create in `slot`, or report that confirmation is needed
    ///
    /// Nothing is written unless the upload succeeded. A blob whose insert
    /// failed is discarded, except when it is carried into the pending
    /// replacement.
    pub async fn commit(
        &self,
        slot: &SlotAddress,
        file: &UploadFile,
        ctx: &UploadContext,
    ) -> MediaResult<CommitOutcome> {
        if let Occupancy::Occupied { existing } = self.checker.is_occupied(slot).await? {
            debug!(slot = %slot, existing_id = %existing.id, "Slot occupied at commit");
            return Ok(CommitOutcome::ReplacementRequired(PendingReplacement {
                slot: *slot,
                existing,
                candidate: ReplacementCandidate::File { file: file.meta() },
            }));
        }

        let blob = self.uploader.upload(file, ctx.wizard_id, &ctx.cancel).await?;
        if ctx.cancel.is_cancelled() {
            self.uploader.discard(&blob.asset_url).await;
            return Err(UploadTransportError::Cancelled.into());
        }

        match self.store.insert(slot, &blob.asset_url).await {
            Ok(picture) => {
                self.event_bus.emit_lossy(MediaEvent::PictureCreated {
                    picture_id: picture.id,
                    page: picture.page.as_str().to_string(),
                    category: picture.category.map(|c| c.as_str().to_string()),
                    slot_number: picture.slot_number,
                    asset_url: picture.asset_url.clone(),
                    timestamp: Utc::now(),
                });
                Ok(CommitOutcome::Created(picture))
            }
            Err(MediaError::Conflict { slot: lost }) => {
                self.event_bus.emit_lossy(MediaEvent::SlotConflict {
                    wizard_id: ctx.wizard_id,
                    page: lost.page().as_str().to_string(),
                    category: lost.category().map(|c| c.as_str().to_string()),
                    slot_number: lost.slot_number(),
                    timestamp: Utc::now(),
                });

                match self.checker.is_occupied(slot).await {
                    Ok(Occupancy::Occupied { existing }) => {
                        info!(
                            slot = %slot,
                            winner_id = %existing.id,
                            "Lost slot race; replacement needs confirmation"
                        );
                        Ok(CommitOutcome::ReplacementRequired(PendingReplacement {
                            slot: *slot,
                            existing,
                            candidate: ReplacementCandidate::Uploaded {
                                asset_url: blob.asset_url,
                                file: file.meta(),
                            },
                        }))
                    }
                    Ok(Occupancy::Free) => {
                        // Winner already gone again; let the user retry
                        self.uploader.discard(&blob.asset_url).await;
                        Err(MediaError::Conflict { slot: lost })
                    }
                    Err(e) => {
                        self.uploader.discard(&blob.asset_url).await;
                        Err(e)
                    }
                }
            }
            Err(e) => {
                self.uploader.discard(&blob.asset_url).await;
                Err(e)
            }
        }
    }

    /// Replace the existing picture's asset after explicit confirmation
    ///
    /// `file` is required unless the candidate was already uploaded. A
    /// vanished target returns [`MediaError::NotFound`] and the candidate
    /// blob is discarded. On any other failure an already-uploaded
    /// candidate is left to the caller.
    pub async fn confirm(
        &self,
        pending: &PendingReplacement,
        file: Option<&UploadFile>,
        ctx: &UploadContext,
    ) -> MediaResult<Picture> {
        let (new_url, uploaded_here) = match &pending.candidate {
            ReplacementCandidate::Uploaded { asset_url, .. } => (asset_url.clone(), false),
            ReplacementCandidate::File { .. } => {
                let file = file.ok_or_else(|| {
                    MediaError::Validation(
                        "The file for this replacement is no longer attached".to_string(),
                    )
                })?;
                let blob = self.uploader.upload(file, ctx.wizard_id, &ctx.cancel).await?;
                (blob.asset_url, true)
            }
        };

        if ctx.cancel.is_cancelled() {
            if uploaded_here {
                self.uploader.discard(&new_url).await;
            }
            return Err(UploadTransportError::Cancelled.into());
        }

        match self.store.replace_asset(pending.existing.id, &new_url).await {
            Ok(picture) => {
                self.event_bus.emit_lossy(MediaEvent::PictureReplaced {
                    picture_id: picture.id,
                    page: picture.page.as_str().to_string(),
                    category: picture.category.map(|c| c.as_str().to_string()),
                    slot_number: picture.slot_number,
                    old_asset_url: pending.existing.asset_url.clone(),
                    new_asset_url: picture.asset_url.clone(),
                    timestamp: Utc::now(),
                });
                if pending.existing.asset_url != new_url {
                    self.release_if_unused(&pending.existing.asset_url).await;
                }
                Ok(picture)
            }
            Err(e @ MediaError::NotFound { .. }) => {
                warn!(
                    slot = %pending.slot,
                    picture_id = %pending.existing.id,
                    "Replacement target vanished"
                );
                self.uploader.discard(&new_url).await;
                Err(e)
            }
            Err(e) => {
                if uploaded_here {
                    self.uploader.discard(&new_url).await;
                }
                Err(e)
            }
        }
    }

    /// Discard an asset nobody references any more
    pub async fn release_if_unused(&self, asset_url: &str) {
        match self.store.asset_in_use(asset_url).await {
            Ok(false) => self.uploader.discard(asset_url).await,
            Ok(true) => debug!(asset_url, "Asset still referenced; kept"),
            Err(e) => warn!(asset_url, error = %e, "Could not check asset references"),
        }
    }
}
