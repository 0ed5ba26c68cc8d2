//! Upload orchestrator
//!
//! Library entry point for the admin UI and the effect runner behind the
//! wizard FSM. It wires catalog, store, resolver, checker, blob uploader and
//! replacement protocol together and owns no state of its own.

use chrono::Utc;
use ngo_common::events::{EventBus, MediaEvent};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::blob_store::{BlobUploader, UploadFile, UploadPolicy};
use super::occupancy_checker::{Occupancy, OccupancyChecker};
use super::replacement::{CommitOutcome, ReplacementProtocol, UploadContext};
use super::slot_resolver::{SlotResolver, SlotSuggestion};
use crate::db::PictureStore;
use crate::error::{MediaError, MediaResult};
use crate::models::{Category, Page, PageCatalog, Picture};
use crate::wizard::{Effect, PendingReplacement, WizardInput};

#[derive(Clone)]
pub struct UploadOrchestrator {
    catalog: Arc<PageCatalog>,
    store: PictureStore,
    resolver: SlotResolver,
    checker: OccupancyChecker,
    protocol: ReplacementProtocol,
    uploader: BlobUploader,
    policy: UploadPolicy,
    event_bus: EventBus,
}

impl UploadOrchestrator {
    pub fn new(
        catalog: Arc<PageCatalog>,
        store: PictureStore,
        uploader: BlobUploader,
        policy: UploadPolicy,
        event_bus: EventBus,
    ) -> Self {
        let resolver = SlotResolver::new(store.clone(), Arc::clone(&catalog));
        let checker = OccupancyChecker::new(store.clone(), Arc::clone(&catalog));
        let protocol = ReplacementProtocol::new(
            store.clone(),
            checker.clone(),
            uploader.clone(),
            event_bus.clone(),
        );

        Self {
            catalog,
            store,
            resolver,
            checker,
            protocol,
            uploader,
            policy,
            event_bus,
        }
    }

    pub fn catalog(&self) -> &PageCatalog {
        &self.catalog
    }

    pub fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    pub fn store(&self) -> &PictureStore {
        &self.store
    }

    pub async fn get_next_available_slot(
        &self,
        page: Page,
        category: Option<Category>,
    ) -> MediaResult<u32> {
        self.resolver.next_available_slot(page, category).await
    }

    pub async fn suggest_slot(
        &self,
        page: Page,
        category: Option<Category>,
    ) -> MediaResult<SlotSuggestion> {
        let space = self.catalog.slot_space(page, category)?;
        self.resolver.suggest(&space).await
    }

    pub async fn check_slot(
        &self,
        page: Page,
        slot_number: i64,
        category: Option<Category>,
    ) -> MediaResult<Occupancy> {
        self.checker.check(page, slot_number, category).await
    }

    /// Validate, gate and commit a file into a slot
    ///
    /// An occupied slot yields [`CommitOutcome::ReplacementRequired`]; pass
    /// it to [`confirm_replacement`](Self::confirm_replacement) once the
    /// user agreed.
    pub async fn commit_upload(
        &self,
        page: Page,
        category: Option<Category>,
        slot_number: i64,
        file: &UploadFile,
        ctx: &UploadContext,
    ) -> MediaResult<CommitOutcome> {
        let slot = self.catalog.slot_address(page, category, slot_number)?;
        self.policy.check(&file.meta())?;
        self.protocol.commit(&slot, file, ctx).await
    }

    pub async fn confirm_replacement(
        &self,
        pending: &PendingReplacement,
        file: Option<&UploadFile>,
        ctx: &UploadContext,
    ) -> MediaResult<Picture> {
        self.protocol.confirm(pending, file, ctx).await
    }

    pub async fn list_pictures(
        &self,
        page: Option<Page>,
        category: Option<Category>,
    ) -> MediaResult<Vec<Picture>> {
        self.store.list(page, category).await
    }

    pub async fn get_picture(&self, id: Uuid) -> MediaResult<Picture> {
        self.store
            .get(id)
            .await?
            .ok_or(MediaError::NotFound { id })
    }

    /// Delete a picture and free its slot; its blob goes too once unused
    pub async fn delete_picture(&self, id: Uuid) -> MediaResult<Picture> {
        let picture = self.store.delete(id).await?;

        self.event_bus.emit_lossy(MediaEvent::PictureDeleted {
            picture_id: picture.id,
            page: picture.page.as_str().to_string(),
            category: picture.category.map(|c| c.as_str().to_string()),
            slot_number: picture.slot_number,
            timestamp: Utc::now(),
        });
        self.protocol.release_if_unused(&picture.asset_url).await;

        Ok(picture)
    }

    /// Best-effort removal of a blob that never made it into a Picture
    pub async fn discard_asset(&self, asset_url: &str) {
        self.uploader.discard(asset_url).await;
    }

    /// Execute one wizard effect and translate its outcome into an input
    ///
    /// Debouncing is the caller's concern; `CheckOccupancy` runs
    /// immediately here.
    pub async fn run_effect(
        &self,
        effect: Effect,
        file: Option<Arc<UploadFile>>,
        ctx: &UploadContext,
    ) -> Option<WizardInput> {
        match effect {
            Effect::SuggestSlot { space } => match self.resolver.suggest(&space).await {
                Ok(suggestion) => Some(WizardInput::SlotSuggested { space, suggestion }),
                Err(e) => {
                    warn!(space = %space, error = %e, "Slot suggestion failed");
                    None
                }
            },

            Effect::CheckOccupancy { slot, .. } => match self.checker.is_occupied(&slot).await {
                Ok(occupancy) => Some(WizardInput::OccupancyChecked { slot, occupancy }),
                Err(e) => Some(WizardInput::CheckFailed {
                    slot,
                    message: e.to_string(),
                }),
            },

            Effect::Commit {
                attempt,
                slot,
                file: meta,
            } => {
                let Some(file) = file else {
                    return Some(WizardInput::CommitFailed {
                        attempt,
                        message: format!("File '{}' is no longer attached", meta.file_name),
                        unconfirmed_upload: None,
                    });
                };
                match self.protocol.commit(&slot, &file, ctx).await {
                    Ok(CommitOutcome::Created(picture)) => {
                        Some(WizardInput::Created { attempt, picture })
                    }
                    Ok(CommitOutcome::ReplacementRequired(pending)) => {
                        Some(WizardInput::ReplacementRequired { attempt, pending })
                    }
                    Err(e) => Some(WizardInput::CommitFailed {
                        attempt,
                        message: e.to_string(),
                        unconfirmed_upload: None,
                    }),
                }
            }

            Effect::Replace { attempt, pending } => {
                match self.protocol.confirm(&pending, file.as_deref(), ctx).await {
                    Ok(picture) => Some(WizardInput::Replaced { attempt, picture }),
                    Err(MediaError::NotFound { .. }) => Some(WizardInput::ReplacementTargetVanished {
                        attempt,
                        slot: pending.slot,
                    }),
                    Err(e) => Some(WizardInput::CommitFailed {
                        attempt,
                        message: e.to_string(),
                        unconfirmed_upload: pending.candidate.uploaded_url().map(str::to_string),
                    }),
                }
            }

            Effect::DiscardUploadedAsset { asset_url } => {
                debug!(asset_url = %asset_url, "Discarding unconfirmed upload");
                self.uploader.discard(&asset_url).await;
                None
            }
        }
    }
}
