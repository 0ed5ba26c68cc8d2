//! Media slot services
//!
//! Resolver and checker read the store; the replacement protocol is the
//! only writer; the orchestrator and wizard registry drive them.

pub mod blob_store;
pub mod occupancy_checker;
pub mod replacement;
pub mod slot_resolver;
pub mod upload_orchestrator;
pub mod wizard_sessions;

pub use blob_store::{
    BlobStore, BlobUploader, LocalBlobStore, ProgressReporter, StoredBlob, UploadFile,
    UploadPolicy,
};
pub use occupancy_checker::{CheckDebouncer, Occupancy, OccupancyChecker};
pub use replacement::{CommitOutcome, ReplacementProtocol, UploadContext};
pub use slot_resolver::{candidate_slot, SlotResolver, SlotSuggestion};
pub use upload_orchestrator::UploadOrchestrator;
pub use wizard_sessions::{WizardRegistry, WizardView};
