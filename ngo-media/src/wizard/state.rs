//! Upload wizard state
//!
//! Everything the wizard knows lives in [`WizardState`]. Inputs come from
//! the user or from completed [`Effect`]s, and the transition function is
//! the only place that produces a new state.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::{Category, Page, Picture, SlotAddress, SlotSpace};
use crate::services::{Occupancy, SlotSuggestion};

/// Wizard step, in display order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WizardStep {
    SelectPage,
    SelectCategory,
    SelectSlot,
    AttachFile,
    ConfirmReplacement,
}

impl WizardStep {
    pub const ALL: [WizardStep; 5] = [
        WizardStep::SelectPage,
        WizardStep::SelectCategory,
        WizardStep::SelectSlot,
        WizardStep::AttachFile,
        WizardStep::ConfirmReplacement,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WizardStep::SelectPage => "SELECT_PAGE",
            WizardStep::SelectCategory => "SELECT_CATEGORY",
            WizardStep::SelectSlot => "SELECT_SLOT",
            WizardStep::AttachFile => "ATTACH_FILE",
            WizardStep::ConfirmReplacement => "CONFIRM_REPLACEMENT",
        }
    }

    /// Human-readable label for step indicators
    pub fn label(&self) -> &'static str {
        match self {
            WizardStep::SelectPage => "Choose page",
            WizardStep::SelectCategory => "Choose category",
            WizardStep::SelectSlot => "Choose slot",
            WizardStep::AttachFile => "Attach image",
            WizardStep::ConfirmReplacement => "Confirm replacement",
        }
    }

    pub fn ordinal(&self) -> usize {
        match self {
            WizardStep::SelectPage => 0,
            WizardStep::SelectCategory => 1,
            WizardStep::SelectSlot => 2,
            WizardStep::AttachFile => 3,
            WizardStep::ConfirmReplacement => 4,
        }
    }
}

impl fmt::Display for WizardStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the wizard remembers about an attached file. The bytes themselves
/// are held by the session, never by the state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotMode {
    /// Slot number comes from the resolver
    #[default]
    Auto,
    /// Slot number is typed by the user and checked with a debounce
    Manual,
}

/// Advisory status of the selected slot
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SlotStatus {
    Unknown,
    /// A suggestion or occupancy check is in flight
    Pending,
    Free,
    Occupied { existing: Picture },
    Invalid { message: String },
}

/// The single slot field fed by either the resolver or manual entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotSelection {
    pub mode: SlotMode,
    pub number: Option<i64>,
    /// Suggested number was capped at the page capacity
    pub clamped: bool,
    pub status: SlotStatus,
}

impl Default for SlotSelection {
    fn default() -> Self {
        Self {
            mode: SlotMode::Auto,
            number: None,
            clamped: false,
            status: SlotStatus::Unknown,
        }
    }
}

impl SlotSelection {
    fn cleared(mode: SlotMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::cleared(self.mode);
    }
}

/// New image waiting to take over an occupied slot
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReplacementCandidate {
    /// Not uploaded yet
    File { file: FileMeta },
    /// Already in the blob store (a create lost its race after uploading)
    Uploaded { asset_url: String, file: FileMeta },
}

impl ReplacementCandidate {
    pub fn file(&self) -> &FileMeta {
        match self {
            ReplacementCandidate::File { file } | ReplacementCandidate::Uploaded { file, .. } => file,
        }
    }

    pub fn uploaded_url(&self) -> Option<&str> {
        match self {
            ReplacementCandidate::Uploaded { asset_url, .. } => Some(asset_url),
            ReplacementCandidate::File { .. } => None,
        }
    }
}

/// An occupied slot awaiting explicit confirmation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingReplacement {
    pub slot: SlotAddress,
    pub existing: Picture,
    pub candidate: ReplacementCandidate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WizardState {
    pub step: WizardStep,
    pub page: Option<Page>,
    pub category: Option<Category>,
    pub slot: SlotSelection,
    pub file: Option<FileMeta>,
    pub pending: Option<PendingReplacement>,
    /// A commit or replace effect is in flight
    pub committing: bool,
    /// Tags each commit or replace effect; results carrying another value
    /// belong to an abandoned attempt
    pub commit_attempt: u64,
    pub last_error: Option<String>,
    /// Picture produced by the previous run of the wizard
    pub completed: Option<Picture>,
}

impl Default for WizardState {
    fn default() -> Self {
        Self::new()
    }
}

impl WizardState {
    pub fn new() -> Self {
        Self {
            step: WizardStep::SelectPage,
            page: None,
            category: None,
            slot: SlotSelection::default(),
            file: None,
            pending: None,
            committing: false,
            commit_attempt: 0,
            last_error: None,
            completed: None,
        }
    }

    /// Fresh state after a finished or abandoned run. Mode preference, the
    /// attempt counter and the last completed picture survive.
    pub(crate) fn restart(&self, completed: Option<Picture>) -> Self {
        Self {
            slot: SlotSelection::cleared(self.slot.mode),
            commit_attempt: self.commit_attempt,
            completed,
            ..Self::new()
        }
    }
}

/// Everything that can drive the wizard
#[derive(Debug, Clone)]
pub enum WizardInput {
    ChoosePage(Page),
    ChooseCategory(Category),
    SetAutoAssign(bool),
    EnterSlot(i64),
    Advance,
    Back,
    AttachFile(FileMeta),
    Commit,
    ConfirmReplacement,
    DeclineReplacement,
    Cancel,

    SlotSuggested {
        space: SlotSpace,
        suggestion: SlotSuggestion,
    },
    OccupancyChecked {
        slot: SlotAddress,
        occupancy: Occupancy,
    },
    CheckFailed {
        slot: SlotAddress,
        message: String,
    },
    Created {
        attempt: u64,
        picture: Picture,
    },
    ReplacementRequired {
        attempt: u64,
        pending: PendingReplacement,
    },
    Replaced {
        attempt: u64,
        picture: Picture,
    },
    ReplacementTargetVanished {
        attempt: u64,
        slot: SlotAddress,
    },
    CommitFailed {
        attempt: u64,
        message: String,
        /// Blob uploaded for this attempt that no record references yet
        unconfirmed_upload: Option<String>,
    },
}

impl WizardInput {
    pub fn action(&self) -> &'static str {
        match self {
            WizardInput::ChoosePage(_) => "choose_page",
            WizardInput::ChooseCategory(_) => "choose_category",
            WizardInput::SetAutoAssign(_) => "set_auto_assign",
            WizardInput::EnterSlot(_) => "enter_slot",
            WizardInput::Advance => "advance",
            WizardInput::Back => "back",
            WizardInput::AttachFile(_) => "attach_file",
            WizardInput::Commit => "commit",
            WizardInput::ConfirmReplacement => "confirm_replacement",
            WizardInput::DeclineReplacement => "decline_replacement",
            WizardInput::Cancel => "cancel",
            WizardInput::SlotSuggested { .. } => "slot_suggested",
            WizardInput::OccupancyChecked { .. } => "occupancy_checked",
            WizardInput::CheckFailed { .. } => "check_failed",
            WizardInput::Created { .. } => "created",
            WizardInput::ReplacementRequired { .. } => "replacement_required",
            WizardInput::Replaced { .. } => "replaced",
            WizardInput::ReplacementTargetVanished { .. } => "replacement_target_vanished",
            WizardInput::CommitFailed { .. } => "commit_failed",
        }
    }

    /// Attempt tag of commit and replace results
    pub fn commit_attempt(&self) -> Option<u64> {
        match self {
            WizardInput::Created { attempt, .. }
            | WizardInput::ReplacementRequired { attempt, .. }
            | WizardInput::Replaced { attempt, .. }
            | WizardInput::ReplacementTargetVanished { attempt, .. }
            | WizardInput::CommitFailed { attempt, .. } => Some(*attempt),
            _ => None,
        }
    }

    /// True for inputs produced by the user rather than by effects
    pub fn is_user_input(&self) -> bool {
        matches!(
            self,
            WizardInput::ChoosePage(_)
                | WizardInput::ChooseCategory(_)
                | WizardInput::SetAutoAssign(_)
                | WizardInput::EnterSlot(_)
                | WizardInput::Advance
                | WizardInput::Back
                | WizardInput::AttachFile(_)
                | WizardInput::Commit
                | WizardInput::ConfirmReplacement
                | WizardInput::DeclineReplacement
                | WizardInput::Cancel
        )
    }
}

/// Async work requested by a transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    SuggestSlot { space: SlotSpace },
    CheckOccupancy { slot: SlotAddress, debounce: bool },
    Commit {
        attempt: u64,
        slot: SlotAddress,
        file: FileMeta,
    },
    Replace {
        attempt: u64,
        pending: PendingReplacement,
    },
    DiscardUploadedAsset { asset_url: String },
}

impl Effect {
    pub fn commit_attempt(&self) -> Option<u64> {
        match self {
            Effect::Commit { attempt, .. } | Effect::Replace { attempt, .. } => Some(*attempt),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StepChange {
    pub from: WizardStep,
    pub to: WizardStep,
}

/// Result of one transition
#[derive(Debug, Clone)]
pub struct Transition {
    pub state: WizardState,
    pub effects: Vec<Effect>,
    pub step_change: Option<StepChange>,
}
