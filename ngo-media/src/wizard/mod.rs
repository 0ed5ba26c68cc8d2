//! Upload wizard finite-state machine
//!
//! SELECT_PAGE → SELECT_CATEGORY (categorised pages only) → SELECT_SLOT →
//! ATTACH_FILE → commit → create, or CONFIRM_REPLACEMENT when the slot is
//! taken. Every finished or cancelled run returns to SELECT_PAGE.

pub mod state;
pub mod transition;

pub use state::{
    Effect, FileMeta, PendingReplacement, ReplacementCandidate, SlotMode, SlotSelection,
    SlotStatus, StepChange, Transition, WizardInput, WizardState, WizardStep,
};
pub use transition::{abandoned_result_cleanup, transition};

use serde::Serialize;

use crate::models::PageCatalog;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorStatus {
    Complete,
    Current,
    Upcoming,
    /// Not part of this run (category step on uncategorised pages,
    /// confirmation when no replacement is pending)
    Skipped,
}

/// One entry of a step-indicator UI
#[derive(Debug, Clone, Serialize)]
pub struct StepIndicator {
    pub step: WizardStep,
    pub label: &'static str,
    pub status: IndicatorStatus,
}

pub fn step_indicators(state: &WizardState, catalog: &PageCatalog) -> Vec<StepIndicator> {
    let uses_categories = state
        .page
        .and_then(|page| catalog.definition_for(page).ok())
        .map(|def| def.uses_categories);
    let current = state.step.ordinal();

    WizardStep::ALL
        .iter()
        .map(|&step| {
            let skipped = match step {
                WizardStep::SelectCategory => uses_categories == Some(false),
                WizardStep::ConfirmReplacement => state.step != WizardStep::ConfirmReplacement,
                _ => false,
            };
            let status = if step == state.step {
                IndicatorStatus::Current
            } else if skipped {
                IndicatorStatus::Skipped
            } else if step.ordinal() < current {
                IndicatorStatus::Complete
            } else {
                IndicatorStatus::Upcoming
            };
            StepIndicator {
                step,
                label: step.label(),
                status,
            }
        })
        .collect()
}
