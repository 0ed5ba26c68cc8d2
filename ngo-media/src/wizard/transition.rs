//! Wizard transition function
//!
//! `transition` is pure: it never touches the store or the blob store.
//! Slot suggestions, occupancy checks and commits are requested as
//! [`Effect`]s and come back later as inputs. Results that no longer match
//! the current state (the user moved on, or the wizard was reset) are
//! ignored. Commit and replace results carry the attempt that issued them;
//! a result from an abandoned attempt only releases the blob it left behind.

use super::state::{
    Effect, PendingReplacement, SlotMode, SlotStatus, StepChange, Transition, WizardInput,
    WizardState, WizardStep,
};
use crate::error::{MediaError, MediaResult};
use crate::models::{PageCatalog, SlotAddress, SlotSpace};
use crate::services::Occupancy;

/// Compute the next wizard state for `input`
///
/// User inputs that are not valid in the current step fail with
/// [`MediaError::InvalidTransition`]; inputs that are valid but carry bad
/// data fail with `Validation` or `CapacityExceeded`. On error the caller
/// keeps the previous state.
pub fn transition(
    state: &WizardState,
    input: WizardInput,
    catalog: &PageCatalog,
) -> MediaResult<Transition> {
    let from = state.step;
    let mut next = state.clone();
    let mut effects = Vec::new();

    if input.is_user_input() {
        if state.committing && !matches!(input, WizardInput::Cancel) {
            return Err(invalid(state.step, input.action()));
        }
        next.last_error = None;
    }

    apply(&mut next, input, catalog, &mut effects)?;

    let step_change = (next.step != from).then_some(StepChange {
        from,
        to: next.step,
    });

    Ok(Transition {
        state: next,
        effects,
        step_change,
    })
}

fn apply(
    state: &mut WizardState,
    input: WizardInput,
    catalog: &PageCatalog,
    effects: &mut Vec<Effect>,
) -> MediaResult<()> {
    let step = state.step;
    let action = input.action();

    if let Some(attempt) = input.commit_attempt() {
        if !state.committing || state.commit_attempt != attempt {
            effects.extend(abandoned_result_cleanup(&input));
            return Ok(());
        }
    }

    match input {
        WizardInput::Cancel => {
            // An in-flight replace still owns the uploaded candidate; its
            // late result releases it
            if !state.committing {
                discard_uploaded_candidate(state.pending.as_ref(), effects);
            }
            *state = state.restart(None);
        }

        WizardInput::ChoosePage(page) => {
            expect_step(step, action, &[WizardStep::SelectPage])?;
            catalog.definition_for(page)?;
            if state.page != Some(page) {
                state.page = Some(page);
                state.category = None;
                state.slot.reset();
            }
        }

        WizardInput::ChooseCategory(category) => {
            expect_step(
                step,
                action,
                &[WizardStep::SelectCategory, WizardStep::SelectSlot],
            )?;
            let page = state
                .page
                .ok_or_else(|| MediaError::Validation("Choose a page first".to_string()))?;
            catalog.slot_space(page, Some(category))?;
            if state.category != Some(category) {
                state.category = Some(category);
                if step == WizardStep::SelectSlot {
                    refresh_slot(state, catalog, effects)?;
                }
            }
        }

        WizardInput::SetAutoAssign(enabled) => {
            expect_step(
                step,
                action,
                &[
                    WizardStep::SelectPage,
                    WizardStep::SelectCategory,
                    WizardStep::SelectSlot,
                ],
            )?;
            let mode = if enabled {
                SlotMode::Auto
            } else {
                SlotMode::Manual
            };
            if state.slot.mode != mode {
                state.slot.mode = mode;
                if step == WizardStep::SelectSlot {
                    refresh_slot(state, catalog, effects)?;
                }
            }
        }

        WizardInput::EnterSlot(number) => {
            expect_step(step, action, &[WizardStep::SelectSlot])?;
            let space = current_space(state, catalog)?;
            state.slot.mode = SlotMode::Manual;
            enter_manual_number(state, catalog, &space, number, true, effects);
        }

        WizardInput::Advance => match step {
            WizardStep::SelectPage => {
                let page = state.page.ok_or_else(|| {
                    MediaError::Validation("Choose a page before continuing".to_string())
                })?;
                if catalog.definition_for(page)?.uses_categories {
                    state.step = WizardStep::SelectCategory;
                } else {
                    enter_select_slot(state, catalog, effects)?;
                }
            }
            WizardStep::SelectCategory => {
                if state.category.is_none() {
                    return Err(MediaError::Validation(
                        "Choose a category before continuing".to_string(),
                    ));
                }
                enter_select_slot(state, catalog, effects)?;
            }
            WizardStep::SelectSlot => {
                selected_address(state, catalog)?;
                state.step = WizardStep::AttachFile;
            }
            WizardStep::AttachFile | WizardStep::ConfirmReplacement => {
                return Err(invalid(step, action));
            }
        },

        WizardInput::Back => match step {
            WizardStep::SelectCategory => state.step = WizardStep::SelectPage,
            WizardStep::SelectSlot => {
                let uses_categories = match state.page {
                    Some(page) => catalog.definition_for(page)?.uses_categories,
                    None => false,
                };
                state.step = if uses_categories {
                    WizardStep::SelectCategory
                } else {
                    WizardStep::SelectPage
                };
            }
            WizardStep::AttachFile => enter_select_slot(state, catalog, effects)?,
            WizardStep::SelectPage | WizardStep::ConfirmReplacement => {
                return Err(invalid(step, action));
            }
        },

        WizardInput::AttachFile(file) => {
            expect_step(step, action, &[WizardStep::AttachFile])?;
            state.file = Some(file);
        }

        WizardInput::Commit => {
            expect_step(step, action, &[WizardStep::AttachFile])?;
            let file = state.file.clone().ok_or_else(|| {
                MediaError::Validation("Attach a file before committing".to_string())
            })?;
            let slot = selected_address(state, catalog)?;
            let attempt = begin_commit(state);
            effects.push(Effect::Commit {
                attempt,
                slot,
                file,
            });
        }

        WizardInput::ConfirmReplacement => {
            expect_step(step, action, &[WizardStep::ConfirmReplacement])?;
            let pending = state.pending.clone().ok_or_else(|| invalid(step, action))?;
            let attempt = begin_commit(state);
            effects.push(Effect::Replace { attempt, pending });
        }

        WizardInput::DeclineReplacement => {
            expect_step(step, action, &[WizardStep::ConfirmReplacement])?;
            discard_uploaded_candidate(state.pending.as_ref(), effects);
            state.pending = None;
            enter_select_slot(state, catalog, effects)?;
        }

        WizardInput::SlotSuggested { space, suggestion } => {
            let current = state
                .page
                .and_then(|page| catalog.slot_space(page, state.category).ok());
            if step != WizardStep::SelectSlot
                || state.slot.mode != SlotMode::Auto
                || current != Some(space)
            {
                return Ok(());
            }

            let number = i64::from(suggestion.slot_number);
            state.slot.number = Some(number);
            state.slot.clamped = suggestion.clamped;
            if suggestion.clamped {
                // A capped suggestion is most likely occupied; show who holds it
                let slot = catalog.address_in(&space, number)?;
                state.slot.status = SlotStatus::Pending;
                effects.push(Effect::CheckOccupancy {
                    slot,
                    debounce: false,
                });
            } else {
                state.slot.status = SlotStatus::Free;
            }
        }

        WizardInput::OccupancyChecked { slot, occupancy } => {
            if !is_current_slot(state, catalog, &slot) {
                return Ok(());
            }
            state.slot.status = match occupancy {
                Occupancy::Free => SlotStatus::Free,
                Occupancy::Occupied { existing } => SlotStatus::Occupied { existing },
            };
        }

        WizardInput::CheckFailed { slot, message } => {
            if !is_current_slot(state, catalog, &slot) {
                return Ok(());
            }
            state.slot.status = SlotStatus::Unknown;
            state.last_error = Some(message);
        }

        WizardInput::Created { picture, .. } | WizardInput::Replaced { picture, .. } => {
            *state = state.restart(Some(picture));
        }

        WizardInput::ReplacementRequired { pending, .. } => {
            state.committing = false;
            state.pending = Some(pending);
            state.step = WizardStep::ConfirmReplacement;
        }

        WizardInput::ReplacementTargetVanished { slot, .. } => {
            state.committing = false;
            state.pending = None;
            state.step = WizardStep::SelectSlot;
            state.slot.number = Some(i64::from(slot.slot_number()));
            state.slot.clamped = false;
            state.slot.status = SlotStatus::Pending;
            state.last_error = Some(format!(
                "The picture in slot {} was removed before it could be replaced",
                slot
            ));
            effects.push(Effect::CheckOccupancy {
                slot,
                debounce: false,
            });
        }

        WizardInput::CommitFailed { message, .. } => {
            // A pending uploaded candidate stays for another confirmation try
            state.committing = false;
            state.last_error = Some(message);
        }
    }

    Ok(())
}

fn invalid(step: WizardStep, action: &'static str) -> MediaError {
    MediaError::InvalidTransition { step, action }
}

fn expect_step(step: WizardStep, action: &'static str, allowed: &[WizardStep]) -> MediaResult<()> {
    if allowed.contains(&step) {
        Ok(())
    } else {
        Err(invalid(step, action))
    }
}

fn current_space(state: &WizardState, catalog: &PageCatalog) -> MediaResult<SlotSpace> {
    let page = state
        .page
        .ok_or_else(|| MediaError::Validation("Choose a page first".to_string()))?;
    catalog.slot_space(page, state.category)
}

fn selected_address(state: &WizardState, catalog: &PageCatalog) -> MediaResult<SlotAddress> {
    let space = current_space(state, catalog)?;
    let number = state
        .slot
        .number
        .ok_or_else(|| MediaError::Validation("No slot number selected yet".to_string()))?;
    catalog.address_in(&space, number)
}

fn is_current_slot(state: &WizardState, catalog: &PageCatalog, slot: &SlotAddress) -> bool {
    state.step == WizardStep::SelectSlot
        && !state.committing
        && selected_address(state, catalog).ok().as_ref() == Some(slot)
}

fn enter_select_slot(
    state: &mut WizardState,
    catalog: &PageCatalog,
    effects: &mut Vec<Effect>,
) -> MediaResult<()> {
    state.step = WizardStep::SelectSlot;
    refresh_slot(state, catalog, effects)
}

/// Re-derive the slot field for the current page/category and mode
fn refresh_slot(
    state: &mut WizardState,
    catalog: &PageCatalog,
    effects: &mut Vec<Effect>,
) -> MediaResult<()> {
    let space = current_space(state, catalog)?;

    match state.slot.mode {
        SlotMode::Auto => {
            state.slot.clamped = false;
            state.slot.status = SlotStatus::Pending;
            effects.push(Effect::SuggestSlot { space });
        }
        SlotMode::Manual => match state.slot.number {
            Some(number) => enter_manual_number(state, catalog, &space, number, false, effects),
            None => state.slot.status = SlotStatus::Unknown,
        },
    }
    Ok(())
}

fn enter_manual_number(
    state: &mut WizardState,
    catalog: &PageCatalog,
    space: &SlotSpace,
    number: i64,
    debounce: bool,
    effects: &mut Vec<Effect>,
) {
    state.slot.number = Some(number);
    state.slot.clamped = false;

    match catalog.address_in(space, number) {
        Ok(slot) => {
            state.slot.status = SlotStatus::Pending;
            effects.push(Effect::CheckOccupancy { slot, debounce });
        }
        Err(e) => {
            state.slot.status = SlotStatus::Invalid {
                message: e.to_string(),
            };
        }
    }
}

fn begin_commit(state: &mut WizardState) -> u64 {
    state.commit_attempt += 1;
    state.committing = true;
    state.commit_attempt
}

/// Cleanup for a commit or replace result nobody is waiting for, because
/// the wizard was reset, closed or has moved on to another attempt
///
/// Replacements that landed are kept: the record points at a blob that
/// exists, and the replaced asset was already released by the protocol.
pub fn abandoned_result_cleanup(input: &WizardInput) -> Vec<Effect> {
    let mut effects = Vec::new();
    match input {
        WizardInput::ReplacementRequired { pending, .. } => {
            discard_uploaded_candidate(Some(pending), &mut effects);
        }
        WizardInput::CommitFailed {
            unconfirmed_upload: Some(asset_url),
            ..
        } => effects.push(Effect::DiscardUploadedAsset {
            asset_url: asset_url.clone(),
        }),
        _ => {}
    }
    effects
}

fn discard_uploaded_candidate(pending: Option<&PendingReplacement>, effects: &mut Vec<Effect>) {
    if let Some(asset_url) = pending.and_then(|p| p.candidate.uploaded_url()) {
        effects.push(Effect::DiscardUploadedAsset {
            asset_url: asset_url.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, Page, Picture};
    use crate::services::SlotSuggestion;
    use crate::wizard::state::{FileMeta, ReplacementCandidate};
    use chrono::Utc;
    use uuid::Uuid;

    fn step(state: &WizardState, input: WizardInput) -> Transition {
        transition(state, input, &PageCatalog::builtin()).unwrap()
    }

    fn file() -> FileMeta {
        FileMeta {
            file_name: "banner.png".to_string(),
            content_type: "image/png".to_string(),
            size_bytes: 2048,
        }
    }

    fn picture_at(slot: &SlotAddress, url: &str) -> Picture {
        let now = Utc::now();
        Picture {
            id: Uuid::new_v4(),
            page: slot.page(),
            category: slot.category(),
            slot_number: slot.slot_number(),
            asset_url: url.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    fn home_slot(n: i64) -> SlotAddress {
        PageCatalog::builtin().slot_address(Page::Home, None, n).unwrap()
    }

    /// Drive a wizard to ATTACH_FILE on `home` slot 4 (auto-assigned)
    fn at_attach_file() -> WizardState {
        let catalog = PageCatalog::builtin();
        let space = catalog.slot_space(Page::Home, None).unwrap();
        let mut state = step(&WizardState::new(), WizardInput::ChoosePage(Page::Home)).state;
        state = step(&state, WizardInput::Advance).state;
        state = step(
            &state,
            WizardInput::SlotSuggested {
                space,
                suggestion: SlotSuggestion {
                    slot_number: 4,
                    clamped: false,
                },
            },
        )
        .state;
        state = step(&state, WizardInput::Advance).state;
        step(&state, WizardInput::AttachFile(file())).state
    }

    fn at_confirm_replacement(candidate: ReplacementCandidate) -> (WizardState, PendingReplacement) {
        let committing = step(&at_attach_file(), WizardInput::Commit).state;
        let slot = home_slot(4);
        let pending = PendingReplacement {
            slot,
            existing: picture_at(&slot, "/media/old.png"),
            candidate,
        };
        let state = step(
            &committing,
            WizardInput::ReplacementRequired {
                attempt: committing.commit_attempt,
                pending: pending.clone(),
            },
        )
        .state;
        (state, pending)
    }

    #[test]
    fn test_uncategorised_page_skips_category_step() {
        let state = step(&WizardState::new(), WizardInput::ChoosePage(Page::Home)).state;
        let t = step(&state, WizardInput::Advance);

        assert_eq!(t.state.step, WizardStep::SelectSlot);
        assert_eq!(
            t.step_change,
            Some(StepChange {
                from: WizardStep::SelectPage,
                to: WizardStep::SelectSlot
            })
        );
        let space = PageCatalog::builtin().slot_space(Page::Home, None).unwrap();
        assert_eq!(t.effects, vec![Effect::SuggestSlot { space }]);
        assert_eq!(t.state.slot.status, SlotStatus::Pending);
    }

    #[test]
    fn test_gallery_requires_category() {
        let state = step(&WizardState::new(), WizardInput::ChoosePage(Page::Gallery)).state;
        let state = step(&state, WizardInput::Advance).state;
        assert_eq!(state.step, WizardStep::SelectCategory);

        let err = transition(&state, WizardInput::Advance, &PageCatalog::builtin()).unwrap_err();
        assert!(matches!(err, MediaError::Validation(_)));

        let state = step(&state, WizardInput::ChooseCategory(Category::Education)).state;
        let t = step(&state, WizardInput::Advance);
        assert_eq!(t.state.step, WizardStep::SelectSlot);
        assert_eq!(t.effects.len(), 1);
    }

    #[test]
    fn test_page_selection_validation() {
        let catalog = PageCatalog::builtin();
        let fresh = WizardState::new();

        assert!(matches!(
            transition(&fresh, WizardInput::Advance, &catalog),
            Err(MediaError::Validation(_))
        ));
        assert!(matches!(
            transition(&fresh, WizardInput::ChoosePage(Page::Donate), &catalog),
            Err(MediaError::Validation(_))
        ));

        let home = step(&fresh, WizardInput::ChoosePage(Page::Home)).state;
        assert!(matches!(
            transition(&home, WizardInput::ChooseCategory(Category::General), &catalog),
            Err(MediaError::InvalidTransition { step: WizardStep::SelectPage, .. })
        ));
    }

    #[test]
    fn test_manual_entry_requests_debounced_check() {
        let state = step(&WizardState::new(), WizardInput::ChoosePage(Page::Home)).state;
        let state = step(&state, WizardInput::Advance).state;

        let t = step(&state, WizardInput::EnterSlot(3));
        assert_eq!(t.state.slot.mode, SlotMode::Manual);
        assert_eq!(t.state.slot.number, Some(3));
        assert_eq!(
            t.effects,
            vec![Effect::CheckOccupancy {
                slot: home_slot(3),
                debounce: true
            }]
        );

        let t = step(
            &t.state,
            WizardInput::OccupancyChecked {
                slot: home_slot(3),
                occupancy: Occupancy::Free,
            },
        );
        assert_eq!(t.state.slot.status, SlotStatus::Free);

        let t = step(&t.state, WizardInput::Advance);
        assert_eq!(t.state.step, WizardStep::AttachFile);
    }

    #[test]
    fn test_manual_entry_out_of_range() {
        let catalog = PageCatalog::builtin();
        let state = step(&WizardState::new(), WizardInput::ChoosePage(Page::Home)).state;
        let state = step(&state, WizardInput::Advance).state;

        let t = step(&state, WizardInput::EnterSlot(9));
        assert!(t.effects.is_empty());
        assert!(matches!(t.state.slot.status, SlotStatus::Invalid { .. }));
        assert!(matches!(
            transition(&t.state, WizardInput::Advance, &catalog),
            Err(MediaError::CapacityExceeded { requested: 9, max_slots: 5, .. })
        ));

        let t = step(&state, WizardInput::EnterSlot(0));
        assert!(matches!(
            transition(&t.state, WizardInput::Advance, &catalog),
            Err(MediaError::Validation(_))
        ));
    }

    #[test]
    fn test_stale_occupancy_result_is_ignored() {
        let state = step(&WizardState::new(), WizardInput::ChoosePage(Page::Home)).state;
        let state = step(&state, WizardInput::Advance).state;
        let state = step(&state, WizardInput::EnterSlot(2)).state;
        let state = step(&state, WizardInput::EnterSlot(3)).state;

        let t = step(
            &state,
            WizardInput::OccupancyChecked {
                slot: home_slot(2),
                occupancy: Occupancy::Occupied {
                    existing: picture_at(&home_slot(2), "/media/two.png"),
                },
            },
        );
        assert_eq!(t.state.slot.status, SlotStatus::Pending);
        assert_eq!(t.state.slot.number, Some(3));
    }

    #[test]
    fn test_clamped_suggestion_checks_occupancy() {
        let catalog = PageCatalog::builtin();
        let space = catalog.slot_space(Page::Home, None).unwrap();
        let state = step(&WizardState::new(), WizardInput::ChoosePage(Page::Home)).state;
        let state = step(&state, WizardInput::Advance).state;

        let t = step(
            &state,
            WizardInput::SlotSuggested {
                space,
                suggestion: SlotSuggestion {
                    slot_number: 5,
                    clamped: true,
                },
            },
        );
        assert!(t.state.slot.clamped);
        assert_eq!(
            t.effects,
            vec![Effect::CheckOccupancy {
                slot: home_slot(5),
                debounce: false
            }]
        );
    }

    #[test]
    fn test_commit_blocks_user_input_until_result() {
        let catalog = PageCatalog::builtin();
        let t = step(&at_attach_file(), WizardInput::Commit);
        assert!(t.state.committing);
        assert_eq!(
            t.effects,
            vec![Effect::Commit {
                attempt: 1,
                slot: home_slot(4),
                file: file()
            }]
        );

        assert!(matches!(
            transition(&t.state, WizardInput::Back, &catalog),
            Err(MediaError::InvalidTransition { .. })
        ));

        let created = picture_at(&home_slot(4), "/media/banner.png");
        let done = step(
            &t.state,
            WizardInput::Created {
                attempt: 1,
                picture: created.clone(),
            },
        );
        assert_eq!(done.state.step, WizardStep::SelectPage);
        assert_eq!(done.state.completed, Some(created));
        assert!(!done.state.committing);
        assert!(done.state.page.is_none());
    }

    #[test]
    fn test_commit_without_file() {
        let mut state = at_attach_file();
        state.file = None;
        assert!(matches!(
            transition(&state, WizardInput::Commit, &PageCatalog::builtin()),
            Err(MediaError::Validation(_))
        ));
    }

    #[test]
    fn test_commit_failure_keeps_step_for_retry() {
        let committing = step(&at_attach_file(), WizardInput::Commit).state;
        let t = step(
            &committing,
            WizardInput::CommitFailed {
                attempt: committing.commit_attempt,
                message: "Upload failed: upload timed out after 60s".to_string(),
                unconfirmed_upload: None,
            },
        );
        assert_eq!(t.state.step, WizardStep::AttachFile);
        assert!(!t.state.committing);
        assert!(t.state.last_error.is_some());

        let retry = step(&t.state, WizardInput::Commit);
        assert!(retry.state.last_error.is_none());
        assert_eq!(retry.effects.len(), 1);
    }

    #[test]
    fn test_replacement_requires_confirmation() {
        let (state, pending) =
            at_confirm_replacement(ReplacementCandidate::File { file: file() });
        assert_eq!(state.step, WizardStep::ConfirmReplacement);
        assert!(!state.committing);

        let t = step(&state, WizardInput::ConfirmReplacement);
        assert_eq!(
            t.effects,
            vec![Effect::Replace {
                attempt: 2,
                pending: pending.clone()
            }]
        );

        let mut replaced = pending.existing.clone();
        replaced.asset_url = "/media/new.png".to_string();
        let done = step(
            &t.state,
            WizardInput::Replaced {
                attempt: 2,
                picture: replaced.clone(),
            },
        );
        assert_eq!(done.state.step, WizardStep::SelectPage);
        assert_eq!(done.state.completed, Some(replaced));
    }

    #[test]
    fn test_vanished_target_returns_to_slot_selection() {
        let (state, _) = at_confirm_replacement(ReplacementCandidate::File { file: file() });
        let confirming = step(&state, WizardInput::ConfirmReplacement).state;

        let t = step(
            &confirming,
            WizardInput::ReplacementTargetVanished {
                attempt: confirming.commit_attempt,
                slot: home_slot(4),
            },
        );
        assert_eq!(t.state.step, WizardStep::SelectSlot);
        assert!(t.state.pending.is_none());
        assert!(t.state.last_error.is_some());
        assert_eq!(
            t.effects,
            vec![Effect::CheckOccupancy {
                slot: home_slot(4),
                debounce: false
            }]
        );
        assert!(!t
            .effects
            .iter()
            .any(|e| matches!(e, Effect::Commit { .. })));
    }

    #[test]
    fn test_decline_discards_uploaded_candidate() {
        let (state, _) = at_confirm_replacement(ReplacementCandidate::Uploaded {
            asset_url: "/media/orphan.png".to_string(),
            file: file(),
        });

        let t = step(&state, WizardInput::DeclineReplacement);
        assert_eq!(t.state.step, WizardStep::SelectSlot);
        assert!(t.effects.contains(&Effect::DiscardUploadedAsset {
            asset_url: "/media/orphan.png".to_string()
        }));
        assert_eq!(t.state.file, Some(file()));
    }

    #[test]
    fn test_cancel_resets_from_any_step() {
        let (confirm, _) = at_confirm_replacement(ReplacementCandidate::Uploaded {
            asset_url: "/media/orphan.png".to_string(),
            file: file(),
        });

        for state in [WizardState::new(), at_attach_file(), confirm] {
            let t = step(&state, WizardInput::Cancel);
            assert_eq!(t.state.step, WizardStep::SelectPage);
            assert!(t.state.page.is_none());
            assert!(t.state.file.is_none());
            assert!(t.state.pending.is_none());
            assert!(t
                .effects
                .iter()
                .all(|e| matches!(e, Effect::DiscardUploadedAsset { .. })));
        }
    }

    #[test]
    fn test_result_after_cancel_is_ignored() {
        let committing = step(&at_attach_file(), WizardInput::Commit).state;
        let cancelled = step(&committing, WizardInput::Cancel).state;

        let late = step(
            &cancelled,
            WizardInput::ReplacementRequired {
                attempt: committing.commit_attempt,
                pending: PendingReplacement {
                    slot: home_slot(4),
                    existing: picture_at(&home_slot(4), "/media/old.png"),
                    candidate: ReplacementCandidate::Uploaded {
                        asset_url: "/media/late.png".to_string(),
                        file: file(),
                    },
                },
            },
        );
        assert_eq!(late.state.step, WizardStep::SelectPage);
        assert_eq!(
            late.effects,
            vec![Effect::DiscardUploadedAsset {
                asset_url: "/media/late.png".to_string()
            }]
        );
    }

    #[test]
    fn test_cancel_during_replace_keeps_uploaded_candidate() {
        let (state, pending) = at_confirm_replacement(ReplacementCandidate::Uploaded {
            asset_url: "/media/raced.png".to_string(),
            file: file(),
        });
        let confirming = step(&state, WizardInput::ConfirmReplacement).state;

        let cancelled = step(&confirming, WizardInput::Cancel);
        assert_eq!(cancelled.state.step, WizardStep::SelectPage);
        assert!(cancelled.effects.is_empty(), "Replace in flight still uses the blob");

        // The replace landed after all: nothing to clean up
        let mut replaced = pending.existing.clone();
        replaced.asset_url = "/media/raced.png".to_string();
        let landed = step(
            &cancelled.state,
            WizardInput::Replaced {
                attempt: confirming.commit_attempt,
                picture: replaced,
            },
        );
        assert!(landed.effects.is_empty());
        assert!(landed.state.completed.is_none());

        // The replace stopped on the cancel: the blob is released
        let stopped = step(
            &cancelled.state,
            WizardInput::CommitFailed {
                attempt: confirming.commit_attempt,
                message: "Upload failed: upload cancelled".to_string(),
                unconfirmed_upload: Some("/media/raced.png".to_string()),
            },
        );
        assert_eq!(
            stopped.effects,
            vec![Effect::DiscardUploadedAsset {
                asset_url: "/media/raced.png".to_string()
            }]
        );
        assert!(stopped.state.last_error.is_none());
    }

    #[test]
    fn test_result_of_abandoned_attempt_does_not_close_the_next_one() {
        let first = step(&at_attach_file(), WizardInput::Commit).state;
        let cancelled = step(&first, WizardInput::Cancel).state;

        // Walk back to ATTACH_FILE for another attempt on the same slot
        let mut again = cancelled.clone();
        again.page = Some(Page::Home);
        again.step = WizardStep::AttachFile;
        again.slot.number = Some(4);
        again.slot.status = SlotStatus::Free;
        again.file = Some(file());
        let second = step(&again, WizardInput::Commit);
        let Effect::Commit { attempt, .. } = second.effects[0].clone() else {
            panic!("Commit effect expected");
        };
        assert_ne!(attempt, first.commit_attempt);

        let stale = step(
            &second.state,
            WizardInput::Created {
                attempt: first.commit_attempt,
                picture: picture_at(&home_slot(4), "/media/first.png"),
            },
        );
        assert!(stale.state.committing);
        assert_eq!(stale.state.step, WizardStep::AttachFile);
        assert!(stale.state.completed.is_none());

        let pending = PendingReplacement {
            slot: home_slot(4),
            existing: picture_at(&home_slot(4), "/media/first.png"),
            candidate: ReplacementCandidate::Uploaded {
                asset_url: "/media/second.png".to_string(),
                file: file(),
            },
        };
        let current = step(
            &stale.state,
            WizardInput::ReplacementRequired {
                attempt,
                pending: pending.clone(),
            },
        );
        assert_eq!(current.state.step, WizardStep::ConfirmReplacement);
        assert_eq!(current.state.pending, Some(pending));
        assert!(current.effects.is_empty());
    }

    #[test]
    fn test_abandoned_result_cleanup() {
        let pending = PendingReplacement {
            slot: home_slot(2),
            existing: picture_at(&home_slot(2), "/media/old.png"),
            candidate: ReplacementCandidate::File { file: file() },
        };
        assert!(abandoned_result_cleanup(&WizardInput::ReplacementRequired {
            attempt: 3,
            pending,
        })
        .is_empty());
        assert!(abandoned_result_cleanup(&WizardInput::ReplacementTargetVanished {
            attempt: 3,
            slot: home_slot(2),
        })
        .is_empty());
        assert_eq!(
            abandoned_result_cleanup(&WizardInput::CommitFailed {
                attempt: 3,
                message: "Store error".to_string(),
                unconfirmed_upload: Some("/media/left.png".to_string()),
            }),
            vec![Effect::DiscardUploadedAsset {
                asset_url: "/media/left.png".to_string()
            }]
        );
    }

    #[test]
    fn test_back_navigation() {
        let catalog = PageCatalog::builtin();
        let state = step(&WizardState::new(), WizardInput::ChoosePage(Page::Gallery)).state;
        let state = step(&state, WizardInput::Advance).state;
        let state = step(&state, WizardInput::ChooseCategory(Category::Awareness)).state;
        let state = step(&state, WizardInput::Advance).state;
        assert_eq!(state.step, WizardStep::SelectSlot);

        let back = step(&state, WizardInput::Back).state;
        assert_eq!(back.step, WizardStep::SelectCategory);
        assert_eq!(back.category, Some(Category::Awareness));

        let home = step(&WizardState::new(), WizardInput::ChoosePage(Page::Home)).state;
        let home = step(&home, WizardInput::Advance).state;
        assert_eq!(step(&home, WizardInput::Back).state.step, WizardStep::SelectPage);

        assert!(matches!(
            transition(&WizardState::new(), WizardInput::Back, &catalog),
            Err(MediaError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_reentering_slot_step_refreshes_suggestion() {
        let t = step(&at_attach_file(), WizardInput::Back);
        assert_eq!(t.state.step, WizardStep::SelectSlot);
        assert!(matches!(t.effects.as_slice(), [Effect::SuggestSlot { .. }]));
    }

    #[test]
    fn test_toggling_manual_keeps_number_and_checks_it() {
        let t = step(&at_attach_file(), WizardInput::Back);
        let space = PageCatalog::builtin().slot_space(Page::Home, None).unwrap();
        let state = step(
            &t.state,
            WizardInput::SlotSuggested {
                space,
                suggestion: SlotSuggestion {
                    slot_number: 4,
                    clamped: false,
                },
            },
        )
        .state;

        let t = step(&state, WizardInput::SetAutoAssign(false));
        assert_eq!(t.state.slot.mode, SlotMode::Manual);
        assert_eq!(
            t.effects,
            vec![Effect::CheckOccupancy {
                slot: home_slot(4),
                debounce: false
            }]
        );
    }
}
