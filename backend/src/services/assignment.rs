//! Slot assignment rules.
//!
//! A slot is either empty or occupied by one instructor. The functions here
//! decide a transition from the state read under the slot's lock; the
//! repository applies it together with the load recompute, so a decision and
//! its effects are never observed separately.

use serde::{Deserialize, Serialize};

use crate::api::{SlotId, UserId};
use crate::db::repository::{ErrorContext, RepositoryError, RepositoryResult};
use crate::models::catalog::{Semester, Slot};
use crate::models::user::{Caller, User};
use crate::services::lifecycle;
use crate::services::load::LoadChange;

/// Result of an assignment request. Idempotent repeats are successes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentOutcome {
    Claimed,
    /// The caller already held the slot.
    AlreadyAssigned,
    Released,
    /// The slot was already empty.
    AlreadyEmpty,
    Reassigned,
    /// Reassignment to the current occupant.
    Unchanged,
}

impl AssignmentOutcome {
    pub fn is_change(self) -> bool {
        matches!(
            self,
            AssignmentOutcome::Claimed | AssignmentOutcome::Released | AssignmentOutcome::Reassigned
        )
    }
}

/// A decided change of one slot's occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotTransition {
    pub slot_id: SlotId,
    pub previous: Option<UserId>,
    pub next: Option<UserId>,
    pub outcome: AssignmentOutcome,
}

impl SlotTransition {
    fn new(slot: &Slot, next: Option<UserId>, outcome: AssignmentOutcome) -> Self {
        Self {
            slot_id: slot.id,
            previous: slot.occupant,
            next,
            outcome,
        }
    }

    /// Instructors whose load must be recomputed: old and new occupant of a
    /// changed slot, nobody for an idempotent repeat.
    pub fn affected(&self) -> Vec<UserId> {
        if !self.outcome.is_change() {
            return Vec::new();
        }
        let mut users: Vec<UserId> = self.previous.into_iter().chain(self.next).collect();
        users.dedup();
        users
    }
}

/// Authoritative post-mutation state returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentReceipt {
    pub slot: Slot,
    pub outcome: AssignmentOutcome,
    /// New load of every instructor touched by the change.
    pub loads: Vec<LoadChange>,
}

fn slot_context(operation: &str, slot: &Slot) -> ErrorContext {
    ErrorContext::new(operation)
        .with_entity("slot")
        .with_entity_id(slot.id)
}

/// Decide a claim of `slot` by `instructor`.
pub fn plan_claim(slot: &Slot, semester: &Semester, instructor: &User) -> RepositoryResult<SlotTransition> {
    lifecycle::ensure_open_for_assignment(semester, "claim_slot")?;

    if !instructor.is_active {
        return Err(RepositoryError::forbidden_with_context(
            format!("Instructor {} is not active", instructor.initials),
            slot_context("claim_slot", slot).with_details(format!("user={}", instructor.id)),
        ));
    }

    match slot.occupant {
        None => Ok(SlotTransition::new(
            slot,
            Some(instructor.id),
            AssignmentOutcome::Claimed,
        )),
        Some(current) if current == instructor.id => Ok(SlotTransition::new(
            slot,
            Some(current),
            AssignmentOutcome::AlreadyAssigned,
        )),
        Some(current) => Err(RepositoryError::conflict_with_context(
            format!("Slot {} is already held by another instructor", slot.id),
            slot_context("claim_slot", slot).with_details(format!("occupant={}", current)),
        )),
    }
}

/// Decide a release of `slot` requested by `caller`.
pub fn plan_release(slot: &Slot, semester: &Semester, caller: &Caller) -> RepositoryResult<SlotTransition> {
    lifecycle::ensure_open_for_assignment(semester, "release_slot")?;

    match slot.occupant {
        None => Ok(SlotTransition::new(slot, None, AssignmentOutcome::AlreadyEmpty)),
        Some(current) if current == caller.user_id || caller.is_admin() => {
            Ok(SlotTransition::new(slot, None, AssignmentOutcome::Released))
        }
        Some(current) => Err(RepositoryError::forbidden_with_context(
            format!("Slot {} is held by another instructor", slot.id),
            slot_context("release_slot", slot).with_details(format!("occupant={}", current)),
        )),
    }
}

/// Reject non-admin reassignment before any slot or target is resolved.
pub fn ensure_can_reassign(caller: &Caller) -> RepositoryResult<()> {
    if caller.is_admin() {
        return Ok(());
    }
    Err(RepositoryError::forbidden_with_context(
        "Only administrators can reassign slots",
        ErrorContext::new("reassign_slot").with_details(format!("caller={}", caller.user_id)),
    ))
}

/// Decide an administrative correction setting the occupant of `slot` to
/// `target` (or clearing it), regardless of who holds it now.
pub fn plan_reassign(
    slot: &Slot,
    semester: &Semester,
    caller: &Caller,
    target: Option<&User>,
) -> RepositoryResult<SlotTransition> {
    ensure_can_reassign(caller)?;
    lifecycle::ensure_open_for_assignment(semester, "reassign_slot")?;

    if let Some(user) = target {
        if !user.is_active {
            return Err(RepositoryError::conflict_with_context(
                format!("Instructor {} is not active", user.initials),
                slot_context("reassign_slot", slot).with_details(format!("user={}", user.id)),
            ));
        }
    }

    let next = target.map(|u| u.id);
    let outcome = if next == slot.occupant {
        AssignmentOutcome::Unchanged
    } else {
        AssignmentOutcome::Reassigned
    };
    Ok(SlotTransition::new(slot, next, outcome))
}
