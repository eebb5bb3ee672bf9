//! Semester lifecycle rules.
//!
//! ```text
//!   create ──► Draft ──activate──► Active ──(another activated)──► Archived
//!                                    ▲                                 │
//!                                    └──────────── activate ───────────┘
//! ```
//!
//! Exactly one semester may be active. Activation flips every flag in one
//! step under the semester table's lock; there is no standalone deactivation.

use chrono::{DateTime, Datelike, NaiveDate, Utc};

use crate::api::SemesterId;
use crate::db::repository::{ErrorContext, RepositoryError, RepositoryResult};
use crate::models::catalog::{Semester, SemesterState};

pub const MIN_START_YEAR: i32 = 1900;
pub const MAX_START_YEAR: i32 = 9999;

fn semester_context(operation: &str, semester: &Semester) -> ErrorContext {
    ErrorContext::new(operation)
        .with_entity("semester")
        .with_entity_id(semester.id)
        .with_details(format!("state={:?}", semester.state()))
}

pub fn validate_start_date(date: NaiveDate) -> RepositoryResult<()> {
    if !(MIN_START_YEAR..=MAX_START_YEAR).contains(&date.year()) {
        return Err(RepositoryError::validation_with_context(
            format!(
                "Semester start date {} must fall between years {} and {}",
                date, MIN_START_YEAR, MAX_START_YEAR
            ),
            ErrorContext::new("create_semester").with_entity("semester"),
        ));
    }
    Ok(())
}

/// Slots can only be claimed, released or reassigned in the active semester.
pub fn ensure_open_for_assignment(semester: &Semester, operation: &str) -> RepositoryResult<()> {
    if semester.is_active {
        return Ok(());
    }
    Err(RepositoryError::semester_closed_with_context(
        format!("Semester {} is not the active semester", semester.display_name()),
        semester_context(operation, semester),
    ))
}

/// Draft and active catalogs are editable; archived ones are frozen snapshots.
pub fn ensure_catalog_editable(semester: &Semester, operation: &str) -> RepositoryResult<()> {
    if semester.state() == SemesterState::Archived {
        return Err(RepositoryError::semester_closed_with_context(
            format!("Semester {} is archived", semester.display_name()),
            semester_context(operation, semester),
        ));
    }
    Ok(())
}

pub fn ensure_deletable(semester: &Semester) -> RepositoryResult<()> {
    if semester.is_active {
        return Err(RepositoryError::conflict_with_context(
            format!(
                "Semester {} is active and cannot be deleted",
                semester.display_name()
            ),
            semester_context("delete_semester", semester),
        ));
    }
    Ok(())
}

/// Apply an activation to the whole semester collection.
///
/// The caller must hold the collection's exclusive lock. Returns `false` when
/// the target does not exist, in which case nothing is modified.
pub fn apply_activation<'a>(
    semesters: impl IntoIterator<Item = &'a mut Semester>,
    target: SemesterId,
    now: DateTime<Utc>,
) -> bool {
    let mut all: Vec<&'a mut Semester> = semesters.into_iter().collect();
    if !all.iter().any(|s| s.id == target) {
        return false;
    }
    for semester in all.iter_mut() {
        semester.is_active = semester.id == target;
        if semester.is_active && semester.activated_at.is_none() {
            semester.activated_at = Some(now);
        }
    }
    true
}
