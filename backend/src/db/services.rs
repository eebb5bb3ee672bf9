//! High-level database service layer.
//!
//! Repository-agnostic operations used by the HTTP layer. They hold the
//! rules that must not differ between backends:
//!
//! - role checks on administrative operations;
//! - course validation and filter-on-create (via [`plan_course`]);
//! - the default-to-active-semester catalog listing;
//! - state-change logging.
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  HTTP layer (http/) - identity gate, JSON   │
//! └───────────────────┬─────────────────────────┘
//!                     │
//! ┌───────────────────▼─────────────────────────┐
//! │  Service layer (services.rs)                │
//! └───────────────────┬─────────────────────────┘
//!                     │
//! ┌───────────────────▼─────────────────────────┐
//! │  Repository traits (repository/)            │
//! └───────────────────┬─────────────────────────┘
//!          ┌──────────┴──────────┐
//!   ┌──────▼──────┐       ┌──────▼──────┐
//!   │  Postgres   │       │   Local     │
//!   │  (Diesel)   │       │ (in-memory) │
//!   └─────────────┘       └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use bkd_backend::db::{services, repositories::LocalRepository};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let repo = LocalRepository::new();
//!     let semesters = services::list_semesters(&repo).await?;
//!     println!("Found {} semesters", semesters.len());
//!     Ok(())
//! }
//! ```

use chrono::NaiveDate;
use log::{info, warn};

use super::repository::{
    CascadeReport, ErrorContext, FullRepository, RepositoryError, RepositoryResult,
};
use crate::api::{CourseClassId, CourseId, SemesterId, SlotId, UserId};
use crate::models::catalog::{Course, CourseClassDetail, CourseSummary, Semester, SemesterDetail, Slot};
use crate::models::user::{Caller, NewUser, User};
use crate::services::assignment::AssignmentReceipt;
use crate::services::catalog::{plan_course, NewCourse};
use crate::services::load::{InstructorLoad, LoadChange};

// ==================== Authorization ====================

/// Fail with `Forbidden` unless the caller is an administrator.
pub fn require_admin(caller: &Caller, operation: &str) -> RepositoryResult<()> {
    if caller.is_admin() {
        return Ok(());
    }
    warn!("Rejected {} by non-admin user {}", operation, caller.user_id);
    Err(RepositoryError::forbidden_with_context(
        "Administrator role required",
        ErrorContext::new(operation).with_details(format!("caller={}", caller.user_id)),
    ))
}

/// Fail with `Forbidden` unless the caller is `user_id` or an administrator.
pub fn require_self_or_admin(caller: &Caller, user_id: UserId, operation: &str) -> RepositoryResult<()> {
    if caller.user_id == user_id {
        return Ok(());
    }
    require_admin(caller, operation)
}

// ==================== Health ====================

/// Check if the repository backend is reachable.
pub async fn health_check<R: FullRepository + ?Sized>(repo: &R) -> RepositoryResult<bool> {
    repo.health_check().await
}

// ==================== Semesters ====================

pub async fn list_semesters<R: FullRepository + ?Sized>(repo: &R) -> RepositoryResult<Vec<Semester>> {
    repo.list_semesters().await
}

pub async fn get_semester<R: FullRepository + ?Sized>(
    repo: &R,
    semester_id: SemesterId,
) -> RepositoryResult<SemesterDetail> {
    repo.get_semester(semester_id).await
}

/// Create a semester in Draft state.
pub async fn create_semester<R: FullRepository + ?Sized>(
    repo: &R,
    caller: &Caller,
    start_date: NaiveDate,
) -> RepositoryResult<Semester> {
    require_admin(caller, "create_semester")?;
    let semester = repo.create_semester(start_date).await?;
    info!(
        "Created semester {} ({}) starting {}",
        semester.id,
        semester.display_name(),
        semester.start_date
    );
    Ok(semester)
}

/// Make a semester the single active one.
pub async fn activate_semester<R: FullRepository + ?Sized>(
    repo: &R,
    caller: &Caller,
    semester_id: SemesterId,
) -> RepositoryResult<Semester> {
    require_admin(caller, "activate_semester")?;
    let semester = repo.activate_semester(semester_id).await?;
    info!("Semester {} is now active", semester.id);
    Ok(semester)
}

/// Delete a non-active semester and everything it owns.
pub async fn delete_semester<R: FullRepository + ?Sized>(
    repo: &R,
    caller: &Caller,
    semester_id: SemesterId,
) -> RepositoryResult<CascadeReport> {
    require_admin(caller, "delete_semester")?;
    repo.delete_semester(semester_id).await
}

// ==================== Catalog ====================

/// Courses of `semester_id`, or of the active semester when omitted.
///
/// Returns an empty list when no semester is given and none is active.
pub async fn list_courses<R: FullRepository + ?Sized>(
    repo: &R,
    semester_id: Option<SemesterId>,
) -> RepositoryResult<Vec<CourseSummary>> {
    let semester_id = match semester_id {
        Some(id) => id,
        None => match repo.active_semester().await? {
            Some(active) => active.id,
            None => return Ok(Vec::new()),
        },
    };
    repo.list_courses(semester_id).await
}

pub async fn get_course<R: FullRepository + ?Sized>(repo: &R, course_id: CourseId) -> RepositoryResult<Course> {
    repo.get_course(course_id).await
}

/// Validate, filter and create a course with its generated slots.
pub async fn create_course<R: FullRepository + ?Sized>(
    repo: &R,
    caller: &Caller,
    course: &NewCourse,
) -> RepositoryResult<Course> {
    require_admin(caller, "create_course")?;
    let plan = plan_course(course)?;
    let dropped = course.course_types.len() - plan.types.len();
    if dropped > 0 {
        info!(
            "Course {}: dropped {} non-positive course type entries",
            plan.code, dropped
        );
    }
    let created = repo.create_course(&plan).await?;
    info!(
        "Created course {} {} in semester {} with {} slots",
        created.id,
        created.code,
        created.semester_id,
        created.slot_count()
    );
    Ok(created)
}

pub async fn delete_course<R: FullRepository + ?Sized>(
    repo: &R,
    caller: &Caller,
    course_id: CourseId,
) -> RepositoryResult<CascadeReport> {
    require_admin(caller, "delete_course")?;
    let report = repo.delete_course(course_id).await?;
    info!(
        "Deleted course {}: {} slots removed, {} assignments released",
        course_id, report.slots_removed, report.assignments_released
    );
    Ok(report)
}

pub async fn get_course_class<R: FullRepository + ?Sized>(
    repo: &R,
    class_id: CourseClassId,
) -> RepositoryResult<CourseClassDetail> {
    repo.get_course_class(class_id).await
}

pub async fn delete_course_class<R: FullRepository + ?Sized>(
    repo: &R,
    caller: &Caller,
    class_id: CourseClassId,
) -> RepositoryResult<CascadeReport> {
    require_admin(caller, "delete_course_class")?;
    let report = repo.delete_course_class(class_id).await?;
    info!(
        "Deleted section {}: {} slots removed, {} assignments released",
        class_id, report.slots_removed, report.assignments_released
    );
    Ok(report)
}

// ==================== Slots ====================

pub async fn list_slots<R: FullRepository + ?Sized>(
    repo: &R,
    class_id: CourseClassId,
) -> RepositoryResult<Vec<Slot>> {
    repo.list_slots(class_id).await
}

pub async fn get_slot<R: FullRepository + ?Sized>(repo: &R, slot_id: SlotId) -> RepositoryResult<Slot> {
    repo.get_slot(slot_id).await
}

/// Claim a slot for the caller.
pub async fn claim_slot<R: FullRepository + ?Sized>(
    repo: &R,
    caller: &Caller,
    slot_id: SlotId,
) -> RepositoryResult<AssignmentReceipt> {
    let receipt = repo.claim_slot(slot_id, caller).await.inspect_err(|e| {
        warn!("Claim of slot {} by user {} rejected: {}", slot_id, caller.user_id, e);
    })?;
    if receipt.outcome.is_change() {
        info!("User {} claimed slot {}", caller.user_id, slot_id);
    }
    Ok(receipt)
}

/// Release a slot held by the caller (any slot for administrators).
pub async fn release_slot<R: FullRepository + ?Sized>(
    repo: &R,
    caller: &Caller,
    slot_id: SlotId,
) -> RepositoryResult<AssignmentReceipt> {
    let receipt = repo.release_slot(slot_id, caller).await.inspect_err(|e| {
        warn!("Release of slot {} by user {} rejected: {}", slot_id, caller.user_id, e);
    })?;
    if receipt.outcome.is_change() {
        info!("User {} released slot {}", caller.user_id, slot_id);
    }
    Ok(receipt)
}

/// Administrative correction of a slot's occupant.
pub async fn reassign_slot<R: FullRepository + ?Sized>(
    repo: &R,
    caller: &Caller,
    slot_id: SlotId,
    occupant: Option<UserId>,
) -> RepositoryResult<AssignmentReceipt> {
    let receipt = repo.reassign_slot(slot_id, occupant, caller).await?;
    if receipt.outcome.is_change() {
        info!(
            "Admin {} reassigned slot {} to {:?}",
            caller.user_id, slot_id, occupant
        );
    }
    Ok(receipt)
}

// ==================== Loads ====================

pub async fn instructor_load<R: FullRepository + ?Sized>(
    repo: &R,
    caller: &Caller,
    user_id: UserId,
    semester_id: SemesterId,
) -> RepositoryResult<InstructorLoad> {
    require_self_or_admin(caller, user_id, "instructor_load")?;
    repo.instructor_load(user_id, semester_id).await
}

pub async fn user_semesters<R: FullRepository + ?Sized>(
    repo: &R,
    caller: &Caller,
    user_id: UserId,
) -> RepositoryResult<Vec<InstructorLoad>> {
    require_self_or_admin(caller, user_id, "user_semesters")?;
    repo.instructor_semesters(user_id).await
}

pub async fn semester_loads<R: FullRepository + ?Sized>(
    repo: &R,
    caller: &Caller,
    semester_id: SemesterId,
) -> RepositoryResult<Vec<InstructorLoad>> {
    require_admin(caller, "semester_loads")?;
    repo.semester_loads(semester_id).await
}

/// Rebuild every stored load of a semester from slot occupancy.
pub async fn recompute_semester<R: FullRepository + ?Sized>(
    repo: &R,
    caller: &Caller,
    semester_id: SemesterId,
) -> RepositoryResult<Vec<LoadChange>> {
    require_admin(caller, "recompute_all")?;
    let changes = repo.recompute_all(semester_id).await?;
    if !changes.is_empty() {
        warn!(
            "Recompute of semester {} corrected {} stored loads",
            semester_id,
            changes.len()
        );
    }
    Ok(changes)
}

// ==================== Users ====================

pub async fn create_user<R: FullRepository + ?Sized>(
    repo: &R,
    caller: &Caller,
    user: &NewUser,
) -> RepositoryResult<User> {
    require_admin(caller, "create_user")?;
    let user = user.normalized().map_err(|message| {
        RepositoryError::validation_with_context(message, ErrorContext::new("create_user").with_entity("user"))
    })?;
    let created = repo.create_user(&user).await?;
    info!("Created user {} ({})", created.id, created.initials);
    Ok(created)
}

pub async fn list_users<R: FullRepository + ?Sized>(repo: &R, caller: &Caller) -> RepositoryResult<Vec<User>> {
    require_admin(caller, "list_users")?;
    repo.list_users().await
}

pub async fn get_user<R: FullRepository + ?Sized>(
    repo: &R,
    caller: &Caller,
    user_id: UserId,
) -> RepositoryResult<User> {
    require_self_or_admin(caller, user_id, "get_user")?;
    repo.get_user(user_id).await
}

/// Activate or deactivate an account. Deactivation releases the user's
/// slots in the active semester.
pub async fn set_user_active<R: FullRepository + ?Sized>(
    repo: &R,
    caller: &Caller,
    user_id: UserId,
    is_active: bool,
) -> RepositoryResult<(User, Vec<LoadChange>)> {
    require_admin(caller, "set_user_active")?;
    if !is_active && caller.user_id == user_id {
        return Err(RepositoryError::conflict_with_context(
            "Administrators cannot deactivate themselves",
            ErrorContext::new("set_user_active").with_entity_id(user_id),
        ));
    }
    let (user, loads) = repo.set_user_active(user_id, is_active).await?;
    info!(
        "User {} ({}) is now {}",
        user.id,
        user.initials,
        if user.is_active { "active" } else { "inactive" }
    );
    Ok((user, loads))
}

/// Make sure an administrator with `initials` exists, creating it if needed.
///
/// An existing account with those initials is returned unchanged, even if it
/// is not an administrator.
pub async fn ensure_admin<R: FullRepository + ?Sized>(
    repo: &R,
    name: &str,
    initials: &str,
) -> RepositoryResult<User> {
    let admin = NewUser::admin(name, initials)
        .normalized()
        .map_err(RepositoryError::configuration)?;
    if let Some(existing) = repo.find_user_by_initials(&admin.initials).await? {
        if !existing.is_admin {
            warn!(
                "Bootstrap initials {} belong to a non-admin user {}",
                existing.initials, existing.id
            );
        }
        return Ok(existing);
    }
    let created = repo.create_user(&admin).await?;
    info!("Bootstrapped administrator {} ({})", created.id, created.initials);
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::LocalRepository;
    use crate::models::credit::{CourseKind, CourseTypeSpec};
    use crate::services::assignment::AssignmentOutcome;

    async fn setup() -> (LocalRepository, Caller, Caller) {
        let repo = LocalRepository::new();
        let admin = ensure_admin(&repo, "Administrator", "adm").await.unwrap();
        let admin = Caller::from(&admin);
        let instructor = create_user(&repo, &admin, &NewUser::new("Ina", "ina"))
            .await
            .unwrap();
        (repo, admin, Caller::from(&instructor))
    }

    #[tokio::test]
    async fn test_ensure_admin_is_idempotent() {
        let repo = LocalRepository::new();
        let first = ensure_admin(&repo, "Administrator", "ADM").await.unwrap();
        let second = ensure_admin(&repo, "Someone Else", "adm").await.unwrap();
        assert_eq!(first.id, second.id);
        assert!(second.is_admin);
    }

    #[tokio::test]
    async fn test_admin_operations_reject_instructors() {
        let (repo, _, instructor) = setup().await;
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let err = create_semester(&repo, &instructor, date).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Forbidden { .. }));
        let err = list_users(&repo, &instructor).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Forbidden { .. }));
    }

    #[tokio::test]
    async fn test_list_courses_defaults_to_active_semester() {
        let (repo, admin, _) = setup().await;
        assert!(list_courses(&repo, None).await.unwrap().is_empty());

        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let semester = create_semester(&repo, &admin, date).await.unwrap();
        let course = NewCourse::new(semester.id, "cs101", "Programming")
            .with_type(CourseTypeSpec::new(CourseKind::Lecture, 3.0, 1));
        create_course(&repo, &admin, &course).await.unwrap();

        assert!(list_courses(&repo, None).await.unwrap().is_empty());
        activate_semester(&repo, &admin, semester.id).await.unwrap();
        let courses = list_courses(&repo, None).await.unwrap();
        assert_eq!(courses.len(), 1);
        assert_eq!(courses[0].code, "CS101");
    }

    #[tokio::test]
    async fn test_loads_visible_to_self_and_admin_only() {
        let (repo, admin, instructor) = setup().await;
        let other = create_user(&repo, &admin, &NewUser::new("Oscar", "OSC"))
            .await
            .unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let semester = create_semester(&repo, &admin, date).await.unwrap();

        assert!(instructor_load(&repo, &instructor, instructor.user_id, semester.id)
            .await
            .is_ok());
        assert!(instructor_load(&repo, &admin, instructor.user_id, semester.id)
            .await
            .is_ok());
        let err = instructor_load(&repo, &instructor, other.id, semester.id)
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Forbidden { .. }));
    }

    #[tokio::test]
    async fn test_deactivation_releases_active_slots() {
        let (repo, admin, instructor) = setup().await;
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let semester = create_semester(&repo, &admin, date).await.unwrap();
        activate_semester(&repo, &admin, semester.id).await.unwrap();
        let course = create_course(
            &repo,
            &admin,
            &NewCourse::new(semester.id, "CS101", "Programming")
                .with_type(CourseTypeSpec::new(CourseKind::Lecture, 3.0, 1)),
        )
        .await
        .unwrap();
        let slot_id = course.course_types[0].classes[0].slots[0].id;

        let receipt = claim_slot(&repo, &instructor, slot_id).await.unwrap();
        assert_eq!(receipt.outcome, AssignmentOutcome::Claimed);

        let (user, loads) = set_user_active(&repo, &admin, instructor.user_id, false)
            .await
            .unwrap();
        assert!(!user.is_active);
        assert_eq!(loads.len(), 1);
        assert_eq!(loads[0].bkd, 0.0);
        assert!(get_slot(&repo, slot_id).await.unwrap().occupant.is_none());

        let err = claim_slot(&repo, &instructor, slot_id).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Forbidden { .. }));
    }

    #[tokio::test]
    async fn test_admin_cannot_deactivate_self() {
        let (repo, admin, _) = setup().await;
        let err = set_user_active(&repo, &admin, admin.user_id, false)
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict { .. }));
    }
}
