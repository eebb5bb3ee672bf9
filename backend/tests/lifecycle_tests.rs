//! Semester lifecycle, catalog editing windows and cascading deletes.

mod support;

use bkd_backend::api::{CourseKind, CourseTypeSpec, SemesterState};
use bkd_backend::db::{services, RepositoryError};
use bkd_backend::services::NewCourse;
use support::{date, Campus};

#[tokio::test]
async fn test_activation_keeps_a_single_active_semester() {
    let campus = Campus::new().await;
    assert_eq!(campus.semester.state(), SemesterState::Active);
    assert_eq!(campus.semester.display_name(), "Odd 2024/2025");

    let next = services::create_semester(&campus.repo, &campus.admin, date(2025, 2, 3))
        .await
        .unwrap();
    assert_eq!(next.state(), SemesterState::Draft);
    assert_eq!(next.display_name(), "Even 2024/2025");

    services::activate_semester(&campus.repo, &campus.admin, next.id)
        .await
        .unwrap();

    let semesters = services::list_semesters(&campus.repo).await.unwrap();
    let active: Vec<_> = semesters.iter().filter(|s| s.is_active).collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, next.id);

    let old = semesters.iter().find(|s| s.id == campus.semester.id).unwrap();
    assert_eq!(old.state(), SemesterState::Archived);

    // Re-activating the current semester is a no-op.
    let again = services::activate_semester(&campus.repo, &campus.admin, next.id)
        .await
        .unwrap();
    assert_eq!(again.activated_at, active[0].activated_at);
}

#[tokio::test]
async fn test_archived_semester_is_read_only() {
    let campus = Campus::new().await;
    let alice = Campus::caller(&campus.alice);
    let held = support::slot_of(&campus.course, CourseKind::Lecture, 0, 0);
    services::claim_slot(&campus.repo, &alice, held).await.unwrap();

    let next = services::create_semester(&campus.repo, &campus.admin, date(2025, 2, 3))
        .await
        .unwrap();
    services::activate_semester(&campus.repo, &campus.admin, next.id)
        .await
        .unwrap();

    let free = support::slot_of(&campus.course, CourseKind::Tutorial, 0, 0);
    let err = services::claim_slot(&campus.repo, &alice, free).await.unwrap_err();
    assert!(matches!(err, RepositoryError::SemesterClosed { .. }));

    let err = services::release_slot(&campus.repo, &alice, held).await.unwrap_err();
    assert!(matches!(err, RepositoryError::SemesterClosed { .. }));

    let err = services::delete_course(&campus.repo, &campus.admin, campus.course.id)
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::SemesterClosed { .. }));

    let late = NewCourse::new(campus.semester.id, "IF9999", "Too Late");
    let err = services::create_course(&campus.repo, &campus.admin, &late)
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::SemesterClosed { .. }));

    // History survives: the archived load is still readable.
    let load = services::instructor_load(&campus.repo, &alice, campus.alice.id, campus.semester.id)
        .await
        .unwrap();
    assert_eq!(load.bkd, 3.0);

    // And the user's current BKD follows the new active semester.
    let me = services::get_user(&campus.repo, &alice, campus.alice.id)
        .await
        .unwrap();
    assert_eq!(me.bkd, 0.0);
}

#[tokio::test]
async fn test_reactivation_drops_holdings_of_deactivated_users() {
    let campus = Campus::new().await;
    let alice = Campus::caller(&campus.alice);
    let bob = Campus::caller(&campus.bob);
    let held = support::slot_of(&campus.course, CourseKind::Lecture, 0, 0);
    let kept = support::slot_of(&campus.course, CourseKind::Tutorial, 0, 0);
    services::claim_slot(&campus.repo, &alice, held).await.unwrap();
    services::claim_slot(&campus.repo, &bob, kept).await.unwrap();

    let next = services::create_semester(&campus.repo, &campus.admin, date(2025, 2, 3))
        .await
        .unwrap();
    services::activate_semester(&campus.repo, &campus.admin, next.id)
        .await
        .unwrap();

    // Nothing held in the new active semester, so nothing is released here.
    let (_, loads) = services::set_user_active(&campus.repo, &campus.admin, campus.alice.id, false)
        .await
        .unwrap();
    assert!(loads.is_empty());

    services::activate_semester(&campus.repo, &campus.admin, campus.semester.id)
        .await
        .unwrap();

    let slot = services::get_slot(&campus.repo, held).await.unwrap();
    assert!(slot.is_empty());
    let slot = services::get_slot(&campus.repo, kept).await.unwrap();
    assert_eq!(slot.occupant, Some(campus.bob.id));

    let user = services::get_user(&campus.repo, &campus.admin, campus.alice.id)
        .await
        .unwrap();
    assert!(!user.is_active);
    assert_eq!(user.bkd, 0.0);
    let load = services::instructor_load(&campus.repo, &campus.admin, campus.alice.id, campus.semester.id)
        .await
        .unwrap();
    assert_eq!(load.bkd, 0.0);

    let changes = services::recompute_semester(&campus.repo, &campus.admin, campus.semester.id)
        .await
        .unwrap();
    assert!(changes.iter().all(|c| !c.is_changed()));
}

#[tokio::test]
async fn test_draft_semester_accepts_catalog_but_not_claims() {
    let campus = Campus::new().await;
    let alice = Campus::caller(&campus.alice);
    let draft = services::create_semester(&campus.repo, &campus.admin, date(2025, 2, 3))
        .await
        .unwrap();

    let course = services::create_course(
        &campus.repo,
        &campus.admin,
        &NewCourse::new(draft.id, "if3130", "Computer Networks")
            .with_type(CourseTypeSpec::new(CourseKind::Lecture, 3.0, 1)),
    )
    .await
    .unwrap();
    assert_eq!(course.code, "IF3130");

    let slot = support::slot_of(&course, CourseKind::Lecture, 0, 0);
    let err = services::claim_slot(&campus.repo, &alice, slot).await.unwrap_err();
    assert!(matches!(err, RepositoryError::SemesterClosed { .. }));

    // Slots of non-active semesters are hidden from point lookups.
    let err = services::get_slot(&campus.repo, slot).await.unwrap_err();
    assert!(matches!(err, RepositoryError::NotFound { .. }));
}

#[tokio::test]
async fn test_active_semester_cannot_be_deleted() {
    let campus = Campus::new().await;
    let err = services::delete_semester(&campus.repo, &campus.admin, campus.semester.id)
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::Conflict { .. }));

    let alice = Campus::caller(&campus.alice);
    let err = services::delete_semester(&campus.repo, &alice, campus.semester.id)
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::Forbidden { .. }));
}

#[tokio::test]
async fn test_deleting_archived_semester_cascades() {
    let campus = Campus::new().await;
    let alice = Campus::caller(&campus.alice);
    services::claim_slot(
        &campus.repo,
        &alice,
        support::slot_of(&campus.course, CourseKind::Practicum, 0, 0),
    )
    .await
    .unwrap();

    let next = services::create_semester(&campus.repo, &campus.admin, date(2025, 2, 3))
        .await
        .unwrap();
    services::activate_semester(&campus.repo, &campus.admin, next.id)
        .await
        .unwrap();

    let report = services::delete_semester(&campus.repo, &campus.admin, campus.semester.id)
        .await
        .unwrap();
    assert_eq!(report.courses_removed, 1);
    assert_eq!(report.classes_removed, 4);
    assert_eq!(report.slots_removed, 6);
    assert_eq!(report.assignments_released, 1);

    let err = services::get_course(&campus.repo, campus.course.id)
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::NotFound { .. }));

    let history = services::user_semesters(&campus.repo, &alice, campus.alice.id)
        .await
        .unwrap();
    assert!(history.is_empty());
}

#[tokio::test]
async fn test_deleting_section_recomputes_holders() {
    let campus = Campus::new().await;
    let bob = Campus::caller(&campus.bob);
    for section in 0..2 {
        services::claim_slot(
            &campus.repo,
            &bob,
            support::slot_of(&campus.course, CourseKind::Lecture, section, 0),
        )
        .await
        .unwrap();
    }

    let class_id = campus.course.course_types[0].classes[1].id;
    let report = services::delete_course_class(&campus.repo, &campus.admin, class_id)
        .await
        .unwrap();
    assert_eq!(report.slots_removed, 2);
    assert_eq!(report.assignments_released, 1);
    assert_eq!(report.loads.len(), 1);
    assert_eq!(report.loads[0].previous, 6.0);
    assert_eq!(report.loads[0].bkd, 3.0);

    let course = services::get_course(&campus.repo, campus.course.id)
        .await
        .unwrap();
    assert_eq!(course.course_types[0].class_count, 1);
    assert_eq!(course.course_types[0].classes.len(), 1);
}

#[tokio::test]
async fn test_deleting_course_releases_every_holder() {
    let campus = Campus::new().await;
    let alice = Campus::caller(&campus.alice);
    let bob = Campus::caller(&campus.bob);
    services::claim_slot(
        &campus.repo,
        &alice,
        support::slot_of(&campus.course, CourseKind::Lecture, 0, 0),
    )
    .await
    .unwrap();
    services::claim_slot(
        &campus.repo,
        &bob,
        support::slot_of(&campus.course, CourseKind::Tutorial, 0, 0),
    )
    .await
    .unwrap();

    let report = services::delete_course(&campus.repo, &campus.admin, campus.course.id)
        .await
        .unwrap();
    assert_eq!(report.courses_removed, 1);
    assert_eq!(report.assignments_released, 2);
    assert!(report.loads.iter().all(|l| l.bkd == 0.0));

    let courses = services::list_courses(&campus.repo, None).await.unwrap();
    assert!(courses.is_empty());
}

#[tokio::test]
async fn test_catalog_filter_and_listing() {
    let campus = Campus::new().await;

    let course = services::create_course(
        &campus.repo,
        &campus.admin,
        &NewCourse::new(campus.semester.id, "IF1210", "Basic Programming")
            .with_type(CourseTypeSpec::new(CourseKind::Lecture, 2.0, 1))
            .with_type(CourseTypeSpec::new(CourseKind::Practicum, 0.0, 3))
            .with_type(CourseTypeSpec::new(CourseKind::Tutorial, 1.0, 0)),
    )
    .await
    .unwrap();
    assert_eq!(course.course_types.len(), 1);
    assert_eq!(course.course_types[0].kind, CourseKind::Lecture);
    assert_eq!(course.slot_count(), 1);

    let empty = services::create_course(
        &campus.repo,
        &campus.admin,
        &NewCourse::new(campus.semester.id, "IF1000", "Seminar")
            .with_type(CourseTypeSpec::new(CourseKind::Tutorial, -1.0, 2)),
    )
    .await
    .unwrap();
    assert!(empty.course_types.is_empty());

    let err = services::create_course(
        &campus.repo,
        &campus.admin,
        &NewCourse::new(campus.semester.id, "if2211", "Duplicate Code"),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, RepositoryError::Conflict { .. }));

    let codes: Vec<String> = services::list_courses(&campus.repo, None)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.code)
        .collect();
    assert_eq!(codes, vec!["IF1000", "IF1210", "IF2211"]);

    let detail = services::get_semester(&campus.repo, campus.semester.id)
        .await
        .unwrap();
    assert_eq!(detail.courses.len(), 3);
}

#[tokio::test]
async fn test_course_listing_without_active_semester_is_empty() {
    let repo = bkd_backend::db::LocalRepository::new();
    assert!(services::list_courses(&repo, None).await.unwrap().is_empty());
}
