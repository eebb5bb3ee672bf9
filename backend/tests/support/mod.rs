//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Mutex;

use chrono::NaiveDate;

use bkd_backend::api::{Caller, Course, CourseKind, CourseTypeSpec, NewUser, Semester, SlotId, User};
use bkd_backend::db::{services, LocalRepository};
use bkd_backend::services::NewCourse;

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Runs `f` with environment variables temporarily modified.
///
/// This is panic-safe (restores variables on unwind) and also serializes access to
/// process-global env vars to avoid flaky tests when Rust runs tests in parallel.
///
/// `changes` is a list of `(key, value)` pairs:
/// - `Some(v)` sets the variable to `v`
/// - `None` removes the variable
pub fn with_scoped_env<F, R>(changes: &[(&str, Option<&str>)], f: F) -> R
where
    F: FnOnce() -> R,
{
    let _lock = ENV_LOCK.lock().expect("ENV_LOCK poisoned");
    let _guard = ScopedEnv::new(changes);
    f()
}

struct ScopedEnv {
    snapshot: Vec<(String, Option<String>)>,
}

impl ScopedEnv {
    fn new(changes: &[(&str, Option<&str>)]) -> Self {
        let keys: HashSet<&str> = changes.iter().map(|(k, _)| *k).collect();
        let snapshot = keys
            .into_iter()
            .map(|k| (k.to_string(), std::env::var(k).ok()))
            .collect::<Vec<_>>();

        for (k, v) in changes {
            match v {
                Some(val) => std::env::set_var(k, val),
                None => std::env::remove_var(k),
            }
        }

        Self { snapshot }
    }
}

impl Drop for ScopedEnv {
    fn drop(&mut self) {
        for (k, v) in self.snapshot.drain(..) {
            match v {
                Some(val) => std::env::set_var(&k, val),
                None => std::env::remove_var(&k),
            }
        }
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Lecture 3.0 in two sections of two meetings, practicum 1.0 and tutorial
/// 1.0 with one section each: six slots.
pub fn algorithms_course(semester: &Semester) -> NewCourse {
    NewCourse::new(semester.id, "IF2211", "Algorithm Strategies")
        .with_type(CourseTypeSpec::new(CourseKind::Lecture, 3.0, 2).with_meetings(2))
        .with_type(CourseTypeSpec::new(CourseKind::Practicum, 1.0, 1))
        .with_type(CourseTypeSpec::new(CourseKind::Tutorial, 1.0, 1))
}

/// Slot ids of one course by kind, section index and meeting index.
pub fn slot_of(course: &Course, kind: CourseKind, section: usize, meeting: usize) -> SlotId {
    course
        .course_types
        .iter()
        .find(|t| t.kind == kind)
        .map(|t| t.classes[section].slots[meeting].id)
        .unwrap()
}

/// A repository with an administrator and two instructors, one draft
/// semester turned active, and [`algorithms_course`] in it.
pub struct Campus {
    pub repo: LocalRepository,
    pub admin: Caller,
    pub alice: User,
    pub bob: User,
    pub semester: Semester,
    pub course: Course,
}

impl Campus {
    pub async fn new() -> Self {
        let repo = LocalRepository::new();
        let admin_user = services::ensure_admin(&repo, "Administrator", "ADM")
            .await
            .unwrap();
        let admin = Caller::from(&admin_user);

        let alice = services::create_user(&repo, &admin, &NewUser::new("Alice Lestari", "alc"))
            .await
            .unwrap();
        let bob = services::create_user(&repo, &admin, &NewUser::new("Bob Santoso", "BOB"))
            .await
            .unwrap();

        let semester = services::create_semester(&repo, &admin, date(2024, 8, 26))
            .await
            .unwrap();
        let course = services::create_course(&repo, &admin, &algorithms_course(&semester))
            .await
            .unwrap();
        let semester = services::activate_semester(&repo, &admin, semester.id)
            .await
            .unwrap();

        Self {
            repo,
            admin,
            alice,
            bob,
            semester,
            course,
        }
    }

    pub fn caller(user: &User) -> Caller {
        Caller::from(user)
    }
}
