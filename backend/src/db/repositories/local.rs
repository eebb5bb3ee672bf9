//! In-memory local repository implementation.
//!
//! This module provides a local implementation of all repository traits
//! suitable for unit testing, local development and single-process
//! deployments. All data lives in ordered maps behind one
//! `parking_lot::RwLock`:
//!
//! - every mutation (claim, release, reassign, activation, cascade delete)
//!   runs under the write lock, so the slot compare-and-set, the semester
//!   flag flip and the load recompute it triggers are one atomic step;
//! - reads take the shared lock and therefore always see a consistent
//!   snapshot of slots and loads.
//!
//! Methods never hold the lock across an `.await`.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use log::{debug, info, warn};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use crate::api::{CourseClassId, CourseId, CourseTypeId, SemesterId, SlotId, UserId};
use crate::db::repository::*;
use crate::models::catalog::{
    Course, CourseClass, CourseClassDetail, CourseSummary, CourseType, Semester, SemesterDetail,
    Slot,
};
use crate::models::credit::{self, CourseKind};
use crate::models::user::{Caller, NewUser, User};
use crate::services::assignment::{self, AssignmentReceipt, SlotTransition};
use crate::services::catalog::CoursePlan;
use crate::services::lifecycle;
use crate::services::load::{self, Holding, InstructorLoad, LoadChange};

/// In-memory local repository.
///
/// # Example
/// ```
/// use bkd_backend::db::repositories::LocalRepository;
/// use bkd_backend::db::repository::SemesterRepository;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let repo = LocalRepository::new();
/// let date = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
/// let semester = repo.create_semester(date).await.unwrap();
/// assert!(!semester.is_active);
/// # }
/// ```
#[derive(Clone)]
pub struct LocalRepository {
    data: Arc<RwLock<LocalData>>,
}

#[derive(Debug, Clone)]
struct CourseRow {
    semester_id: SemesterId,
    code: String,
    name: String,
    study_semesters: Option<String>,
}

#[derive(Debug, Clone)]
struct CourseTypeRow {
    course_id: CourseId,
    kind: CourseKind,
    credit: f64,
    class_count: u32,
}

#[derive(Debug, Clone)]
struct ClassRow {
    course_type_id: CourseTypeId,
    number: u32,
}

#[derive(Debug, Clone)]
struct SlotRow {
    class_id: CourseClassId,
    meeting_number: u32,
    occupant: Option<UserId>,
}

#[derive(Debug, Clone)]
struct UserRow {
    name: String,
    initials: String,
    is_admin: bool,
    is_active: bool,
}

struct LocalData {
    semesters: BTreeMap<SemesterId, Semester>,
    courses: BTreeMap<CourseId, CourseRow>,
    course_types: BTreeMap<CourseTypeId, CourseTypeRow>,
    classes: BTreeMap<CourseClassId, ClassRow>,
    slots: BTreeMap<SlotId, SlotRow>,
    users: BTreeMap<UserId, UserRow>,

    // Stored per-semester load, kept in step with slot occupancy
    loads: HashMap<(UserId, SemesterId), f64>,

    // ID counter shared by every table
    next_id: i64,

    // Connection health
    is_healthy: bool,
}

impl Default for LocalData {
    fn default() -> Self {
        Self {
            semesters: BTreeMap::new(),
            courses: BTreeMap::new(),
            course_types: BTreeMap::new(),
            classes: BTreeMap::new(),
            slots: BTreeMap::new(),
            users: BTreeMap::new(),
            loads: HashMap::new(),
            next_id: 1,
            is_healthy: true,
        }
    }
}

fn not_found(entity: &str, id: impl ToString, operation: &str) -> RepositoryError {
    let id = id.to_string();
    RepositoryError::not_found_with_context(
        format!("{} {} not found", entity, id),
        ErrorContext::new(operation)
            .with_entity(entity.to_lowercase())
            .with_entity_id(id),
    )
}

impl LocalData {
    fn allocate_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    // ==================== Lookups ====================

    fn semester(&self, id: SemesterId, operation: &str) -> RepositoryResult<&Semester> {
        self.semesters
            .get(&id)
            .ok_or_else(|| not_found("Semester", id, operation))
    }

    fn active_semester_id(&self) -> Option<SemesterId> {
        self.semesters.values().find(|s| s.is_active).map(|s| s.id)
    }

    fn user_row(&self, id: UserId, operation: &str) -> RepositoryResult<&UserRow> {
        self.users
            .get(&id)
            .ok_or_else(|| not_found("User", id, operation))
    }

    fn class_semester(&self, class_id: CourseClassId) -> Option<SemesterId> {
        let class = self.classes.get(&class_id)?;
        let course_type = self.course_types.get(&class.course_type_id)?;
        self.courses.get(&course_type.course_id).map(|c| c.semester_id)
    }

    fn slot_semester(&self, slot_id: SlotId) -> Option<SemesterId> {
        self.slots
            .get(&slot_id)
            .and_then(|slot| self.class_semester(slot.class_id))
    }

    fn class_ids_of_course(&self, course_id: CourseId) -> Vec<CourseClassId> {
        let type_ids: BTreeSet<CourseTypeId> = self
            .course_types
            .iter()
            .filter(|(_, t)| t.course_id == course_id)
            .map(|(id, _)| *id)
            .collect();
        self.classes
            .iter()
            .filter(|(_, c)| type_ids.contains(&c.course_type_id))
            .map(|(id, _)| *id)
            .collect()
    }

    // ==================== Views ====================

    fn user_view(&self, id: UserId, row: &UserRow) -> User {
        let bkd = self
            .active_semester_id()
            .and_then(|semester_id| self.loads.get(&(id, semester_id)).copied())
            .unwrap_or(0.0);
        User {
            id,
            name: row.name.clone(),
            initials: row.initials.clone(),
            is_admin: row.is_admin,
            is_active: row.is_active,
            bkd,
        }
    }

    fn slot_view(&self, id: SlotId, row: &SlotRow) -> Slot {
        Slot {
            id,
            course_class_id: row.class_id,
            meeting_number: row.meeting_number,
            occupant: row.occupant,
            occupant_initials: row
                .occupant
                .and_then(|user_id| self.users.get(&user_id))
                .map(|u| u.initials.clone()),
        }
    }

    fn slots_of_class(&self, class_id: CourseClassId) -> Vec<Slot> {
        let mut slots: Vec<Slot> = self
            .slots
            .iter()
            .filter(|(_, s)| s.class_id == class_id)
            .map(|(id, row)| self.slot_view(*id, row))
            .collect();
        slots.sort_by_key(|s| (s.meeting_number, s.id));
        slots
    }

    fn class_view(&self, id: CourseClassId, row: &ClassRow) -> CourseClass {
        CourseClass {
            id,
            course_type_id: row.course_type_id,
            number: row.number,
            slots: self.slots_of_class(id),
        }
    }

    fn course_summary(&self, id: CourseId, row: &CourseRow) -> CourseSummary {
        CourseSummary {
            id,
            semester_id: row.semester_id,
            code: row.code.clone(),
            name: row.name.clone(),
        }
    }

    fn course_view(&self, id: CourseId, operation: &str) -> RepositoryResult<Course> {
        let row = self
            .courses
            .get(&id)
            .ok_or_else(|| not_found("Course", id, operation))?;

        let mut course_types: Vec<CourseType> = self
            .course_types
            .iter()
            .filter(|(_, t)| t.course_id == id)
            .map(|(type_id, t)| {
                let mut classes: Vec<CourseClass> = self
                    .classes
                    .iter()
                    .filter(|(_, c)| c.course_type_id == *type_id)
                    .map(|(class_id, c)| self.class_view(*class_id, c))
                    .collect();
                classes.sort_by_key(|c| (c.number, c.id));
                CourseType {
                    id: *type_id,
                    course_id: id,
                    kind: t.kind,
                    credit: t.credit,
                    class_count: t.class_count,
                    classes,
                }
            })
            .collect();
        course_types.sort_by_key(|t| t.kind);

        Ok(Course {
            id,
            semester_id: row.semester_id,
            code: row.code.clone(),
            name: row.name.clone(),
            study_semesters: row.study_semesters.clone(),
            course_types,
        })
    }

    fn courses_of_semester(&self, semester_id: SemesterId) -> Vec<CourseSummary> {
        let mut courses: Vec<CourseSummary> = self
            .courses
            .iter()
            .filter(|(_, c)| c.semester_id == semester_id)
            .map(|(id, c)| self.course_summary(*id, c))
            .collect();
        courses.sort_by(|a, b| a.code.cmp(&b.code).then(a.id.cmp(&b.id)));
        courses
    }

    // ==================== Load ====================

    fn holdings(&self, user_id: UserId, semester_id: SemesterId) -> Vec<Holding> {
        self.slots
            .iter()
            .filter(|(_, s)| s.occupant == Some(user_id))
            .filter_map(|(slot_id, s)| {
                let class = self.classes.get(&s.class_id)?;
                let course_type = self.course_types.get(&class.course_type_id)?;
                let course = self.courses.get(&course_type.course_id)?;
                (course.semester_id == semester_id).then(|| Holding {
                    slot_id: *slot_id,
                    course_id: course_type.course_id,
                    course_code: course.code.clone(),
                    course_name: course.name.clone(),
                    kind: course_type.kind,
                    course_class_id: s.class_id,
                    credit: course_type.credit,
                })
            })
            .collect()
    }

    fn store_load(&mut self, user_id: UserId, semester_id: SemesterId, bkd: f64) -> LoadChange {
        let previous = if bkd > 0.0 {
            self.loads.insert((user_id, semester_id), bkd)
        } else {
            self.loads.remove(&(user_id, semester_id))
        }
        .unwrap_or(0.0);
        LoadChange {
            user_id,
            semester_id,
            previous,
            bkd,
        }
    }

    fn recompute(&mut self, user_id: UserId, semester_id: SemesterId) -> LoadChange {
        let bkd = load::total(&self.holdings(user_id, semester_id));
        let change = self.store_load(user_id, semester_id, bkd);
        debug!(
            "Recomputed load of user {} in semester {}: {} -> {}",
            user_id, semester_id, change.previous, change.bkd
        );
        change
    }

    /// Rebuild every load of a semester from scratch, one course type at a time.
    fn recompute_semester(&mut self, semester_id: SemesterId) -> Vec<LoadChange> {
        let mut fresh: BTreeMap<UserId, f64> = BTreeMap::new();
        for (type_id, course_type) in &self.course_types {
            let in_semester = self
                .courses
                .get(&course_type.course_id)
                .is_some_and(|c| c.semester_id == semester_id);
            if !in_semester {
                continue;
            }
            let occupied = self.slots.values().filter_map(|s| {
                let class = self.classes.get(&s.class_id)?;
                if class.course_type_id != *type_id {
                    return None;
                }
                s.occupant.map(|user_id| (s.class_id, user_id))
            });
            for (user_id, earned) in credit::contributions(course_type.credit, occupied) {
                *fresh.entry(user_id).or_insert(0.0) += earned;
            }
        }

        let mut users: BTreeSet<UserId> = fresh.keys().copied().collect();
        users.extend(
            self.loads
                .keys()
                .filter(|(_, s)| *s == semester_id)
                .map(|(u, _)| *u),
        );

        users
            .into_iter()
            .map(|user_id| {
                let bkd = fresh.get(&user_id).copied().unwrap_or(0.0);
                self.store_load(user_id, semester_id, bkd)
            })
            .filter(LoadChange::is_changed)
            .collect()
    }

    /// Clear slots of a semester still held by deactivated users.
    fn release_inactive_holders(&mut self, semester_id: SemesterId) -> Vec<LoadChange> {
        let stale: Vec<(SlotId, UserId)> = self
            .slots
            .iter()
            .filter_map(|(slot_id, slot)| {
                let user_id = slot.occupant?;
                let inactive = self.users.get(&user_id).is_some_and(|u| !u.is_active);
                (inactive && self.slot_semester(*slot_id) == Some(semester_id))
                    .then_some((*slot_id, user_id))
            })
            .collect();
        let affected: BTreeSet<UserId> = stale.iter().map(|(_, user_id)| *user_id).collect();
        for (slot_id, _) in &stale {
            if let Some(slot) = self.slots.get_mut(slot_id) {
                slot.occupant = None;
            }
        }
        if !stale.is_empty() {
            warn!(
                "Activation of semester {} released {} slots held by {} inactive users",
                semester_id,
                stale.len(),
                affected.len()
            );
        }
        affected
            .into_iter()
            .map(|user_id| self.recompute(user_id, semester_id))
            .collect()
    }

    fn apply_transition(&mut self, transition: &SlotTransition, semester_id: SemesterId) -> Vec<LoadChange> {
        if !transition.outcome.is_change() {
            return Vec::new();
        }
        if let Some(slot) = self.slots.get_mut(&transition.slot_id) {
            slot.occupant = transition.next;
        }
        transition
            .affected()
            .into_iter()
            .map(|user_id| self.recompute(user_id, semester_id))
            .collect()
    }

    /// Remove sections and their slots, then recompute every instructor who
    /// held one of the removed slots.
    fn remove_classes(&mut self, class_ids: &[CourseClassId], semester_id: SemesterId) -> CascadeReport {
        let removed: BTreeSet<CourseClassId> = class_ids.iter().copied().collect();
        let slot_ids: Vec<SlotId> = self
            .slots
            .iter()
            .filter(|(_, s)| removed.contains(&s.class_id))
            .map(|(id, _)| *id)
            .collect();

        let mut affected = BTreeSet::new();
        let mut released = 0;
        for slot_id in &slot_ids {
            if let Some(occupant) = self.slots.remove(slot_id).and_then(|slot| slot.occupant) {
                affected.insert(occupant);
                released += 1;
            }
        }
        for class_id in &removed {
            self.classes.remove(class_id);
        }

        let loads = affected
            .iter()
            .map(|user_id| self.recompute(*user_id, semester_id))
            .collect();

        CascadeReport {
            courses_removed: 0,
            classes_removed: removed.len(),
            slots_removed: slot_ids.len(),
            assignments_released: released,
            loads,
        }
    }
}

impl LocalRepository {
    /// Create a new empty local repository.
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(LocalData::default())),
        }
    }

    /// Set the health status for testing connection failures.
    pub fn set_healthy(&self, healthy: bool) {
        self.data.write().is_healthy = healthy;
    }

    /// Number of stored slots, across all semesters.
    pub fn slot_count(&self) -> usize {
        self.data.read().slots.len()
    }

    /// Helper to check health and return error if unhealthy.
    fn check_health(&self) -> RepositoryResult<()> {
        if !self.data.read().is_healthy {
            return Err(RepositoryError::connection_with_context(
                "Database is not healthy",
                ErrorContext::new("check_health"),
            ));
        }
        Ok(())
    }

    // ==================== Synchronous implementations ====================

    fn activate_semester_impl(&self, semester_id: SemesterId) -> RepositoryResult<Semester> {
        let mut data = self.data.write();
        let previous = data.active_semester_id();
        if !lifecycle::apply_activation(data.semesters.values_mut(), semester_id, Utc::now()) {
            return Err(not_found("Semester", semester_id, "activate_semester"));
        }
        data.release_inactive_holders(semester_id);
        if previous != Some(semester_id) {
            info!(
                "Activated semester {} (previously active: {:?})",
                semester_id, previous
            );
        }
        data.semester(semester_id, "activate_semester").cloned()
    }

    fn delete_semester_impl(&self, semester_id: SemesterId) -> RepositoryResult<CascadeReport> {
        let mut data = self.data.write();
        lifecycle::ensure_deletable(data.semester(semester_id, "delete_semester")?)?;

        let course_ids: Vec<CourseId> = data
            .courses
            .iter()
            .filter(|(_, c)| c.semester_id == semester_id)
            .map(|(id, _)| *id)
            .collect();
        let class_ids: Vec<CourseClassId> = course_ids
            .iter()
            .flat_map(|id| data.class_ids_of_course(*id))
            .collect();

        let mut report = data.remove_classes(&class_ids, semester_id);
        data.course_types
            .retain(|_, t| !course_ids.contains(&t.course_id));
        for course_id in &course_ids {
            data.courses.remove(course_id);
        }
        report.courses_removed = course_ids.len();
        data.loads.retain(|(_, s), _| *s != semester_id);
        data.semesters.remove(&semester_id);

        info!(
            "Deleted semester {}: {} courses, {} slots, {} instructors affected",
            semester_id,
            report.courses_removed,
            report.slots_removed,
            report.loads.len()
        );
        Ok(report)
    }

    fn create_course_impl(&self, plan: &CoursePlan) -> RepositoryResult<Course> {
        let mut data = self.data.write();
        lifecycle::ensure_catalog_editable(data.semester(plan.semester_id, "create_course")?, "create_course")?;

        let duplicate = data
            .courses
            .values()
            .any(|c| c.semester_id == plan.semester_id && c.code == plan.code);
        if duplicate {
            return Err(RepositoryError::conflict_with_context(
                format!("Course {} already exists in this semester", plan.code),
                ErrorContext::new("create_course")
                    .with_entity("course")
                    .with_details(format!("semester={}", plan.semester_id)),
            ));
        }

        let course_id = CourseId::new(data.allocate_id());
        data.courses.insert(
            course_id,
            CourseRow {
                semester_id: plan.semester_id,
                code: plan.code.clone(),
                name: plan.name.clone(),
                study_semesters: plan.study_semesters.clone(),
            },
        );

        for type_plan in &plan.types {
            let type_id = CourseTypeId::new(data.allocate_id());
            data.course_types.insert(
                type_id,
                CourseTypeRow {
                    course_id,
                    kind: type_plan.kind,
                    credit: type_plan.credit,
                    class_count: type_plan.class_count,
                },
            );
            for (number, meetings) in type_plan.layout() {
                let class_id = CourseClassId::new(data.allocate_id());
                data.classes.insert(
                    class_id,
                    ClassRow {
                        course_type_id: type_id,
                        number,
                    },
                );
                for meeting_number in meetings {
                    let slot_id = SlotId::new(data.allocate_id());
                    data.slots.insert(
                        slot_id,
                        SlotRow {
                            class_id,
                            meeting_number,
                            occupant: None,
                        },
                    );
                }
            }
        }

        data.course_view(course_id, "create_course")
    }

    fn delete_course_impl(&self, course_id: CourseId) -> RepositoryResult<CascadeReport> {
        let mut data = self.data.write();
        let semester_id = data
            .courses
            .get(&course_id)
            .map(|c| c.semester_id)
            .ok_or_else(|| not_found("Course", course_id, "delete_course"))?;
        lifecycle::ensure_catalog_editable(data.semester(semester_id, "delete_course")?, "delete_course")?;

        let class_ids = data.class_ids_of_course(course_id);
        let mut report = data.remove_classes(&class_ids, semester_id);
        data.course_types.retain(|_, t| t.course_id != course_id);
        data.courses.remove(&course_id);
        report.courses_removed = 1;
        Ok(report)
    }

    fn delete_course_class_impl(&self, class_id: CourseClassId) -> RepositoryResult<CascadeReport> {
        let mut data = self.data.write();
        let type_id = data
            .classes
            .get(&class_id)
            .map(|c| c.course_type_id)
            .ok_or_else(|| not_found("CourseClass", class_id, "delete_course_class"))?;
        let semester_id = data
            .class_semester(class_id)
            .ok_or_else(|| RepositoryError::internal("Section has no owning semester"))?;
        lifecycle::ensure_catalog_editable(
            data.semester(semester_id, "delete_course_class")?,
            "delete_course_class",
        )?;

        let report = data.remove_classes(&[class_id], semester_id);

        // A course type with no sections left no longer satisfies class_count > 0.
        let emptied = match data.course_types.get_mut(&type_id) {
            Some(course_type) => {
                course_type.class_count = course_type.class_count.saturating_sub(1);
                course_type.class_count == 0
            }
            None => false,
        };
        if emptied {
            data.course_types.remove(&type_id);
        }
        Ok(report)
    }

    fn claim_slot_impl(&self, slot_id: SlotId, caller: &Caller) -> RepositoryResult<AssignmentReceipt> {
        let mut data = self.data.write();
        let row = data
            .slots
            .get(&slot_id)
            .ok_or_else(|| not_found("Slot", slot_id, "claim_slot"))?;
        let slot = data.slot_view(slot_id, row);
        let user_row = data.user_row(caller.user_id, "claim_slot")?;
        let instructor = data.user_view(caller.user_id, user_row);
        let semester_id = data
            .slot_semester(slot_id)
            .ok_or_else(|| RepositoryError::internal("Slot has no owning semester"))?;
        let semester = data.semester(semester_id, "claim_slot")?;

        let transition = assignment::plan_claim(&slot, semester, &instructor)?;
        let loads = data.apply_transition(&transition, semester_id);
        Self::receipt(&data, slot_id, transition, loads)
    }

    fn release_slot_impl(&self, slot_id: SlotId, caller: &Caller) -> RepositoryResult<AssignmentReceipt> {
        let mut data = self.data.write();
        let row = data
            .slots
            .get(&slot_id)
            .ok_or_else(|| not_found("Slot", slot_id, "release_slot"))?;
        let slot = data.slot_view(slot_id, row);
        let semester_id = data
            .slot_semester(slot_id)
            .ok_or_else(|| RepositoryError::internal("Slot has no owning semester"))?;
        let semester = data.semester(semester_id, "release_slot")?;

        let transition = assignment::plan_release(&slot, semester, caller)?;
        let loads = data.apply_transition(&transition, semester_id);
        Self::receipt(&data, slot_id, transition, loads)
    }

    fn reassign_slot_impl(
        &self,
        slot_id: SlotId,
        occupant: Option<UserId>,
        caller: &Caller,
    ) -> RepositoryResult<AssignmentReceipt> {
        assignment::ensure_can_reassign(caller)?;
        let mut data = self.data.write();
        let row = data
            .slots
            .get(&slot_id)
            .ok_or_else(|| not_found("Slot", slot_id, "reassign_slot"))?;
        let slot = data.slot_view(slot_id, row);
        let target = match occupant {
            Some(user_id) => {
                let user_row = data.user_row(user_id, "reassign_slot")?;
                Some(data.user_view(user_id, user_row))
            }
            None => None,
        };
        let semester_id = data
            .slot_semester(slot_id)
            .ok_or_else(|| RepositoryError::internal("Slot has no owning semester"))?;
        let semester = data.semester(semester_id, "reassign_slot")?;

        let transition = assignment::plan_reassign(&slot, semester, caller, target.as_ref())?;
        let loads = data.apply_transition(&transition, semester_id);
        Self::receipt(&data, slot_id, transition, loads)
    }

    fn receipt(
        data: &LocalData,
        slot_id: SlotId,
        transition: SlotTransition,
        loads: Vec<LoadChange>,
    ) -> RepositoryResult<AssignmentReceipt> {
        let row = data
            .slots
            .get(&slot_id)
            .ok_or_else(|| not_found("Slot", slot_id, "assignment_receipt"))?;
        Ok(AssignmentReceipt {
            slot: data.slot_view(slot_id, row),
            outcome: transition.outcome,
            loads,
        })
    }

    fn set_user_active_impl(
        &self,
        user_id: UserId,
        is_active: bool,
    ) -> RepositoryResult<(User, Vec<LoadChange>)> {
        let mut data = self.data.write();
        let row = data
            .users
            .get_mut(&user_id)
            .ok_or_else(|| not_found("User", user_id, "set_user_active"))?;
        row.is_active = is_active;

        let mut loads = Vec::new();
        if !is_active {
            if let Some(semester_id) = data.active_semester_id() {
                let held: Vec<SlotId> = data
                    .holdings(user_id, semester_id)
                    .iter()
                    .map(|h| h.slot_id)
                    .collect();
                for slot_id in &held {
                    if let Some(slot) = data.slots.get_mut(slot_id) {
                        slot.occupant = None;
                    }
                }
                if !held.is_empty() {
                    warn!(
                        "Deactivated user {} released {} slots in semester {}",
                        user_id,
                        held.len(),
                        semester_id
                    );
                    loads.push(data.recompute(user_id, semester_id));
                }
            }
        }

        let row = data.user_row(user_id, "set_user_active")?;
        Ok((data.user_view(user_id, row), loads))
    }
}

impl Default for LocalRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SemesterRepository for LocalRepository {
    async fn health_check(&self) -> RepositoryResult<bool> {
        Ok(self.data.read().is_healthy)
    }

    async fn list_semesters(&self) -> RepositoryResult<Vec<Semester>> {
        self.check_health()?;
        let data = self.data.read();
        let mut semesters: Vec<Semester> = data.semesters.values().cloned().collect();
        semesters.sort_by(|a, b| b.start_date.cmp(&a.start_date).then(b.id.cmp(&a.id)));
        Ok(semesters)
    }

    async fn get_semester(&self, semester_id: SemesterId) -> RepositoryResult<SemesterDetail> {
        self.check_health()?;
        let data = self.data.read();
        let semester = data.semester(semester_id, "get_semester")?.clone();
        Ok(SemesterDetail {
            courses: data.courses_of_semester(semester_id),
            semester,
        })
    }

    async fn active_semester(&self) -> RepositoryResult<Option<Semester>> {
        self.check_health()?;
        let data = self.data.read();
        Ok(data.semesters.values().find(|s| s.is_active).cloned())
    }

    async fn create_semester(&self, start_date: NaiveDate) -> RepositoryResult<Semester> {
        self.check_health()?;
        lifecycle::validate_start_date(start_date)?;
        let mut data = self.data.write();
        let id = SemesterId::new(data.allocate_id());
        let semester = Semester {
            id,
            start_date,
            is_active: false,
            activated_at: None,
            created_at: Utc::now(),
        };
        data.semesters.insert(id, semester.clone());
        Ok(semester)
    }

    async fn activate_semester(&self, semester_id: SemesterId) -> RepositoryResult<Semester> {
        self.check_health()?;
        self.activate_semester_impl(semester_id)
    }

    async fn delete_semester(&self, semester_id: SemesterId) -> RepositoryResult<CascadeReport> {
        self.check_health()?;
        self.delete_semester_impl(semester_id)
    }
}

#[async_trait]
impl CatalogRepository for LocalRepository {
    async fn create_course(&self, plan: &CoursePlan) -> RepositoryResult<Course> {
        self.check_health()?;
        self.create_course_impl(plan)
    }

    async fn list_courses(&self, semester_id: SemesterId) -> RepositoryResult<Vec<CourseSummary>> {
        self.check_health()?;
        let data = self.data.read();
        data.semester(semester_id, "list_courses")?;
        Ok(data.courses_of_semester(semester_id))
    }

    async fn get_course(&self, course_id: CourseId) -> RepositoryResult<Course> {
        self.check_health()?;
        self.data.read().course_view(course_id, "get_course")
    }

    async fn delete_course(&self, course_id: CourseId) -> RepositoryResult<CascadeReport> {
        self.check_health()?;
        self.delete_course_impl(course_id)
    }

    async fn get_course_class(&self, class_id: CourseClassId) -> RepositoryResult<CourseClassDetail> {
        self.check_health()?;
        let data = self.data.read();
        let row = data
            .classes
            .get(&class_id)
            .ok_or_else(|| not_found("CourseClass", class_id, "get_course_class"))?;
        let course_type = data
            .course_types
            .get(&row.course_type_id)
            .ok_or_else(|| RepositoryError::internal("Section has no course type"))?;
        let course = data
            .courses
            .get(&course_type.course_id)
            .ok_or_else(|| RepositoryError::internal("Course type has no course"))?;
        Ok(CourseClassDetail {
            semester_id: course.semester_id,
            course_id: course_type.course_id,
            course_code: course.code.clone(),
            course_name: course.name.clone(),
            kind: course_type.kind,
            credit: course_type.credit,
            class: data.class_view(class_id, row),
        })
    }

    async fn delete_course_class(&self, class_id: CourseClassId) -> RepositoryResult<CascadeReport> {
        self.check_health()?;
        self.delete_course_class_impl(class_id)
    }

    async fn list_slots(&self, class_id: CourseClassId) -> RepositoryResult<Vec<Slot>> {
        self.check_health()?;
        let data = self.data.read();
        if !data.classes.contains_key(&class_id) {
            return Err(not_found("CourseClass", class_id, "list_slots"));
        }
        Ok(data.slots_of_class(class_id))
    }

    async fn get_slot(&self, slot_id: SlotId) -> RepositoryResult<Slot> {
        self.check_health()?;
        let data = self.data.read();
        let active = data.active_semester_id();
        match data.slots.get(&slot_id) {
            Some(row) if active.is_some() && data.slot_semester(slot_id) == active => {
                Ok(data.slot_view(slot_id, row))
            }
            _ => Err(not_found("Slot", slot_id, "get_slot")),
        }
    }
}

#[async_trait]
impl AssignmentRepository for LocalRepository {
    async fn claim_slot(&self, slot_id: SlotId, caller: &Caller) -> RepositoryResult<AssignmentReceipt> {
        self.check_health()?;
        self.claim_slot_impl(slot_id, caller)
    }

    async fn release_slot(&self, slot_id: SlotId, caller: &Caller) -> RepositoryResult<AssignmentReceipt> {
        self.check_health()?;
        self.release_slot_impl(slot_id, caller)
    }

    async fn reassign_slot(
        &self,
        slot_id: SlotId,
        occupant: Option<UserId>,
        caller: &Caller,
    ) -> RepositoryResult<AssignmentReceipt> {
        self.check_health()?;
        self.reassign_slot_impl(slot_id, occupant, caller)
    }
}

#[async_trait]
impl LoadRepository for LocalRepository {
    async fn instructor_load(
        &self,
        user_id: UserId,
        semester_id: SemesterId,
    ) -> RepositoryResult<InstructorLoad> {
        self.check_health()?;
        let data = self.data.read();
        data.user_row(user_id, "instructor_load")?;
        data.semester(semester_id, "instructor_load")?;
        Ok(load::aggregate(
            user_id,
            semester_id,
            &data.holdings(user_id, semester_id),
        ))
    }

    async fn instructor_semesters(&self, user_id: UserId) -> RepositoryResult<Vec<InstructorLoad>> {
        self.check_health()?;
        let data = self.data.read();
        data.user_row(user_id, "instructor_semesters")?;

        let mut semesters: Vec<&Semester> = data.semesters.values().collect();
        semesters.sort_by(|a, b| b.start_date.cmp(&a.start_date).then(b.id.cmp(&a.id)));
        Ok(semesters
            .into_iter()
            .filter_map(|semester| {
                let holdings = data.holdings(user_id, semester.id);
                (!holdings.is_empty()).then(|| load::aggregate(user_id, semester.id, &holdings))
            })
            .collect())
    }

    async fn semester_loads(&self, semester_id: SemesterId) -> RepositoryResult<Vec<InstructorLoad>> {
        self.check_health()?;
        let data = self.data.read();
        data.semester(semester_id, "semester_loads")?;
        Ok(data
            .users
            .keys()
            .map(|user_id| load::aggregate(*user_id, semester_id, &data.holdings(*user_id, semester_id)))
            .collect())
    }

    async fn recompute_load(&self, user_id: UserId, semester_id: SemesterId) -> RepositoryResult<LoadChange> {
        self.check_health()?;
        let mut data = self.data.write();
        data.user_row(user_id, "recompute_load")?;
        data.semester(semester_id, "recompute_load")?;
        Ok(data.recompute(user_id, semester_id))
    }

    async fn recompute_all(&self, semester_id: SemesterId) -> RepositoryResult<Vec<LoadChange>> {
        self.check_health()?;
        let mut data = self.data.write();
        data.semester(semester_id, "recompute_all")?;
        Ok(data.recompute_semester(semester_id))
    }
}

#[async_trait]
impl UserRepository for LocalRepository {
    async fn create_user(&self, user: &NewUser) -> RepositoryResult<User> {
        self.check_health()?;
        let mut data = self.data.write();
        if data.users.values().any(|u| u.initials == user.initials) {
            return Err(RepositoryError::conflict_with_context(
                format!("Initials {} are already taken", user.initials),
                ErrorContext::new("create_user").with_entity("user"),
            ));
        }
        let id = UserId::new(data.allocate_id());
        let row = UserRow {
            name: user.name.clone(),
            initials: user.initials.clone(),
            is_admin: user.is_admin,
            is_active: true,
        };
        let view = data.user_view(id, &row);
        data.users.insert(id, row);
        Ok(view)
    }

    async fn get_user(&self, user_id: UserId) -> RepositoryResult<User> {
        self.check_health()?;
        let data = self.data.read();
        let row = data.user_row(user_id, "get_user")?;
        Ok(data.user_view(user_id, row))
    }

    async fn list_users(&self) -> RepositoryResult<Vec<User>> {
        self.check_health()?;
        let data = self.data.read();
        let mut users: Vec<User> = data
            .users
            .iter()
            .map(|(id, row)| data.user_view(*id, row))
            .collect();
        users.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(users)
    }

    async fn find_user_by_initials(&self, initials: &str) -> RepositoryResult<Option<User>> {
        self.check_health()?;
        let data = self.data.read();
        let wanted = initials.trim().to_ascii_uppercase();
        Ok(data
            .users
            .iter()
            .find(|(_, row)| row.initials == wanted)
            .map(|(id, row)| data.user_view(*id, row)))
    }

    async fn set_user_active(
        &self,
        user_id: UserId,
        is_active: bool,
    ) -> RepositoryResult<(User, Vec<LoadChange>)> {
        self.check_health()?;
        self.set_user_active_impl(user_id, is_active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::credit::CourseTypeSpec;
    use crate::services::catalog::{plan_course, NewCourse};

    async fn seeded() -> (LocalRepository, SemesterId, Course, User, User) {
        let repo = LocalRepository::new();
        let semester = repo
            .create_semester(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
            .await
            .unwrap();
        repo.activate_semester(semester.id).await.unwrap();
        let plan = plan_course(
            &NewCourse::new(semester.id, "CS101", "Programming")
                .with_type(CourseTypeSpec::new(CourseKind::Lecture, 3.0, 2).with_meetings(2))
                .with_type(CourseTypeSpec::new(CourseKind::Practicum, 1.0, 1)),
        )
        .unwrap();
        let course = repo.create_course(&plan).await.unwrap();
        let alice = repo.create_user(&NewUser::new("Alice", "ALI")).await.unwrap();
        let bob = repo.create_user(&NewUser::new("Bob", "BOB")).await.unwrap();
        (repo, semester.id, course, alice, bob)
    }

    #[tokio::test]
    async fn test_create_course_generates_slots() {
        let (repo, _, course, _, _) = seeded().await;
        assert_eq!(course.course_types.len(), 2);
        assert_eq!(course.course_types[0].kind, CourseKind::Lecture);
        assert_eq!(course.course_types[0].classes.len(), 2);
        assert_eq!(course.course_types[0].classes[0].slots.len(), 2);
        assert_eq!(course.slot_count(), 5);
        assert_eq!(repo.slot_count(), 5);
    }

    #[tokio::test]
    async fn test_claim_updates_stored_load() {
        let (repo, semester_id, course, alice, _) = seeded().await;
        let lecture = &course.course_types[0].classes[0];

        for slot in &lecture.slots {
            repo.claim_slot(slot.id, &Caller::from(&alice)).await.unwrap();
        }

        let user = repo.get_user(alice.id).await.unwrap();
        assert_eq!(user.bkd, 3.0);
        let load = repo.instructor_load(alice.id, semester_id).await.unwrap();
        assert_eq!(load.bkd, 3.0);
    }

    #[tokio::test]
    async fn test_recompute_paths_agree() {
        let (repo, semester_id, course, alice, bob) = seeded().await;
        let lecture = &course.course_types[0];
        repo.claim_slot(lecture.classes[0].slots[0].id, &Caller::from(&alice))
            .await
            .unwrap();
        repo.claim_slot(lecture.classes[1].slots[0].id, &Caller::from(&alice))
            .await
            .unwrap();
        repo.claim_slot(lecture.classes[1].slots[1].id, &Caller::from(&bob))
            .await
            .unwrap();

        // Stored loads are already fresh, so a full rebuild changes nothing.
        assert!(repo.recompute_all(semester_id).await.unwrap().is_empty());
        let change = repo.recompute_load(alice.id, semester_id).await.unwrap();
        assert_eq!(change.bkd, 6.0);
        assert!(!change.is_changed());
    }

    #[tokio::test]
    async fn test_unhealthy_repository_rejects_operations() {
        let repo = LocalRepository::new();
        repo.set_healthy(false);
        assert!(!repo.health_check().await.unwrap());
        let err = repo.list_semesters().await.unwrap_err();
        assert!(matches!(err, RepositoryError::ConnectionError { .. }));
    }

    #[tokio::test]
    async fn test_get_slot_hides_inactive_semesters() {
        let (repo, _, course, _, _) = seeded().await;
        let slot_id = course.course_types[0].classes[0].slots[0].id;
        assert!(repo.get_slot(slot_id).await.is_ok());

        let next = repo
            .create_semester(NaiveDate::from_ymd_opt(2024, 8, 1).unwrap())
            .await
            .unwrap();
        repo.activate_semester(next.id).await.unwrap();

        let err = repo.get_slot(slot_id).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { .. }));
    }
}
