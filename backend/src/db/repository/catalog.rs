//! Course catalog and slot registry repository trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::RepositoryResult;
use crate::api::{CourseClassId, CourseId, SemesterId, SlotId};
use crate::models::catalog::{Course, CourseClassDetail, CourseSummary, Slot};
use crate::services::catalog::CoursePlan;
use crate::services::load::LoadChange;

/// Summary of a cascading delete.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CascadeReport {
    pub courses_removed: usize,
    pub classes_removed: usize,
    pub slots_removed: usize,
    /// Removed slots that had an occupant.
    pub assignments_released: usize,
    /// Load of every instructor who held a removed slot.
    pub loads: Vec<LoadChange>,
}

/// Catalog operations.
///
/// Structural changes (create / delete) are allowed while the owning
/// semester is Draft or Active and fail with `SemesterClosed` once it is
/// archived.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Create a planned course with all of its sections and slots.
    ///
    /// # Returns
    /// * `Ok(Course)` - The stored course tree
    /// * `Err(RepositoryError::NotFound)` - If the semester doesn't exist
    /// * `Err(RepositoryError::Conflict)` - If the code is taken in that semester
    /// * `Err(RepositoryError::SemesterClosed)` - If the semester is archived
    async fn create_course(&self, plan: &CoursePlan) -> RepositoryResult<Course>;

    /// Courses of a semester ordered by code.
    async fn list_courses(&self, semester_id: SemesterId) -> RepositoryResult<Vec<CourseSummary>>;

    /// A course with its types, sections and slots.
    async fn get_course(&self, course_id: CourseId) -> RepositoryResult<Course>;

    /// Delete a course and everything it owns, recomputing affected loads.
    async fn delete_course(&self, course_id: CourseId) -> RepositoryResult<CascadeReport>;

    /// A section with its ordered slots.
    async fn get_course_class(&self, class_id: CourseClassId) -> RepositoryResult<CourseClassDetail>;

    /// Delete a section and its slots, recomputing affected loads.
    ///
    /// The parent course type's `class_count` is decremented.
    async fn delete_course_class(&self, class_id: CourseClassId) -> RepositoryResult<CascadeReport>;

    /// Slots of a section ordered by meeting number.
    ///
    /// # Returns
    /// * `Err(RepositoryError::NotFound)` - If the section doesn't exist
    async fn list_slots(&self, class_id: CourseClassId) -> RepositoryResult<Vec<Slot>>;

    /// A single live slot.
    ///
    /// # Returns
    /// * `Err(RepositoryError::NotFound)` - If the slot doesn't exist or its
    ///   semester is not the active one
    async fn get_slot(&self, slot_id: SlotId) -> RepositoryResult<Slot>;
}
