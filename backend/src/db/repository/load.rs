//! Load aggregation repository trait.

use async_trait::async_trait;

use super::error::RepositoryResult;
use crate::api::{SemesterId, UserId};
use crate::services::load::{InstructorLoad, LoadChange};

/// Per-semester instructor load.
///
/// Stored loads are kept in step with slot occupancy by the assignment and
/// catalog operations; the recompute methods rebuild them from slot state.
#[async_trait]
pub trait LoadRepository: Send + Sync {
    /// Load of one instructor in one semester with its per-course breakdown.
    ///
    /// # Returns
    /// * `Err(RepositoryError::NotFound)` - If the user or semester doesn't exist
    async fn instructor_load(
        &self,
        user_id: UserId,
        semester_id: SemesterId,
    ) -> RepositoryResult<InstructorLoad>;

    /// Every semester in which the instructor holds at least one slot,
    /// newest first.
    async fn instructor_semesters(&self, user_id: UserId) -> RepositoryResult<Vec<InstructorLoad>>;

    /// Load of every user in a semester, including users holding nothing.
    async fn semester_loads(&self, semester_id: SemesterId) -> RepositoryResult<Vec<InstructorLoad>>;

    /// Rebuild one instructor's stored load for a semester from slot state.
    async fn recompute_load(&self, user_id: UserId, semester_id: SemesterId) -> RepositoryResult<LoadChange>;

    /// Rebuild every stored load of a semester. Returns only changed loads.
    async fn recompute_all(&self, semester_id: SemesterId) -> RepositoryResult<Vec<LoadChange>>;
}
