//! Semester lifecycle repository trait.

use async_trait::async_trait;
use chrono::NaiveDate;

use super::catalog::CascadeReport;
use super::error::RepositoryResult;
use crate::api::SemesterId;
use crate::models::catalog::{Semester, SemesterDetail};

/// Semester table operations.
///
/// # Thread Safety
/// Implementations must be `Send + Sync`. Activation must be serialized
/// across the whole semester table so no reader ever sees two active
/// semesters.
#[async_trait]
pub trait SemesterRepository: Send + Sync {
    /// Check if the backing store is reachable.
    async fn health_check(&self) -> RepositoryResult<bool>;

    /// All semesters, newest start date first.
    async fn list_semesters(&self) -> RepositoryResult<Vec<Semester>>;

    /// A semester with its course listing.
    ///
    /// # Returns
    /// * `Err(RepositoryError::NotFound)` - If the semester doesn't exist
    async fn get_semester(&self, semester_id: SemesterId) -> RepositoryResult<SemesterDetail>;

    /// The active semester, if any.
    async fn active_semester(&self) -> RepositoryResult<Option<Semester>>;

    /// Create a semester in the Draft state.
    async fn create_semester(&self, start_date: NaiveDate) -> RepositoryResult<Semester>;

    /// Make `semester_id` the only active semester.
    ///
    /// Activating the already-active semester is a no-op.
    ///
    /// # Returns
    /// * `Ok(Semester)` - The activated semester
    /// * `Err(RepositoryError::NotFound)` - If the semester doesn't exist
    async fn activate_semester(&self, semester_id: SemesterId) -> RepositoryResult<Semester>;

    /// Delete a non-active semester and everything it owns.
    ///
    /// # Returns
    /// * `Ok(CascadeReport)` - What was removed and whose load changed
    /// * `Err(RepositoryError::Conflict)` - If the semester is active
    /// * `Err(RepositoryError::NotFound)` - If the semester doesn't exist
    async fn delete_semester(&self, semester_id: SemesterId) -> RepositoryResult<CascadeReport>;
}
