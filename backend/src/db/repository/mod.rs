//! Repository trait definitions for the slot-assignment engine.
//!
//! Responsibilities are split across focused traits so each backend
//! implementation stays readable and each concern can be tested alone.
//!
//! # Module Organization
//!
//! - [`error`]: Error types for repository operations
//! - [`semester`]: Semester lifecycle (create, activate, delete)
//! - [`catalog`]: Courses, sections and the slot registry
//! - [`assignment`]: Claim / release / reassign transitions
//! - [`load`]: Load recompute and reads
//! - [`user`]: Instructor accounts
//!
//! # Consistency
//!
//! Every mutating method is atomic: it either applies completely, including
//! the load recompute of every affected instructor, or fails leaving the
//! store untouched. Reads never observe a slot change without its load
//! change.

pub mod assignment;
pub mod catalog;
pub mod error;
pub mod load;
pub mod semester;
pub mod user;

// Re-export error types
pub use error::{ErrorContext, RepositoryError, RepositoryResult};

// Re-export all traits
pub use assignment::AssignmentRepository;
pub use catalog::{CascadeReport, CatalogRepository};
pub use load::LoadRepository;
pub use semester::SemesterRepository;
pub use user::UserRepository;

/// Composite trait bound for a complete repository implementation.
///
/// Automatically implemented for any type that implements all five
/// repository traits.
///
/// ```ignore
/// async fn claim_and_report<R: FullRepository + ?Sized>(
///     repo: &R,
///     slot_id: SlotId,
///     caller: &Caller,
/// ) -> RepositoryResult<f64> {
///     let receipt = repo.claim_slot(slot_id, caller).await?;
///     Ok(receipt.loads.first().map(|l| l.bkd).unwrap_or_default())
/// }
/// ```
pub trait FullRepository:
    SemesterRepository + CatalogRepository + AssignmentRepository + LoadRepository + UserRepository
{
}

// Blanket implementation: any type implementing all five traits automatically implements FullRepository
impl<T> FullRepository for T where
    T: SemesterRepository
        + CatalogRepository
        + AssignmentRepository
        + LoadRepository
        + UserRepository
{
}
