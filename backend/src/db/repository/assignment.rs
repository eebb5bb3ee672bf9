//! Slot assignment repository trait.

use async_trait::async_trait;

use super::error::RepositoryResult;
use crate::api::{SlotId, UserId};
use crate::models::user::Caller;
use crate::services::assignment::AssignmentReceipt;

/// Slot occupancy transitions.
///
/// Each call decides and applies its transition atomically per slot
/// (compare-and-set on the occupant) and recomputes the load of the old and
/// new occupant before returning. Idempotent repeats succeed without writing.
#[async_trait]
pub trait AssignmentRepository: Send + Sync {
    /// Claim a slot for the caller.
    ///
    /// # Returns
    /// * `Ok(receipt)` - `Claimed` or `AlreadyAssigned`
    /// * `Err(RepositoryError::Conflict)` - Held by another instructor
    /// * `Err(RepositoryError::NotFound)` - Slot or caller absent
    /// * `Err(RepositoryError::SemesterClosed)` - Semester not active
    /// * `Err(RepositoryError::Forbidden)` - Caller is deactivated
    async fn claim_slot(&self, slot_id: SlotId, caller: &Caller) -> RepositoryResult<AssignmentReceipt>;

    /// Release a slot held by the caller (or by anyone, for administrators).
    ///
    /// # Returns
    /// * `Ok(receipt)` - `Released` or `AlreadyEmpty`
    /// * `Err(RepositoryError::Forbidden)` - Held by another instructor
    async fn release_slot(&self, slot_id: SlotId, caller: &Caller) -> RepositoryResult<AssignmentReceipt>;

    /// Administrative correction: set or clear the occupant unconditionally.
    async fn reassign_slot(
        &self,
        slot_id: SlotId,
        occupant: Option<UserId>,
        caller: &Caller,
    ) -> RepositoryResult<AssignmentReceipt>;
}
