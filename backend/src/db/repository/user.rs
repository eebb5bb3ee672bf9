//! Instructor account repository trait.

use async_trait::async_trait;

use super::error::RepositoryResult;
use crate::api::UserId;
use crate::models::user::{NewUser, User};
use crate::services::load::LoadChange;

/// Instructor accounts. Returned users carry their active-semester BKD.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create a user from already-normalized input.
    ///
    /// # Returns
    /// * `Err(RepositoryError::Conflict)` - If the initials are taken
    async fn create_user(&self, user: &NewUser) -> RepositoryResult<User>;

    async fn get_user(&self, user_id: UserId) -> RepositoryResult<User>;

    /// Users ordered by name.
    async fn list_users(&self) -> RepositoryResult<Vec<User>>;

    async fn find_user_by_initials(&self, initials: &str) -> RepositoryResult<Option<User>>;

    /// Set the active flag. Deactivation releases every slot the user holds
    /// in the active semester.
    ///
    /// # Returns
    /// * `Ok((user, loads))` - Updated user and the load changes it caused
    async fn set_user_active(
        &self,
        user_id: UserId,
        is_active: bool,
    ) -> RepositoryResult<(User, Vec<LoadChange>)>;
}
