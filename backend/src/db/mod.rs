//! Persistence layer: repository traits, their backends and the service
//! functions built on top of them.
//!
//! # Module Organization
//!
//! - `services`: high-level operations with role checks and logging (use these)
//! - `repository`: trait definitions and `RepositoryError`
//! - `repositories::postgres`: Postgres implementation with Diesel ORM
//! - `repositories::local`: in-memory implementation for tests and local development
//! - `factory` / `repo_config`: backend selection from the environment or `repository.toml`
//!
//! # Recommended Usage
//!
//! ```no_run
//! use bkd_backend::db::{services, RepositoryFactory};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let repo = RepositoryFactory::from_default_config_or_env().await?;
//!     let semesters = services::list_semesters(repo.as_ref()).await?;
//!     println!("{} semesters", semesters.len());
//!     Ok(())
//! }
//! ```

#[cfg(not(any(feature = "postgres-repo", feature = "local-repo")))]
compile_error!("Enable at least one repository backend feature.");

pub mod factory;
pub mod repo_config;
pub mod repositories;
pub mod repository;
pub mod services;

// Postgres config is colocated with the repository implementation.
#[cfg(feature = "postgres-repo")]
pub use repositories::postgres::{PoolStats, PostgresConfig};
#[cfg(not(feature = "postgres-repo"))]
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    _private: (),
}

pub use factory::{RepositoryFactory, RepositoryType};
pub use repo_config::RepositoryConfig;
pub use repositories::LocalRepository;
#[cfg(feature = "postgres-repo")]
pub use repositories::PostgresRepository;
pub use repository::{
    AssignmentRepository, CascadeReport, CatalogRepository, ErrorContext, FullRepository,
    LoadRepository, RepositoryError, RepositoryResult, SemesterRepository, UserRepository,
};
