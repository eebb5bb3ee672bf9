//! HTTP server module.
//!
//! An axum REST surface over the engine. Handlers resolve the caller through
//! the identity gate in [`auth`] and delegate to [`crate::db::services`].
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  HTTP Layer (axum handlers)                               │
//! │  - x-user-id identity gate                                │
//! │  - JSON serialization/deserialization                     │
//! │  - CORS, compression, error mapping                       │
//! └───────────────────┬──────────────────────────────────────┘
//!                     │
//! ┌───────────────────▼──────────────────────────────────────┐
//! │  Service Layer (db::services)                             │
//! │  - Role checks, course planning, logging                  │
//! └───────────────────┬──────────────────────────────────────┘
//!                     │
//! ┌───────────────────▼──────────────────────────────────────┐
//! │  Repository Layer (db::repositories)                      │
//! │  - LocalRepository / PostgresRepository                   │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod auth;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod router;
pub mod state;

pub use auth::{CurrentUser, USER_ID_HEADER};
pub use error::{ApiError, AppError};
pub use router::create_router;
pub use state::AppState;
