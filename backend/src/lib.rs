//! # BKD Backend
//!
//! Academic slot-assignment and teaching-load engine.
//!
//! Administrators build a catalog of courses per semester. Each course is
//! split into typed sessions (lecture, practicum, tutorial) with their own
//! credit weight and sections, and every section exposes meeting slots.
//! Instructors claim slots in the single active semester, and each claim
//! updates the instructor's load score (BKD) for that semester.
//!
//! ## Architecture
//!
//! - [`api`]: strongly-typed identifiers and the re-exported public types
//! - [`models`]: catalog, credit and user entities
//! - [`services`]: pure rules (lifecycle, assignment, load aggregation, course planning)
//! - [`db`]: repository traits, the in-memory and Postgres backends, service functions
//! - [`http`]: axum REST API (feature `http-server`)

// Allow large error types - RepositoryError contains rich context for debugging
#![allow(clippy::result_large_err)]

pub mod api;

pub mod db;
pub mod models;

pub mod services;

#[cfg(feature = "http-server")]
pub mod http;
