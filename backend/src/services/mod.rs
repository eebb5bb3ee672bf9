//! Engine rules.
//!
//! Pure decision logic shared by every repository backend: semester
//! lifecycle guards, course planning, slot transitions and load aggregation.
//! Backends call these inside their own critical sections so a decision and
//! the write it leads to happen under the same lock.

pub mod assignment;
pub mod catalog;
pub mod lifecycle;
pub mod load;

#[cfg(test)]
mod load_tests;

pub use assignment::{plan_claim, plan_reassign, plan_release, AssignmentOutcome, SlotTransition};
pub use catalog::{plan_course, CoursePlan, NewCourse, TypePlan};
pub use load::{aggregate, Holding, InstructorLoad, LoadChange, MIN_LOAD};
