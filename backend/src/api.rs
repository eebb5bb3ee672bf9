//! Public API surface shared by every layer of the backend.
//!
//! Identifiers are newtypes over the database primary key so a slot id can
//! never be passed where a course id is expected. Domain entities are
//! re-exported here for convenience.

use crate::define_id_type;

pub use crate::models::catalog::{
    Course, CourseClass, CourseClassDetail, CourseSummary, CourseType, Semester, SemesterDetail,
    SemesterState, Slot,
};
pub use crate::models::credit::{CourseKind, CourseTypeSpec};
pub use crate::models::user::{Caller, NewUser, Role, User};
pub use crate::services::assignment::{AssignmentOutcome, AssignmentReceipt};
pub use crate::services::load::{CourseLoad, InstructorLoad, KindLoad, LoadChange, MIN_LOAD};

define_id_type!(i64, SemesterId);
define_id_type!(i64, CourseId);
define_id_type!(i64, CourseTypeId);
define_id_type!(i64, CourseClassId);
define_id_type!(i64, SlotId);
define_id_type!(i64, UserId);
