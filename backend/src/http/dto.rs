//! Data Transfer Objects for the HTTP API.
//!
//! Engine types that already derive `Serialize` are sent as they are. The
//! wrappers here add derived fields (semester state and display name, the
//! under-loaded flag) or shape request bodies.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub use crate::api::{
    AssignmentReceipt, Course, CourseClassDetail, CourseSummary, InstructorLoad, LoadChange,
    NewUser, Slot,
};
pub use crate::db::repository::CascadeReport;
pub use crate::services::catalog::NewCourse;

use crate::api::{Role, Semester, SemesterDetail, SemesterId, SemesterState, User, UserId};

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub database: String,
}

/// Semester as shown to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemesterDto {
    pub id: SemesterId,
    pub start_date: NaiveDate,
    pub display_name: String,
    pub state: SemesterState,
    pub is_active: bool,
    pub activated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<Semester> for SemesterDto {
    fn from(semester: Semester) -> Self {
        Self {
            id: semester.id,
            display_name: semester.display_name(),
            state: semester.state(),
            start_date: semester.start_date,
            is_active: semester.is_active,
            activated_at: semester.activated_at,
            created_at: semester.created_at,
        }
    }
}

/// Response for listing semesters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemesterListResponse {
    pub semesters: Vec<SemesterDto>,
    pub total: usize,
}

/// A semester with the courses it owns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemesterDetailResponse {
    pub semester: SemesterDto,
    pub courses: Vec<CourseSummary>,
}

impl From<SemesterDetail> for SemesterDetailResponse {
    fn from(detail: SemesterDetail) -> Self {
        Self {
            semester: detail.semester.into(),
            courses: detail.courses,
        }
    }
}

/// Request body for creating a semester.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSemesterRequest {
    /// First day of the semester
    pub date: NaiveDate,
}

/// Query parameters for the course listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CourseListQuery {
    /// Defaults to the active semester
    #[serde(default)]
    pub semester_id: Option<i64>,
}

/// Response for listing courses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseListResponse {
    pub courses: Vec<CourseSummary>,
    pub total: usize,
}

/// Request body for an administrative reassignment. `null` empties the slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReassignRequest {
    #[serde(default)]
    pub user_id: Option<UserId>,
}

/// User as shown to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDto {
    pub id: UserId,
    pub name: String,
    pub initials: String,
    pub role: Role,
    pub is_admin: bool,
    pub is_active: bool,
    /// Load in the active semester
    pub bkd: f64,
    pub under_loaded: bool,
}

impl From<User> for UserDto {
    fn from(user: User) -> Self {
        Self {
            role: user.role(),
            under_loaded: user.is_under_loaded(),
            id: user.id,
            name: user.name,
            initials: user.initials,
            is_admin: user.is_admin,
            is_active: user.is_active,
            bkd: user.bkd,
        }
    }
}

/// Response for listing users.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserListResponse {
    pub users: Vec<UserDto>,
    pub total: usize,
}

/// Request body for toggling a user's active flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetActiveRequest {
    pub is_active: bool,
}

/// User after an activation change, plus loads touched by released slots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetActiveResponse {
    pub user: UserDto,
    pub loads: Vec<LoadChange>,
}
