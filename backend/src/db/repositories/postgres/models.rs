use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;

use super::schema::{course_classes, course_types, courses, instructor_loads, semesters, slots, users};
use crate::api::{CourseClassId, CourseId, CourseTypeId, SemesterId, SlotId, UserId};
use crate::models::catalog::{CourseSummary, Semester};
use crate::models::user::User;

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = semesters)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct SemesterRow {
    pub id: i64,
    pub start_date: NaiveDate,
    pub is_active: bool,
    pub activated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<SemesterRow> for Semester {
    fn from(row: SemesterRow) -> Self {
        Semester {
            id: SemesterId::new(row.id),
            start_date: row.start_date,
            is_active: row.is_active,
            activated_at: row.activated_at,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = semesters)]
pub struct NewSemesterRow {
    pub start_date: NaiveDate,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UserRow {
    pub id: i64,
    pub name: String,
    pub initials: String,
    pub is_admin: bool,
    pub is_active: bool,
}

impl UserRow {
    /// Public view with the active-semester load attached.
    pub fn into_user(self, bkd: f64) -> User {
        User {
            id: UserId::new(self.id),
            name: self.name,
            initials: self.initials,
            is_admin: self.is_admin,
            is_active: self.is_active,
            bkd,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = users)]
pub struct NewUserRow {
    pub name: String,
    pub initials: String,
    pub is_admin: bool,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = courses)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CourseRow {
    pub id: i64,
    pub semester_id: i64,
    pub code: String,
    pub name: String,
    pub study_semesters: Option<String>,
}

impl CourseRow {
    pub fn summary(&self) -> CourseSummary {
        CourseSummary {
            id: CourseId::new(self.id),
            semester_id: SemesterId::new(self.semester_id),
            code: self.code.clone(),
            name: self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = courses)]
pub struct NewCourseRow {
    pub semester_id: i64,
    pub code: String,
    pub name: String,
    pub study_semesters: Option<String>,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = course_types)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CourseTypeRow {
    pub id: i64,
    pub course_id: i64,
    pub kind: i16,
    pub credit: f64,
    pub class_count: i32,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = course_types)]
pub struct NewCourseTypeRow {
    pub course_id: i64,
    pub kind: i16,
    pub credit: f64,
    pub class_count: i32,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = course_classes)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CourseClassRow {
    pub id: i64,
    pub course_type_id: i64,
    pub number: i32,
}

impl CourseClassRow {
    pub fn class_id(&self) -> CourseClassId {
        CourseClassId::new(self.id)
    }

    pub fn type_id(&self) -> CourseTypeId {
        CourseTypeId::new(self.course_type_id)
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = course_classes)]
pub struct NewCourseClassRow {
    pub course_type_id: i64,
    pub number: i32,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = slots)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct SlotRow {
    pub id: i64,
    pub course_class_id: i64,
    pub meeting_number: i32,
    pub occupant_id: Option<i64>,
}

impl SlotRow {
    pub fn slot_id(&self) -> SlotId {
        SlotId::new(self.id)
    }

    pub fn occupant(&self) -> Option<UserId> {
        self.occupant_id.map(UserId::new)
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = slots)]
pub struct NewSlotRow {
    pub course_class_id: i64,
    pub meeting_number: i32,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = instructor_loads)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct InstructorLoadRow {
    pub user_id: i64,
    pub semester_id: i64,
    pub bkd: f64,
}
