//! Catalog entities: semesters and the courses, sections and slots they own.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::api::{CourseClassId, CourseId, CourseTypeId, SemesterId, SlotId, UserId};
use crate::models::credit::CourseKind;

/// Lifecycle state of a semester, derived from its flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemesterState {
    /// Created, never activated. Catalog is editable, slots are not claimable.
    Draft,
    /// The single live semester.
    Active,
    /// Previously active, superseded by another activation. Read-only.
    Archived,
}

/// A semester and its activation flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Semester {
    pub id: SemesterId,
    pub start_date: NaiveDate,
    pub is_active: bool,
    /// First activation time; set once and never cleared.
    pub activated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Semester {
    pub fn state(&self) -> SemesterState {
        match (self.is_active, self.activated_at) {
            (true, _) => SemesterState::Active,
            (false, Some(_)) => SemesterState::Archived,
            (false, None) => SemesterState::Draft,
        }
    }

    /// Academic-year label: semesters starting January to June are the even
    /// half of the year that began the previous July.
    pub fn display_name(&self) -> String {
        let year = self.start_date.year();
        if self.start_date.month() <= 6 {
            format!("Even {}/{}", year - 1, year)
        } else {
            format!("Odd {}/{}", year, year + 1)
        }
    }
}

/// Lightweight course listing entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseSummary {
    pub id: CourseId,
    pub semester_id: SemesterId,
    pub code: String,
    pub name: String,
}

/// Semester together with its course listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemesterDetail {
    pub semester: Semester,
    pub courses: Vec<CourseSummary>,
}

/// One weekly meeting of a section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub id: SlotId,
    pub course_class_id: CourseClassId,
    /// 1-based position within the section.
    pub meeting_number: u32,
    pub occupant: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occupant_initials: Option<String>,
}

impl Slot {
    pub fn is_empty(&self) -> bool {
        self.occupant.is_none()
    }
}

/// A section of a course type with its ordered slots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseClass {
    pub id: CourseClassId,
    pub course_type_id: CourseTypeId,
    pub number: u32,
    pub slots: Vec<Slot>,
}

/// Credit weight and sections of one session kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseType {
    pub id: CourseTypeId,
    pub course_id: CourseId,
    pub kind: CourseKind,
    pub credit: f64,
    pub class_count: u32,
    pub classes: Vec<CourseClass>,
}

/// A course with its full catalog tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub id: CourseId,
    pub semester_id: SemesterId,
    pub code: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub study_semesters: Option<String>,
    pub course_types: Vec<CourseType>,
}

impl Course {
    pub fn summary(&self) -> CourseSummary {
        CourseSummary {
            id: self.id,
            semester_id: self.semester_id,
            code: self.code.clone(),
            name: self.name.clone(),
        }
    }

    pub fn slot_count(&self) -> usize {
        self.course_types
            .iter()
            .flat_map(|t| t.classes.iter())
            .map(|c| c.slots.len())
            .sum()
    }
}

/// A section viewed on its own, with enough context to label it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseClassDetail {
    pub semester_id: SemesterId,
    pub course_id: CourseId,
    pub course_code: String,
    pub course_name: String,
    pub kind: CourseKind,
    pub credit: f64,
    #[serde(flatten)]
    pub class: CourseClass,
}

impl CourseClassDetail {
    /// Section label such as `L1` or `P2`.
    pub fn label(&self) -> String {
        format!("{}{}", self.kind.abbreviation(), self.class.number)
    }
}
