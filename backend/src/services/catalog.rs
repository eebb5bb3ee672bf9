//! Course creation planning.
//!
//! Input is validated and filtered here before any backend touches storage:
//! entries with non-positive credit or class count are dropped
//! (filter-on-create), the remaining entries are checked and turned into the
//! exact sections and slots to generate.

use serde::{Deserialize, Serialize};

use crate::api::SemesterId;
use crate::db::repository::{ErrorContext, RepositoryError, RepositoryResult};
use crate::models::credit::{retain_positive, CourseKind, CourseTypeSpec, MAX_MEETINGS_PER_CLASS};

pub const MAX_CODE_LEN: usize = 7;
pub const MAX_NAME_LEN: usize = 50;
pub const MAX_STUDY_SEMESTERS_LEN: usize = 20;
pub const MAX_CLASSES_PER_TYPE: u32 = 64;
/// Upper bound on the credit of a single course type.
pub const MAX_CREDIT: f64 = 24.0;

/// Course creation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCourse {
    pub semester_id: SemesterId,
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub study_semesters: Option<String>,
    #[serde(default)]
    pub course_types: Vec<CourseTypeSpec>,
}

impl NewCourse {
    pub fn new(semester_id: SemesterId, code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            semester_id,
            code: code.into(),
            name: name.into(),
            study_semesters: None,
            course_types: Vec::new(),
        }
    }

    pub fn with_type(mut self, spec: CourseTypeSpec) -> Self {
        self.course_types.push(spec);
        self
    }
}

/// One course type to create, with its generated section layout.
#[derive(Debug, Clone, PartialEq)]
pub struct TypePlan {
    pub kind: CourseKind,
    pub credit: f64,
    pub class_count: u32,
    pub meetings_per_class: u32,
}

impl TypePlan {
    /// `(section number, meeting numbers)` for every section, both 1-based.
    pub fn layout(&self) -> impl Iterator<Item = (u32, std::ops::RangeInclusive<u32>)> + '_ {
        (1..=self.class_count).map(move |number| (number, 1..=self.meetings_per_class))
    }

    pub fn slot_count(&self) -> u32 {
        self.class_count * self.meetings_per_class
    }
}

/// Validated course ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct CoursePlan {
    pub semester_id: SemesterId,
    pub code: String,
    pub name: String,
    pub study_semesters: Option<String>,
    /// Ordered lecture, practicum, tutorial.
    pub types: Vec<TypePlan>,
}

fn invalid(message: String) -> RepositoryError {
    RepositoryError::validation_with_context(
        message,
        ErrorContext::new("create_course").with_entity("course"),
    )
}

fn bounded(field: &str, value: &str, max: usize) -> RepositoryResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(invalid(format!("Course {} must not be empty", field)));
    }
    if value.chars().count() > max {
        return Err(invalid(format!(
            "Course {} must be at most {} characters",
            field, max
        )));
    }
    Ok(value.to_string())
}

pub fn plan_course(new: &NewCourse) -> RepositoryResult<CoursePlan> {
    let code = bounded("code", &new.code, MAX_CODE_LEN)?.to_ascii_uppercase();
    let name = bounded("name", &new.name, MAX_NAME_LEN)?;
    let study_semesters = match new.study_semesters.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(s) if s.chars().count() > MAX_STUDY_SEMESTERS_LEN => {
            return Err(invalid(format!(
                "Study semesters must be at most {} characters",
                MAX_STUDY_SEMESTERS_LEN
            )))
        }
        Some(s) => Some(s.to_string()),
    };

    let mut types = Vec::new();
    for spec in retain_positive(new.course_types.iter().cloned()) {
        if types.iter().any(|t: &TypePlan| t.kind == spec.kind) {
            return Err(invalid(format!("Course type {} is listed more than once", spec.kind)));
        }
        if spec.credit > MAX_CREDIT {
            return Err(invalid(format!(
                "Credit for {} must be at most {}",
                spec.kind, MAX_CREDIT
            )));
        }
        let class_count = u32::try_from(spec.class_count)
            .ok()
            .filter(|n| *n <= MAX_CLASSES_PER_TYPE)
            .ok_or_else(|| {
                invalid(format!(
                    "Class count for {} must be at most {}",
                    spec.kind, MAX_CLASSES_PER_TYPE
                ))
            })?;
        let meetings_per_class = spec.meetings_per_class();
        if !(1..=MAX_MEETINGS_PER_CLASS).contains(&meetings_per_class) {
            return Err(invalid(format!(
                "Meetings per class for {} must be between 1 and {}",
                spec.kind, MAX_MEETINGS_PER_CLASS
            )));
        }
        types.push(TypePlan {
            kind: spec.kind,
            credit: spec.credit,
            class_count,
            meetings_per_class,
        });
    }
    types.sort_by_key(|t| t.kind);

    Ok(CoursePlan {
        semester_id: new.semester_id,
        code,
        name,
        study_semesters,
        types,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> NewCourse {
        NewCourse::new(SemesterId::new(1), "cs101", "Introduction to Computing")
    }

    #[test]
    fn test_plan_filters_non_positive_entries() {
        let plan = plan_course(
            &request()
                .with_type(CourseTypeSpec::new(CourseKind::Lecture, 3.0, 2))
                .with_type(CourseTypeSpec::new(CourseKind::Practicum, 0.0, 1))
                .with_type(CourseTypeSpec::new(CourseKind::Tutorial, 1.0, 0)),
        )
        .unwrap();

        assert_eq!(plan.code, "CS101");
        assert_eq!(plan.types.len(), 1);
        assert_eq!(plan.types[0].kind, CourseKind::Lecture);
        assert_eq!(plan.types[0].class_count, 2);
        assert_eq!(plan.types[0].slot_count(), 2);
    }

    #[test]
    fn test_plan_orders_types_by_kind() {
        let plan = plan_course(
            &request()
                .with_type(CourseTypeSpec::new(CourseKind::Tutorial, 1.0, 1))
                .with_type(CourseTypeSpec::new(CourseKind::Lecture, 2.0, 1)),
        )
        .unwrap();
        let kinds: Vec<_> = plan.types.iter().map(|t| t.kind).collect();
        assert_eq!(kinds, vec![CourseKind::Lecture, CourseKind::Tutorial]);
    }

    #[test]
    fn test_plan_layout() {
        let plan = TypePlan {
            kind: CourseKind::Practicum,
            credit: 1.0,
            class_count: 2,
            meetings_per_class: 3,
        };
        let layout: Vec<(u32, Vec<u32>)> = plan.layout().map(|(n, m)| (n, m.collect())).collect();
        assert_eq!(layout, vec![(1, vec![1, 2, 3]), (2, vec![1, 2, 3])]);
    }

    #[test]
    fn test_plan_rejects_bad_input() {
        assert!(plan_course(&NewCourse::new(SemesterId::new(1), "TOOLONG1", "x")).is_err());
        assert!(plan_course(&NewCourse::new(SemesterId::new(1), "CS1", " ")).is_err());
        assert!(plan_course(&NewCourse::new(SemesterId::new(1), "CS1", "n".repeat(51))).is_err());

        let duplicate = request()
            .with_type(CourseTypeSpec::new(CourseKind::Lecture, 2.0, 1))
            .with_type(CourseTypeSpec::new(CourseKind::Lecture, 3.0, 1));
        assert!(matches!(
            plan_course(&duplicate),
            Err(RepositoryError::ValidationError { .. })
        ));

        let no_meetings =
            request().with_type(CourseTypeSpec::new(CourseKind::Lecture, 2.0, 1).with_meetings(0));
        assert!(plan_course(&no_meetings).is_err());

        let too_many = request().with_type(CourseTypeSpec::new(CourseKind::Lecture, 2.0, 1000));
        assert!(plan_course(&too_many).is_err());
    }

    #[test]
    fn test_plan_rejects_oversized_credit() {
        let huge = request().with_type(CourseTypeSpec::new(CourseKind::Lecture, 1e308, 2));
        assert!(matches!(
            plan_course(&huge),
            Err(RepositoryError::ValidationError { .. })
        ));

        let at_bound = request().with_type(CourseTypeSpec::new(CourseKind::Lecture, MAX_CREDIT, 1));
        assert_eq!(plan_course(&at_bound).unwrap().types[0].credit, MAX_CREDIT);
    }

    #[test]
    fn test_plan_without_retained_types() {
        let plan = plan_course(
            &request().with_type(CourseTypeSpec::new(CourseKind::Lecture, 0.0, 0)),
        )
        .unwrap();
        assert!(plan.types.is_empty());
    }
}
