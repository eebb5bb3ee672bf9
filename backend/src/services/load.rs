//! Load aggregation.
//!
//! An instructor's BKD for a semester is the sum, over every section in which
//! they hold at least one slot, of that section's course-type credit. Holding
//! several meetings of one section does not multiply its credit.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::api::{CourseClassId, CourseId, SemesterId, SlotId, UserId};
use crate::models::credit::CourseKind;

/// Minimum acceptable load. Instructors below it are flagged as under-loaded.
pub const MIN_LOAD: f64 = 4.0;

pub fn is_under_loaded(bkd: f64) -> bool {
    bkd < MIN_LOAD
}

/// One occupied slot attributed to an instructor, with the catalog context
/// needed to group it.
#[derive(Debug, Clone, PartialEq)]
pub struct Holding {
    pub slot_id: SlotId,
    pub course_id: CourseId,
    pub course_code: String,
    pub course_name: String,
    pub kind: CourseKind,
    pub course_class_id: CourseClassId,
    /// Credit of the section's course type.
    pub credit: f64,
}

/// Load earned from one session kind of a course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KindLoad {
    pub kind: CourseKind,
    /// Distinct sections held.
    pub sections: u32,
    /// Slots held across those sections.
    pub slots: u32,
    pub credit: f64,
}

/// Load earned from one course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseLoad {
    pub course_id: CourseId,
    pub code: String,
    pub name: String,
    pub kinds: Vec<KindLoad>,
    pub credit: f64,
}

/// An instructor's load for one semester with its per-course breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstructorLoad {
    pub user_id: UserId,
    pub semester_id: SemesterId,
    pub bkd: f64,
    pub under_loaded: bool,
    pub courses: Vec<CourseLoad>,
}

/// Load of one instructor before and after a mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadChange {
    pub user_id: UserId,
    pub semester_id: SemesterId,
    pub previous: f64,
    pub bkd: f64,
}

impl LoadChange {
    pub fn is_changed(&self) -> bool {
        self.previous != self.bkd
    }
}

#[derive(Default)]
struct KindAccumulator {
    sections: BTreeSet<CourseClassId>,
    slots: u32,
    credit: f64,
}

struct CourseAccumulator {
    code: String,
    name: String,
    kinds: BTreeMap<CourseKind, KindAccumulator>,
}

/// Total BKD of a set of holdings.
pub fn total(holdings: &[Holding]) -> f64 {
    let mut seen = BTreeSet::new();
    holdings
        .iter()
        .filter(|h| seen.insert(h.course_class_id))
        .map(|h| h.credit)
        .sum()
}

/// Group holdings by course and kind, counting each section's credit once.
pub fn aggregate(user_id: UserId, semester_id: SemesterId, holdings: &[Holding]) -> InstructorLoad {
    let mut courses: BTreeMap<CourseId, CourseAccumulator> = BTreeMap::new();

    for holding in holdings {
        let course = courses
            .entry(holding.course_id)
            .or_insert_with(|| CourseAccumulator {
                code: holding.course_code.clone(),
                name: holding.course_name.clone(),
                kinds: BTreeMap::new(),
            });
        let kind = course.kinds.entry(holding.kind).or_default();
        kind.slots += 1;
        if kind.sections.insert(holding.course_class_id) {
            kind.credit += holding.credit;
        }
    }

    let mut course_loads: Vec<CourseLoad> = courses
        .into_iter()
        .map(|(course_id, acc)| {
            let kinds: Vec<KindLoad> = acc
                .kinds
                .into_iter()
                .map(|(kind, k)| KindLoad {
                    kind,
                    sections: k.sections.len() as u32,
                    slots: k.slots,
                    credit: k.credit,
                })
                .collect();
            let credit = kinds.iter().map(|k| k.credit).sum();
            CourseLoad {
                course_id,
                code: acc.code,
                name: acc.name,
                kinds,
                credit,
            }
        })
        .collect();
    course_loads.sort_by(|a, b| a.code.cmp(&b.code).then(a.course_id.cmp(&b.course_id)));

    let bkd = course_loads.iter().map(|c| c.credit).sum();
    InstructorLoad {
        user_id,
        semester_id,
        bkd,
        under_loaded: is_under_loaded(bkd),
        courses: course_loads,
    }
}
