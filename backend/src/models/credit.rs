//! Credit model.
//!
//! A course is split into typed sessions. Every session kind carries its own
//! credit weight and number of sections (classes). Load is earned per section:
//! an instructor holding one or more meeting slots of a section earns that
//! section's credit exactly once.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::api::{CourseClassId, UserId};

/// Slots generated per section when a course type entry does not say otherwise.
pub const DEFAULT_MEETINGS_PER_CLASS: u32 = 1;

/// Upper bound on weekly meetings per section.
pub const MAX_MEETINGS_PER_CLASS: u32 = 32;

/// Session kind of a course type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CourseKind {
    Lecture,
    Practicum,
    Tutorial,
}

impl CourseKind {
    /// All kinds in catalog display order.
    pub const ALL: [CourseKind; 3] = [CourseKind::Lecture, CourseKind::Practicum, CourseKind::Tutorial];

    /// Stable numeric code used in storage.
    pub fn code(self) -> i16 {
        match self {
            CourseKind::Lecture => 0,
            CourseKind::Practicum => 1,
            CourseKind::Tutorial => 2,
        }
    }

    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            0 => Some(CourseKind::Lecture),
            1 => Some(CourseKind::Practicum),
            2 => Some(CourseKind::Tutorial),
            _ => None,
        }
    }

    /// One-letter prefix used when naming sections, e.g. `L1`, `P2`.
    pub fn abbreviation(self) -> &'static str {
        match self {
            CourseKind::Lecture => "L",
            CourseKind::Practicum => "P",
            CourseKind::Tutorial => "T",
        }
    }
}

impl fmt::Display for CourseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CourseKind::Lecture => "lecture",
            CourseKind::Practicum => "practicum",
            CourseKind::Tutorial => "tutorial",
        };
        f.write_str(name)
    }
}

/// A typed credit entry as submitted when a course is created.
///
/// `class_count` is signed on purpose: submissions may carry zero or negative
/// counts, which are dropped by [`retain_positive`] rather than rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseTypeSpec {
    pub kind: CourseKind,
    pub credit: f64,
    pub class_count: i64,
    /// Weekly meeting slots per section.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meetings: Option<u32>,
}

impl CourseTypeSpec {
    pub fn new(kind: CourseKind, credit: f64, class_count: i64) -> Self {
        Self {
            kind,
            credit,
            class_count,
            meetings: None,
        }
    }

    pub fn with_meetings(mut self, meetings: u32) -> Self {
        self.meetings = Some(meetings);
        self
    }

    /// Whether this entry survives the catalog filter.
    pub fn is_retained(&self) -> bool {
        self.credit.is_finite() && self.credit > 0.0 && self.class_count > 0
    }

    pub fn meetings_per_class(&self) -> u32 {
        self.meetings.unwrap_or(DEFAULT_MEETINGS_PER_CLASS)
    }
}

/// Drop every entry whose credit or class count is not strictly positive.
pub fn retain_positive(specs: impl IntoIterator<Item = CourseTypeSpec>) -> Vec<CourseTypeSpec> {
    specs.into_iter().filter(CourseTypeSpec::is_retained).collect()
}

/// Load contribution per distinct occupant of one course type.
///
/// `occupied` lists `(section, occupant)` for every occupied slot of the type.
/// Repeated pairs (several slots of the same section held by the same
/// instructor) count once.
pub fn contributions(
    credit: f64,
    occupied: impl IntoIterator<Item = (CourseClassId, UserId)>,
) -> BTreeMap<UserId, f64> {
    let distinct: BTreeSet<(CourseClassId, UserId)> = occupied.into_iter().collect();
    let mut per_user = BTreeMap::new();
    for (_, user_id) in distinct {
        *per_user.entry(user_id).or_insert(0.0) += credit;
    }
    per_user
}
