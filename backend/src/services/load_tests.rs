use proptest::prelude::*;

use crate::api::{CourseClassId, CourseId, SemesterId, SlotId, UserId};
use crate::models::credit::CourseKind;
use crate::services::load::{aggregate, is_under_loaded, total, Holding, MIN_LOAD};

fn holding(slot: i64, course: i64, kind: CourseKind, class: i64, credit: f64) -> Holding {
    Holding {
        slot_id: SlotId::new(slot),
        course_id: CourseId::new(course),
        course_code: format!("C{}", course),
        course_name: format!("Course {}", course),
        kind,
        course_class_id: CourseClassId::new(class),
        credit,
    }
}

#[test]
fn test_aggregate_empty() {
    let load = aggregate(UserId::new(1), SemesterId::new(1), &[]);
    assert_eq!(load.bkd, 0.0);
    assert!(load.under_loaded);
    assert!(load.courses.is_empty());
}

#[test]
fn test_lecture_practicum_tutorial_sum_once() {
    let holdings = vec![
        holding(1, 1, CourseKind::Lecture, 10, 3.0),
        holding(2, 1, CourseKind::Lecture, 10, 3.0),
        holding(3, 1, CourseKind::Practicum, 20, 1.0),
        holding(4, 1, CourseKind::Tutorial, 30, 1.0),
    ];

    let load = aggregate(UserId::new(1), SemesterId::new(1), &holdings);

    assert_eq!(load.bkd, 5.0);
    assert_eq!(total(&holdings), 5.0);
    assert_eq!(load.courses.len(), 1);

    let course = &load.courses[0];
    assert_eq!(course.credit, 5.0);
    let lecture = course
        .kinds
        .iter()
        .find(|k| k.kind == CourseKind::Lecture)
        .unwrap();
    assert_eq!(lecture.sections, 1);
    assert_eq!(lecture.slots, 2);
    assert_eq!(lecture.credit, 3.0);
}

#[test]
fn test_two_sections_of_same_type_count_twice() {
    let holdings = vec![
        holding(1, 1, CourseKind::Lecture, 10, 3.0),
        holding(2, 1, CourseKind::Lecture, 11, 3.0),
    ];
    let load = aggregate(UserId::new(1), SemesterId::new(1), &holdings);
    assert_eq!(load.bkd, 6.0);
    assert_eq!(load.courses[0].kinds[0].sections, 2);
    assert!(!load.under_loaded);
}

#[test]
fn test_courses_sorted_by_code() {
    let mut first = holding(1, 2, CourseKind::Lecture, 10, 2.0);
    first.course_code = "MA201".into();
    let mut second = holding(2, 1, CourseKind::Lecture, 11, 2.0);
    second.course_code = "CS101".into();

    let load = aggregate(UserId::new(1), SemesterId::new(1), &[first, second]);
    let codes: Vec<&str> = load.courses.iter().map(|c| c.code.as_str()).collect();
    assert_eq!(codes, vec!["CS101", "MA201"]);
}

#[test]
fn test_threshold() {
    assert!(is_under_loaded(MIN_LOAD - 0.5));
    assert!(!is_under_loaded(MIN_LOAD));
}

proptest! {
    #[test]
    fn prop_repeated_slots_never_inflate_load(
        classes in proptest::collection::vec((0i64..6, 1u32..4), 1..12),
        repeats in 1usize..4,
    ) {
        let mut holdings = Vec::new();
        let mut slot = 0;
        for (class, credit) in &classes {
            for _ in 0..repeats {
                slot += 1;
                holdings.push(holding(slot, 1, CourseKind::Lecture, *class, *credit as f64));
            }
        }
        let once: Vec<Holding> = holdings.iter().step_by(repeats).cloned().collect();

        let repeated = aggregate(UserId::new(1), SemesterId::new(1), &holdings);
        let single = aggregate(UserId::new(1), SemesterId::new(1), &once);
        prop_assert_eq!(repeated.bkd, single.bkd);
        prop_assert_eq!(repeated.bkd, total(&holdings));
    }

    #[test]
    fn prop_breakdown_sums_to_total(
        entries in proptest::collection::vec((1i64..4, 0usize..3, 0i64..8, 1u32..5), 0..20),
    ) {
        let holdings: Vec<Holding> = entries
            .iter()
            .enumerate()
            .map(|(i, (course, kind, class, credit))| {
                // A section belongs to exactly one course and kind.
                let class_id = course * 100 + (*kind as i64) * 10 + class;
                holding(i as i64, *course, CourseKind::ALL[*kind], class_id, *credit as f64)
            })
            .collect();

        let load = aggregate(UserId::new(1), SemesterId::new(1), &holdings);
        let from_courses: f64 = load.courses.iter().map(|c| c.credit).sum();
        prop_assert_eq!(load.bkd, from_courses);
        prop_assert_eq!(load.bkd, total(&holdings));
    }
}
