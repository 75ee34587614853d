//! # Filter Run Tests
//!
//! End-to-end behaviour of the group filter job against a real store.
//!
//! ## Areas
//! - Membership: who joins a group and with which count
//! - Atomicity: a failing run changes nothing
//! - Lifecycle: create, update, delete around runs

#![allow(clippy::unwrap_used, clippy::panic)]

use chrono::{DateTime, TimeDelta, Utc};
use rollcall_core::Comparison::{LessThan, MoreThan};
use rollcall_core::{
    Comparison, GroupId, GroupPatch, NewGroup, NewRoll, NewStudent, RollMark, RollState,
    RollcallError, Store, StudentId,
};

fn now() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-11-04T15:00:00Z")
        .map(|t| t.with_timezone(&Utc))
        .unwrap()
}

fn student(store: &Store, first: &str, last: &str) -> StudentId {
    store
        .create_student(NewStudent {
            first_name: first.to_string(),
            last_name: last.to_string(),
        })
        .unwrap()
        .id
}

fn mark(store: &Store, days_ago: i64, marks: &[(StudentId, RollState)]) {
    store
        .create_roll(NewRoll {
            completed_at: now() - TimeDelta::days(days_ago),
            states: marks
                .iter()
                .map(|&(student_id, state)| RollMark { student_id, state })
                .collect(),
        })
        .unwrap();
}

fn group(
    store: &Store,
    name: &str,
    weeks: u32,
    state: RollState,
    incidents: u32,
    ltmt: Comparison,
) -> GroupId {
    store
        .create_group(NewGroup {
            name: name.to_string(),
            number_of_weeks: weeks,
            roll_states: state,
            incidents,
            ltmt,
        })
        .unwrap()
        .id
}

// =============================================================================
// MEMBERSHIP
// =============================================================================

mod membership {
    use super::*;

    /// Three absences inside a two-week window beat a threshold of two.
    #[test]
    fn chronic_absence_example() {
        let store = Store::in_memory().unwrap();
        let kim = student(&store, "Kim", "Lee");
        let g = group(&store, "absent", 2, RollState::Absent, 2, MoreThan);

        for days in [2, 5, 12] {
            mark(&store, days, &[(kim, RollState::Absent)]);
        }

        store.run_group_filters(now()).unwrap();

        let members = store.group_students(g).unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].id, kim);
        assert_eq!(members[0].incident_count, 3);
        assert_eq!(store.get_group(g).unwrap().student_count, 1);
    }

    /// Several groups and several students each get their own counts.
    #[test]
    fn counts_are_not_shared_between_groups_or_students() {
        let store = Store::in_memory().unwrap();
        let a = student(&store, "Ana", "Diaz");
        let b = student(&store, "Ben", "Cole");
        let c = student(&store, "Cy", "Fox");

        let late = group(&store, "late", 4, RollState::Late, 0, MoreThan);
        let absent = group(&store, "absent", 4, RollState::Absent, 1, MoreThan);

        let (lt, ab) = (RollState::Late, RollState::Absent);
        mark(&store, 1, &[(a, lt), (b, ab), (c, ab)]);
        mark(&store, 2, &[(a, lt), (b, ab), (c, lt)]);
        mark(&store, 3, &[(a, lt), (b, ab), (c, ab)]);

        store.run_group_filters(now()).unwrap();

        let late_members: Vec<(StudentId, u32)> = store
            .group_students(late)
            .unwrap()
            .into_iter()
            .map(|m| (m.id, m.incident_count))
            .collect();
        assert_eq!(late_members, vec![(a, 3), (c, 1)]);

        let absent_members: Vec<(StudentId, u32)> = store
            .group_students(absent)
            .unwrap()
            .into_iter()
            .map(|m| (m.id, m.incident_count))
            .collect();
        assert_eq!(absent_members, vec![(b, 3), (c, 2)]);
    }

    /// A student with no matching roll never joins a less-than group.
    #[test]
    fn less_than_skips_students_without_incidents() {
        let store = Store::in_memory().unwrap();
        let present = student(&store, "Pat", "Ray");
        let once = student(&store, "Oli", "Sun");
        let g = group(&store, "rarely late", 2, RollState::Late, 2, LessThan);

        mark(
            &store,
            1,
            &[(present, RollState::Present), (once, RollState::Late)],
        );

        store.run_group_filters(now()).unwrap();

        let members = store.group_students(g).unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].id, once);
    }

    /// The comparison follows the stored group, so editing it flips the result.
    #[test]
    fn comparison_is_read_from_the_group() {
        let store = Store::in_memory().unwrap();
        let s = student(&store, "Max", "Ito");
        let g = group(&store, "flip", 1, RollState::Absent, 2, MoreThan);
        mark(&store, 1, &[(s, RollState::Absent)]);

        store.run_group_filters(now()).unwrap();
        assert!(store.group_students(g).unwrap().is_empty());

        let patch = GroupPatch {
            ltmt: Some(LessThan),
            ..GroupPatch::default()
        };
        store.update_group(g, patch).unwrap();
        store.run_group_filters(now()).unwrap();
        assert_eq!(store.group_students(g).unwrap().len(), 1);
    }

    /// A group with no qualifying students still records the run.
    #[test]
    fn empty_result_still_stamps_run_at() {
        let store = Store::in_memory().unwrap();
        let g = group(&store, "nobody", 1, RollState::Unmark, 0, MoreThan);

        let summary = store.run_group_filters(now()).unwrap();

        assert_eq!(summary.total_memberships, 0);
        let stored = store.get_group(g).unwrap();
        assert_eq!(stored.run_at, Some(now()));
        assert_eq!(stored.student_count, 0);
    }
}

// =============================================================================
// ATOMICITY
// =============================================================================

mod atomicity {
    use super::*;
    use tempfile::tempdir;

    /// A run over no groups succeeds and writes nothing.
    #[test]
    fn no_groups_is_a_successful_noop() {
        let store = Store::in_memory().unwrap();
        let summary = store.run_group_filters(now()).unwrap();
        assert!(summary.groups.is_empty());
        assert_eq!(store.stats().unwrap().group_students, 0);
    }

    /// A rejected roll leaves the file-backed store as it was after reopening.
    #[test]
    fn rejected_roll_is_not_persisted() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("rolls.redb");
        {
            let store = Store::open(&path).unwrap();
            let s = student(&store, "Uma", "Vo");
            let err = store
                .create_roll(NewRoll {
                    completed_at: now(),
                    states: vec![
                        RollMark {
                            student_id: s,
                            state: RollState::Late,
                        },
                        RollMark {
                            student_id: StudentId(50),
                            state: RollState::Late,
                        },
                    ],
                })
                .unwrap_err();
            assert!(matches!(
                err,
                RollcallError::StudentNotFound(StudentId(50))
            ));
        }
        let store = Store::open(&path).unwrap();
        let stats = store.stats().unwrap();
        assert_eq!(stats.students, 1);
        assert_eq!(stats.rolls, 0);
        assert_eq!(stats.roll_states, 0);
    }
}

// =============================================================================
// LIFECYCLE
// =============================================================================

mod lifecycle {
    use super::*;

    #[test]
    fn missing_group_operations_fail_cleanly() {
        let store = Store::in_memory().unwrap();
        let missing = GroupId(3);

        assert_eq!(
            store.get_group(missing).unwrap_err().to_string(),
            "Group doesn't exist."
        );
        assert!(store.delete_group(missing).unwrap_err().is_client_error());
        assert!(matches!(
            store.group_students(missing),
            Err(RollcallError::GroupNotFound(_))
        ));
    }

    /// Editing a group leaves the last run's cache alone until the next run.
    #[test]
    fn update_does_not_touch_run_fields() {
        let store = Store::in_memory().unwrap();
        let s = student(&store, "Zoe", "Hart");
        let g = group(&store, "g", 1, RollState::Absent, 0, MoreThan);
        mark(&store, 1, &[(s, RollState::Absent)]);
        store.run_group_filters(now()).unwrap();

        let patch = GroupPatch {
            incidents: Some(5),
            ..GroupPatch::default()
        };
        let updated = store.update_group(g, patch).unwrap();

        assert_eq!(updated.incidents, 5);
        assert_eq!(updated.student_count, 1);
        assert_eq!(updated.run_at, Some(now()));
        assert_eq!(store.group_students(g).unwrap().len(), 1);
    }

    #[test]
    fn listing_is_in_id_order() {
        let store = Store::in_memory().unwrap();
        for name in ["c", "a", "b"] {
            group(&store, name, 1, RollState::Late, 1, MoreThan);
        }
        let names: Vec<String> = store
            .list_groups()
            .unwrap()
            .into_iter()
            .map(|g| g.name)
            .collect();
        assert_eq!(names, vec!["c", "a", "b"]);
    }
}
