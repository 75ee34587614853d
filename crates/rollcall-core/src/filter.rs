//! # Group Filter Evaluator
//!
//! Decides which students currently belong to a group.
//!
//! For one group the evaluator:
//! 1. computes the cutoff as `now - number_of_weeks`,
//! 2. keeps rolls completed strictly after the cutoff,
//! 3. keeps student roll states on those rolls equal to the group's state,
//! 4. counts the kept states per student,
//! 5. keeps students whose count satisfies `count <ltmt> incidents`.
//!
//! A student with no matching state is never counted, so it can never be a
//! member, even when `ltmt` is `<`.
//!
//! This module is pure: the clock and the records are inputs. The store
//! wraps it in a single write transaction (see `storage::redb_store`).

use crate::primitives::MILLISECONDS_IN_WEEK;
use crate::{Group, GroupId, GroupStudent, Roll, RollId, RollState, StudentId, StudentRollState};
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::{BTreeMap, BTreeSet};

/// Outcome of evaluating a single group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupEvaluation {
    pub group_id: GroupId,
    /// Rolls completed at or before this instant were ignored.
    pub cutoff: DateTime<Utc>,
    /// Members in ascending student id order.
    pub members: Vec<GroupStudent>,
}

impl GroupEvaluation {
    /// Number of members.
    #[must_use]
    pub fn student_count(&self) -> u64 {
        self.members.len() as u64
    }
}

/// Start of the lookback window for `number_of_weeks` ending at `now`.
///
/// Saturates at the earliest representable instant instead of overflowing.
#[must_use]
pub fn cutoff(now: DateTime<Utc>, number_of_weeks: u32) -> DateTime<Utc> {
    i64::from(number_of_weeks)
        .checked_mul(MILLISECONDS_IN_WEEK)
        .and_then(TimeDelta::try_milliseconds)
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Ids of the rolls completed strictly after `cutoff`.
#[must_use]
pub fn rolls_after(rolls: &[Roll], cutoff: DateTime<Utc>) -> BTreeSet<RollId> {
    rolls
        .iter()
        .filter(|roll| roll.completed_at > cutoff)
        .map(|roll| roll.id)
        .collect()
}

/// Count states equal to `state` per student, restricted to `window` rolls.
#[must_use]
pub fn count_incidents(
    states: &[StudentRollState],
    window: &BTreeSet<RollId>,
    state: RollState,
) -> BTreeMap<StudentId, u32> {
    let mut counts: BTreeMap<StudentId, u32> = BTreeMap::new();
    for record in states {
        if record.state == state && window.contains(&record.roll_id) {
            let count = counts.entry(record.student_id).or_insert(0);
            *count = count.saturating_add(1);
        }
    }
    counts
}

/// Evaluate one group against the given rolls and roll states.
#[must_use]
pub fn evaluate_group(
    group: &Group,
    rolls: &[Roll],
    states: &[StudentRollState],
    now: DateTime<Utc>,
) -> GroupEvaluation {
    let cutoff = cutoff(now, group.number_of_weeks);
    let window = rolls_after(rolls, cutoff);
    let counts = count_incidents(states, &window, group.roll_states);

    let members = counts
        .into_iter()
        .filter(|&(_, count)| group.ltmt.holds(count, group.incidents))
        .map(|(student_id, incident_count)| GroupStudent {
            group_id: group.id,
            student_id,
            incident_count,
        })
        .collect();

    GroupEvaluation {
        group_id: group.id,
        cutoff,
        members,
    }
}

// =============================================================================
// TESTS
// =============================================================================
