//! # Core Type Definitions
//!
//! This module contains all core types for the Rollcall attendance store:
//! - Record identifiers (`GroupId`, `RollId`, `StudentId`)
//! - Enumerations with fixed wire names (`RollState`, `Comparison`)
//! - Stored records (`Group`, `Roll`, `StudentRollState`, `GroupStudent`, `Student`)
//! - Inputs for mutations (`NewGroup`, `GroupPatch`, `NewStudent`, `NewRoll`)
//! - Read views (`GroupMember`, `RollRecord`, `RunSummary`, `StoreStats`)
//! - Error types (`RollcallError`)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Identifier of a saved group filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub u64);

/// Identifier of an attendance roll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RollId(pub u64);

/// Identifier of a student.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StudentId(pub u64);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for RollId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for StudentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// ROLL STATE
// =============================================================================

/// A student's recorded status for one roll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RollState {
    Unmark,
    Present,
    Absent,
    Late,
}

impl RollState {
    /// All states in wire order.
    pub const ALL: [RollState; 4] = [Self::Unmark, Self::Present, Self::Absent, Self::Late];

    /// Wire name of the state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unmark => "unmark",
            Self::Present => "present",
            Self::Absent => "absent",
            Self::Late => "late",
        }
    }
}

impl fmt::Display for RollState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RollState {
    type Err = RollcallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| {
                RollcallError::Validation(vec![
                    "\"roll_states\" must be one of [unmark, present, absent, late]".to_string(),
                ])
            })
    }
}

// =============================================================================
// COMPARISON (ltmt)
// =============================================================================

/// The comparison a group applies between a student's incident count and
/// the group's threshold. Serialized as `"<"` or `">"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Comparison {
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = ">")]
    MoreThan,
}

impl Comparison {
    /// Wire symbol of the comparison.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LessThan => "<",
            Self::MoreThan => ">",
        }
    }

    /// Whether `count <op> threshold` holds. Both comparisons are strict.
    #[must_use]
    pub const fn holds(self, count: u32, threshold: u32) -> bool {
        match self {
            Self::LessThan => count < threshold,
            Self::MoreThan => count > threshold,
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Comparison {
    type Err = RollcallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "<" => Ok(Self::LessThan),
            ">" => Ok(Self::MoreThan),
            _ => Err(RollcallError::Validation(vec![
                "\"ltmt\" must be one of [<, >]".to_string(),
            ])),
        }
    }
}

// =============================================================================
// GROUP
// =============================================================================

/// A saved attendance filter and the cached result of its last run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    /// Lookback window in weeks.
    pub number_of_weeks: u32,
    /// The roll state being counted.
    pub roll_states: RollState,
    /// Threshold the incident count is compared against.
    pub incidents: u32,
    pub ltmt: Comparison,
    /// Time of the last successful filter run, `None` until the first run.
    pub run_at: Option<DateTime<Utc>>,
    /// Number of members found by the last successful run.
    pub student_count: u64,
}

impl Group {
    /// Build a fresh group from validated input. The job-owned fields start empty.
    #[must_use]
    pub fn from_new(id: GroupId, input: NewGroup) -> Self {
        Self {
            id,
            name: input.name,
            number_of_weeks: input.number_of_weeks,
            roll_states: input.roll_states,
            incidents: input.incidents,
            ltmt: input.ltmt,
            run_at: None,
            student_count: 0,
        }
    }

    /// Apply a partial update. Only fields present in the patch change.
    pub fn apply(&mut self, patch: GroupPatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(weeks) = patch.number_of_weeks {
            self.number_of_weeks = weeks;
        }
        if let Some(state) = patch.roll_states {
            self.roll_states = state;
        }
        if let Some(incidents) = patch.incidents {
            self.incidents = incidents;
        }
        if let Some(ltmt) = patch.ltmt {
            self.ltmt = ltmt;
        }
    }
}

/// Validated input for creating a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGroup {
    pub name: String,
    pub number_of_weeks: u32,
    pub roll_states: RollState,
    pub incidents: u32,
    pub ltmt: Comparison,
}

/// Validated partial update of a group's filter definition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupPatch {
    pub name: Option<String>,
    pub number_of_weeks: Option<u32>,
    pub roll_states: Option<RollState>,
    pub incidents: Option<u32>,
    pub ltmt: Option<Comparison>,
}

impl GroupPatch {
    /// True when the patch changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.number_of_weeks.is_none()
            && self.roll_states.is_none()
            && self.incidents.is_none()
            && self.ltmt.is_none()
    }
}

// =============================================================================
// ROLLS & STUDENTS
// =============================================================================

/// One attendance session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roll {
    pub id: RollId,
    pub completed_at: DateTime<Utc>,
}

/// One student's recorded state for one roll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentRollState {
    pub roll_id: RollId,
    pub student_id: StudentId,
    pub state: RollState,
}

/// Derived membership of a student in a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupStudent {
    pub group_id: GroupId,
    pub student_id: StudentId,
    pub incident_count: u32,
}

/// A student. Reference data for the filter job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    pub first_name: String,
    pub last_name: String,
}

impl Student {
    /// First and last name joined by a space.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Validated input for creating a student.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStudent {
    pub first_name: String,
    pub last_name: String,
}

/// One student's mark inside a roll, without the roll id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollMark {
    pub student_id: StudentId,
    pub state: RollState,
}

/// Validated input for recording a roll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRoll {
    pub completed_at: DateTime<Utc>,
    pub states: Vec<RollMark>,
}

/// A roll together with every state recorded for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollRecord {
    pub id: RollId,
    pub completed_at: DateTime<Utc>,
    pub states: Vec<RollMark>,
}

// =============================================================================
// VIEWS
// =============================================================================

/// A group member joined with its student record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMember {
    pub id: StudentId,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub incident_count: u32,
}

/// Per-group outcome of one filter run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRunResult {
    pub group_id: GroupId,
    pub name: String,
    pub student_count: u64,
}

/// Outcome of a complete filter run across all groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_at: DateTime<Utc>,
    pub groups: Vec<GroupRunResult>,
    /// Sum of `student_count` over all groups.
    pub total_memberships: u64,
}

/// Record counts per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub groups: u64,
    pub rolls: u64,
    pub students: u64,
    pub roll_states: u64,
    pub group_students: u64,
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the Rollcall system.
///
/// - No silent failures
/// - Use `Result<T, RollcallError>` for fallible operations
/// - Store failures abort the enclosing transaction
#[derive(Debug, Error)]
pub enum RollcallError {
    /// One or more input fields were rejected. Messages are kept in field order.
    #[error("{}", .0.join(","))]
    Validation(Vec<String>),

    /// The requested group does not exist.
    #[error("Group doesn't exist.")]
    GroupNotFound(GroupId),

    /// The requested student does not exist.
    #[error("Student {0} doesn't exist.")]
    StudentNotFound(StudentId),

    /// The requested roll does not exist.
    #[error("Roll {0} doesn't exist.")]
    RollNotFound(RollId),

    /// The embedded database reported an error.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A stored record could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A file or socket operation failed.
    #[error("I/O error: {0}")]
    Io(String),
}

impl RollcallError {
    /// True for errors caused by the caller's input rather than the system.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::GroupNotFound(_)
                | Self::StudentNotFound(_)
                | Self::RollNotFound(_)
        )
    }
}

macro_rules! storage_error_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for RollcallError {
                fn from(e: $ty) -> Self {
                    Self::Storage(e.to_string())
                }
            }
        )*
    };
}

storage_error_from!(
    redb::Error,
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);

impl From<postcard::Error> for RollcallError {
    fn from(e: postcard::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comparison_is_strict() {
        assert!(Comparison::LessThan.holds(2, 3));
        assert!(!Comparison::LessThan.holds(3, 3));
        assert!(!Comparison::LessThan.holds(4, 3));
        assert!(Comparison::MoreThan.holds(4, 3));
        assert!(!Comparison::MoreThan.holds(3, 3));
        assert!(!Comparison::MoreThan.holds(2, 3));
    }

    #[test]
    fn comparison_wire_names() {
        assert_eq!("<".parse::<Comparison>().ok(), Some(Comparison::LessThan));
        assert_eq!(">".parse::<Comparison>().ok(), Some(Comparison::MoreThan));
        assert!("=".parse::<Comparison>().is_err());
        assert_eq!(Comparison::MoreThan.to_string(), ">");
    }

    #[test]
    fn roll_state_round_trips_wire_name() {
        for state in RollState::ALL {
            assert_eq!(state.as_str().parse::<RollState>().ok(), Some(state));
        }
        assert!("Absent".parse::<RollState>().is_err());
    }

    #[test]
    fn patch_only_touches_given_fields() {
        let mut group = Group::from_new(
            GroupId(1),
            NewGroup {
                name: "Chronic absence".to_string(),
                number_of_weeks: 4,
                roll_states: RollState::Absent,
                incidents: 3,
                ltmt: Comparison::MoreThan,
            },
        );
        let before = group.clone();

        group.apply(GroupPatch {
            name: Some("Renamed".to_string()),
            ..GroupPatch::default()
        });

        assert_eq!(group.name, "Renamed");
        assert_eq!(group.number_of_weeks, before.number_of_weeks);
        assert_eq!(group.roll_states, before.roll_states);
        assert_eq!(group.incidents, before.incidents);
        assert_eq!(group.ltmt, before.ltmt);
        assert_eq!(group.run_at, None);
        assert_eq!(group.student_count, 0);
    }

    #[test]
    fn validation_error_joins_messages() {
        let err = RollcallError::Validation(vec![
            "\"name\" is required".to_string(),
            "\"ltmt\" is required".to_string(),
        ]);
        assert_eq!(err.to_string(), "\"name\" is required,\"ltmt\" is required");
        assert!(err.is_client_error());
        let storage = RollcallError::Storage("disk".to_string());
        assert!(!storage.is_client_error());
    }
}
