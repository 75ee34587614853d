//! # Primitives
//!
//! Fixed runtime constants for the Rollcall core.
//!
//! These are compiled into the binary and are immutable at runtime.

/// Length of one lookback week in milliseconds (7 × 24 h).
pub const MILLISECONDS_IN_WEEK: i64 = 604_800_000;

/// Metadata key for the next group id.
pub const NEXT_GROUP_ID: &str = "next_group_id";

/// Metadata key for the next roll id.
pub const NEXT_ROLL_ID: &str = "next_roll_id";

/// Metadata key for the next student id.
pub const NEXT_STUDENT_ID: &str = "next_student_id";

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum length in bytes for group and student names.
pub const MAX_NAME_LENGTH: usize = 128;

/// Smallest accepted lookback window.
pub const MIN_LOOKBACK_WEEKS: i64 = 1;

/// Largest accepted lookback window (ten years).
pub const MAX_LOOKBACK_WEEKS: i64 = 520;

/// Largest accepted incident threshold.
pub const MAX_INCIDENTS: i64 = 10_000;

/// Maximum number of student states recorded in a single roll.
pub const MAX_STATES_PER_ROLL: usize = 10_000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn week_is_seven_days() {
        assert_eq!(MILLISECONDS_IN_WEEK, 7 * 24 * 60 * 60 * 1000);
    }

    #[test]
    fn lookback_bounds_are_ordered() {
        assert!(MIN_LOOKBACK_WEEKS >= 1);
        assert!(MIN_LOOKBACK_WEEKS < MAX_LOOKBACK_WEEKS);
    }
}
