//! # Input Validation
//!
//! Field rules shared by the HTTP API and the CLI importer.
//!
//! Validation never aborts early: every rule records its message in a
//! [`Violations`] collector and the caller reports all of them at once,
//! joined by `","` in field order.

use crate::primitives::MAX_NAME_LENGTH;
use crate::{Comparison, RollState, RollcallError};
use chrono::{DateTime, Utc};

/// Collects validation messages across all fields of one input.
#[derive(Debug, Default)]
pub struct Violations {
    messages: Vec<String>,
}

impl Violations {
    /// Create an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message.
    pub fn push(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    /// True when no rule failed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Consume the collector into a validation error.
    #[must_use]
    pub fn into_error(self) -> RollcallError {
        RollcallError::Validation(self.messages)
    }

    /// `Ok(())` when no rule failed, otherwise the validation error.
    pub fn into_result(self) -> Result<(), RollcallError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self.into_error())
        }
    }

    fn missing(&mut self, field: &str) {
        self.push(format!("\"{}\" is required", field));
    }
}

/// Check a name-like text field.
///
/// Returns the trimmed value, or `None` when absent or rejected. A missing
/// required field records a message; a missing optional one does not.
pub fn text(
    violations: &mut Violations,
    field: &str,
    value: Option<&str>,
    required: bool,
) -> Option<String> {
    let Some(raw) = value else {
        if required {
            violations.missing(field);
        }
        return None;
    };

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        violations.push(format!("\"{}\" is not allowed to be empty", field));
        return None;
    }
    if trimmed.len() > MAX_NAME_LENGTH {
        violations.push(format!(
            "\"{}\" length must be less than or equal to {} characters long",
            field, MAX_NAME_LENGTH
        ));
        return None;
    }
    Some(trimmed.to_string())
}

/// Check an integer field against an inclusive range.
pub fn bounded(
    violations: &mut Violations,
    field: &str,
    value: Option<i64>,
    min: i64,
    max: i64,
    required: bool,
) -> Option<u32> {
    let Some(n) = value else {
        if required {
            violations.missing(field);
        }
        return None;
    };

    if n < min {
        violations.push(format!(
            "\"{}\" must be greater than or equal to {}",
            field, min
        ));
        return None;
    }
    if n > max {
        violations.push(format!(
            "\"{}\" must be less than or equal to {}",
            field, max
        ));
        return None;
    }
    u32::try_from(n).ok()
}

/// Check a roll state name.
pub fn roll_state(
    violations: &mut Violations,
    field: &str,
    value: Option<&str>,
    required: bool,
) -> Option<RollState> {
    let Some(raw) = value else {
        if required {
            violations.missing(field);
        }
        return None;
    };

    match raw.parse::<RollState>() {
        Ok(state) => Some(state),
        Err(_) => {
            violations.push(format!(
                "\"{}\" must be one of [unmark, present, absent, late]",
                field
            ));
            None
        }
    }
}

/// Check a comparison symbol (`<` or `>`).
pub fn comparison(
    violations: &mut Violations,
    field: &str,
    value: Option<&str>,
    required: bool,
) -> Option<Comparison> {
    let Some(raw) = value else {
        if required {
            violations.missing(field);
        }
        return None;
    };

    match raw.parse::<Comparison>() {
        Ok(cmp) => Some(cmp),
        Err(_) => {
            violations.push(format!("\"{}\" must be one of [<, >]", field));
            None
        }
    }
}

/// Check an RFC 3339 timestamp.
pub fn timestamp(
    violations: &mut Violations,
    field: &str,
    value: Option<&str>,
    required: bool,
) -> Option<DateTime<Utc>> {
    let Some(raw) = value else {
        if required {
            violations.missing(field);
        }
        return None;
    };

    match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => Some(ts.with_timezone(&Utc)),
        Err(_) => {
            violations.push(format!("\"{}\" must be a valid date", field));
            None
        }
    }
}

/// Check a non-negative counter.
pub fn non_negative(violations: &mut Violations, field: &str, value: Option<i64>) -> Option<u64> {
    let n = value?;
    match u64::try_from(n) {
        Ok(v) => Some(v),
        Err(_) => {
            violations.push(format!("\"{}\" must be greater than or equal to 0", field));
            None
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
