//! # API Request/Response Types
//!
//! This module defines the JSON structures for the HTTP API.
//!
//! Every response except `/health` uses one envelope:
//! `{"success": true, "data": {...}, "message": "..."}` on success and
//! `{"success": false, "message": "..."}` on failure.

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rollcall_core::{
    Group, GroupMember, GroupPatch, NewGroup, NewRoll, NewStudent, RollMark, RollRecord,
    RollcallError, RunSummary, StoreStats, Student, StudentId,
    primitives::{MAX_INCIDENTS, MAX_LOOKBACK_WEEKS, MIN_LOOKBACK_WEEKS},
    validation::{self, Violations},
};
use serde::{Deserialize, Serialize};

/// Body sent for any unexpected server-side failure.
pub const INTERNAL_ERROR_MESSAGE: &str = "Something went wrong";

// =============================================================================
// ENVELOPE
// =============================================================================

/// Success envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data,
            message: None,
        })
    }

    pub fn with_message(data: T, message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            data,
            message: Some(message.into()),
        })
    }
}

/// Failure envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
}

// =============================================================================
// ERRORS
// =============================================================================

/// Error returned by handlers and middleware.
#[derive(Debug)]
pub enum ApiError {
    /// A core error. Client errors map to 400, everything else to 500.
    Core(RollcallError),
    /// The request was rejected before reaching a handler body.
    Rejected(StatusCode, String),
}

impl From<RollcallError> for ApiError {
    fn from(e: RollcallError) -> Self {
        Self::Core(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        // Oversized bodies keep their 413; every other body problem is a bad request.
        let status = match rejection.status() {
            StatusCode::PAYLOAD_TOO_LARGE => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::BAD_REQUEST,
        };
        Self::Rejected(status, rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::Rejected(StatusCode::BAD_REQUEST, rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Core(e) if e.is_client_error() => (StatusCode::BAD_REQUEST, e.to_string()),
            Self::Core(e) => {
                tracing::error!(error = %e, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    INTERNAL_ERROR_MESSAGE.to_string(),
                )
            }
            Self::Rejected(status, message) => (status, message),
        };
        let body = ErrorResponse {
            success: false,
            message,
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for handlers.
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

// =============================================================================
// HEALTH RESPONSE
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// =============================================================================
// RESPONSE DATA
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusData {
    pub stats: StoreStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupsData {
    pub groups: Vec<Group>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupData {
    pub group: Group,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembersData {
    pub students: Vec<GroupMember>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunData {
    pub summary: RunSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentsData {
    pub students: Vec<Student>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentData {
    pub student: Student,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollsData {
    pub rolls: Vec<RollRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollData {
    pub roll: RollRecord,
}

/// Serializes as `{}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmptyData {}

// =============================================================================
// GROUP REQUESTS
// =============================================================================

/// Body of `POST /groups`.
///
/// Fields are loosely typed so that every rule can report at once.
/// `run_at` and `student_count` are checked but never stored: the filter
/// run owns them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateGroupRequest {
    pub name: Option<String>,
    pub number_of_weeks: Option<i64>,
    pub roll_states: Option<String>,
    pub incidents: Option<i64>,
    pub ltmt: Option<String>,
    pub run_at: Option<String>,
    pub student_count: Option<i64>,
}

impl CreateGroupRequest {
    /// Validate every field and build the core input.
    pub fn to_new_group(&self) -> Result<NewGroup, RollcallError> {
        let mut v = Violations::new();
        let name = validation::text(&mut v, "name", self.name.as_deref(), true);
        let weeks = validation::bounded(
            &mut v,
            "number_of_weeks",
            self.number_of_weeks,
            MIN_LOOKBACK_WEEKS,
            MAX_LOOKBACK_WEEKS,
            true,
        );
        let state =
            validation::roll_state(&mut v, "roll_states", self.roll_states.as_deref(), true);
        let incidents =
            validation::bounded(&mut v, "incidents", self.incidents, 0, MAX_INCIDENTS, true);
        let ltmt = validation::comparison(&mut v, "ltmt", self.ltmt.as_deref(), true);
        let _ = validation::timestamp(&mut v, "run_at", self.run_at.as_deref(), false);
        let _ = validation::non_negative(&mut v, "student_count", self.student_count);

        let (Some(name), Some(weeks), Some(state)) = (name, weeks, state) else {
            return Err(v.into_error());
        };
        let (Some(incidents), Some(ltmt)) = (incidents, ltmt) else {
            return Err(v.into_error());
        };
        v.into_result()?;

        Ok(NewGroup {
            name,
            number_of_weeks: weeks,
            roll_states: state,
            incidents,
            ltmt,
        })
    }
}

/// Body of `PUT /groups/{id}`. Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateGroupRequest {
    pub id: Option<u64>,
    pub name: Option<String>,
    pub number_of_weeks: Option<i64>,
    pub roll_states: Option<String>,
    pub incidents: Option<i64>,
    pub ltmt: Option<String>,
    pub run_at: Option<String>,
    pub student_count: Option<i64>,
}

impl UpdateGroupRequest {
    /// Validate the given fields against the group addressed by `path_id`.
    pub fn to_patch(&self, path_id: u64) -> Result<GroupPatch, RollcallError> {
        let mut v = Violations::new();
        if self.id.is_some_and(|id| id != path_id) {
            v.push("\"id\" must match the id in the path");
        }
        let patch = GroupPatch {
            name: validation::text(&mut v, "name", self.name.as_deref(), false),
            number_of_weeks: validation::bounded(
                &mut v,
                "number_of_weeks",
                self.number_of_weeks,
                MIN_LOOKBACK_WEEKS,
                MAX_LOOKBACK_WEEKS,
                false,
            ),
            roll_states: validation::roll_state(
                &mut v,
                "roll_states",
                self.roll_states.as_deref(),
                false,
            ),
            incidents: validation::bounded(
                &mut v,
                "incidents",
                self.incidents,
                0,
                MAX_INCIDENTS,
                false,
            ),
            ltmt: validation::comparison(&mut v, "ltmt", self.ltmt.as_deref(), false),
        };
        let _ = validation::timestamp(&mut v, "run_at", self.run_at.as_deref(), false);
        let _ = validation::non_negative(&mut v, "student_count", self.student_count);

        v.into_result()?;
        Ok(patch)
    }
}

// =============================================================================
// STUDENT & ROLL REQUESTS
// =============================================================================

/// Body of `POST /students`, and one entry of an import file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateStudentRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl CreateStudentRequest {
    pub fn to_new_student(&self) -> Result<NewStudent, RollcallError> {
        let mut v = Violations::new();
        let first = validation::text(&mut v, "first_name", self.first_name.as_deref(), true);
        let last = validation::text(&mut v, "last_name", self.last_name.as_deref(), true);
        let (Some(first_name), Some(last_name)) = (first, last) else {
            return Err(v.into_error());
        };
        Ok(NewStudent {
            first_name,
            last_name,
        })
    }
}

/// One state inside a roll request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RollMarkRequest {
    pub student_id: Option<u64>,
    pub state: Option<String>,
}

/// Body of `POST /rolls`, and one entry of an import file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateRollRequest {
    pub completed_at: Option<String>,
    pub states: Option<Vec<RollMarkRequest>>,
}

impl CreateRollRequest {
    pub fn to_new_roll(&self) -> Result<NewRoll, RollcallError> {
        let mut v = Violations::new();
        let completed_at =
            validation::timestamp(&mut v, "completed_at", self.completed_at.as_deref(), true);

        let mut states = Vec::new();
        match &self.states {
            None => v.push("\"states\" is required"),
            Some(marks) => {
                for (i, mark) in marks.iter().enumerate() {
                    let student_id = mark.student_id;
                    if student_id.is_none() {
                        v.push(format!("\"states[{}].student_id\" is required", i));
                    }
                    let state = validation::roll_state(
                        &mut v,
                        &format!("states[{}].state", i),
                        mark.state.as_deref(),
                        true,
                    );
                    if let (Some(id), Some(state)) = (student_id, state) {
                        states.push(RollMark {
                            student_id: StudentId(id),
                            state,
                        });
                    }
                }
            }
        }

        let Some(completed_at) = completed_at else {
            return Err(v.into_error());
        };
        v.into_result()?;
        Ok(NewRoll {
            completed_at,
            states,
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use rollcall_core::{Comparison, RollState};

    fn full_create() -> CreateGroupRequest {
        CreateGroupRequest {
            name: Some("Often late".to_string()),
            number_of_weeks: Some(3),
            roll_states: Some("late".to_string()),
            incidents: Some(2),
            ltmt: Some(">".to_string()),
            run_at: None,
            student_count: None,
        }
    }

    #[test]
    fn create_builds_new_group() {
        let group = full_create().to_new_group().unwrap();
        assert_eq!(group.name, "Often late");
        assert_eq!(group.roll_states, RollState::Late);
        assert_eq!(group.ltmt, Comparison::MoreThan);
    }

    #[test]
    fn create_reports_every_problem() {
        let request = CreateGroupRequest {
            name: Some(String::new()),
            number_of_weeks: Some(0),
            ltmt: Some("=".to_string()),
            run_at: Some("soon".to_string()),
            ..CreateGroupRequest::default()
        };
        let err = request.to_new_group().unwrap_err();
        assert_eq!(
            err.to_string(),
            "\"name\" is not allowed to be empty,\
             \"number_of_weeks\" must be greater than or equal to 1,\
             \"roll_states\" is required,\
             \"incidents\" is required,\
             \"ltmt\" must be one of [<, >],\
             \"run_at\" must be a valid date"
        );
    }

    #[test]
    fn job_fields_are_checked_even_when_the_rest_is_valid() {
        let request = CreateGroupRequest {
            student_count: Some(-3),
            ..full_create()
        };
        assert!(request.to_new_group().is_err());
    }

    #[test]
    fn update_with_mismatched_id_is_rejected() {
        let request = UpdateGroupRequest {
            id: Some(4),
            ..UpdateGroupRequest::default()
        };
        assert!(request.to_patch(5).is_err());
        assert!(request.to_patch(4).unwrap().is_empty());
    }

    #[test]
    fn roll_request_names_the_bad_entry() {
        let request = CreateRollRequest {
            completed_at: Some("2024-05-01T08:00:00Z".to_string()),
            states: Some(vec![
                RollMarkRequest {
                    student_id: Some(1),
                    state: Some("absent".to_string()),
                },
                RollMarkRequest {
                    student_id: None,
                    state: Some("sick".to_string()),
                },
            ]),
        };
        let err = request.to_new_roll().unwrap_err();
        assert_eq!(
            err.to_string(),
            "\"states[1].student_id\" is required,\
             \"states[1].state\" must be one of [unmark, present, absent, late]"
        );
    }

    #[test]
    fn internal_errors_hide_details() {
        let response =
            ApiError::from(RollcallError::Storage("disk full".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let response =
            ApiError::from(RollcallError::GroupNotFound(rollcall_core::GroupId(1))).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
