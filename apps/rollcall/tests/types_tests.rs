//! Unit tests for API types serialization/deserialization.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use rollcall::api::{
    ApiResponse, CreateGroupRequest, CreateRollRequest, CreateStudentRequest, EmptyData,
    ErrorResponse, HealthResponse, UpdateGroupRequest,
};
use rollcall_core::{Comparison, RollState, RollcallError, StudentId};

// =============================================================================
// ENVELOPE TESTS
// =============================================================================

#[test]
fn test_health_response_default() {
    let health = HealthResponse::default();
    assert_eq!(health.status, "ok");
    assert!(!health.version.is_empty());
}

#[test]
fn test_success_envelope_omits_missing_message() {
    let json = serde_json::to_string(&ApiResponse::ok(EmptyData::default()).0).unwrap();
    assert_eq!(json, r#"{"success":true,"data":{}}"#);
}

#[test]
fn test_success_envelope_with_message() {
    let body =
        ApiResponse::with_message(EmptyData::default(), "Group with 3 successfully removed.");
    let json = serde_json::to_value(&body.0).unwrap();
    assert_eq!(json["message"], "Group with 3 successfully removed.");
    assert_eq!(json["data"], serde_json::json!({}));
}

#[test]
fn test_error_envelope_deserialization() {
    let body: ErrorResponse =
        serde_json::from_str(r#"{"success":false,"message":"Group doesn't exist."}"#).unwrap();
    assert!(!body.success);
    assert_eq!(body.message, "Group doesn't exist.");
}

// =============================================================================
// GROUP REQUEST TESTS
// =============================================================================

#[test]
fn test_create_group_request_from_json() {
    let request: CreateGroupRequest = serde_json::from_str(
        r#"{"name":"Never present","number_of_weeks":1,"roll_states":"present","incidents":1,"ltmt":"<"}"#,
    )
    .unwrap();
    let group = request.to_new_group().unwrap();
    assert_eq!(group.roll_states, RollState::Present);
    assert_eq!(group.ltmt, Comparison::LessThan);
    assert_eq!(group.number_of_weeks, 1);
}

#[test]
fn test_create_group_request_accepts_null_job_fields() {
    let request: CreateGroupRequest = serde_json::from_str(
        r#"{"name":"n","number_of_weeks":1,"roll_states":"late","incidents":0,"ltmt":">","run_at":null,"student_count":null}"#,
    )
    .unwrap();
    assert!(request.to_new_group().is_ok());
}

#[test]
fn test_create_group_request_rejects_unknown_fields() {
    let result = serde_json::from_str::<CreateGroupRequest>(r#"{"name":"n","colour":"red"}"#);
    assert!(result.is_err());
}

#[test]
fn test_incidents_upper_bound() {
    let request = CreateGroupRequest {
        name: Some("n".to_string()),
        number_of_weeks: Some(1),
        roll_states: Some("late".to_string()),
        incidents: Some(10_001),
        ltmt: Some(">".to_string()),
        ..CreateGroupRequest::default()
    };
    let err = request.to_new_group().unwrap_err();
    assert_eq!(
        err.to_string(),
        "\"incidents\" must be less than or equal to 10000"
    );
}

#[test]
fn test_empty_update_is_valid() {
    let request: UpdateGroupRequest = serde_json::from_str("{}").unwrap();
    assert!(request.to_patch(1).unwrap().is_empty());
}

#[test]
fn test_update_validates_present_fields_only() {
    let request: UpdateGroupRequest =
        serde_json::from_str(r#"{"ltmt":">=","name":"  "}"#).unwrap();
    match request.to_patch(1) {
        Err(RollcallError::Validation(messages)) => assert_eq!(
            messages,
            vec![
                "\"name\" is not allowed to be empty".to_string(),
                "\"ltmt\" must be one of [<, >]".to_string(),
            ]
        ),
        other => panic!("unexpected result: {:?}", other),
    }
}

// =============================================================================
// STUDENT & ROLL REQUEST TESTS
// =============================================================================

#[test]
fn test_student_names_are_trimmed() {
    let request = CreateStudentRequest {
        first_name: Some(" Ada ".to_string()),
        last_name: Some("Park\n".to_string()),
    };
    let student = request.to_new_student().unwrap();
    assert_eq!(student.first_name, "Ada");
    assert_eq!(student.last_name, "Park");
}

#[test]
fn test_roll_request_from_json() {
    let request: CreateRollRequest = serde_json::from_str(
        r#"{"completed_at":"2024-02-29T08:15:00Z","states":[{"student_id":3,"state":"absent"},{"student_id":4,"state":"present"}]}"#,
    )
    .unwrap();
    let roll = request.to_new_roll().unwrap();
    assert_eq!(roll.states.len(), 2);
    assert_eq!(roll.states[0].student_id, StudentId(3));
    assert_eq!(roll.states[0].state, RollState::Absent);
}

#[test]
fn test_roll_request_rejects_bad_timestamp() {
    let request: CreateRollRequest =
        serde_json::from_str(r#"{"completed_at":"last tuesday","states":[]}"#).unwrap();
    let err = request.to_new_roll().unwrap_err();
    assert_eq!(err.to_string(), "\"completed_at\" must be a valid date");
}
