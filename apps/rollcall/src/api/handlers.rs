//! # API Endpoint Handlers
//!
//! This module implements the actual HTTP endpoint handlers.
//!
//! Read handlers take the store's read lock; anything that opens a write
//! transaction takes the write lock.

use super::{
    AppState,
    types::{
        ApiError, ApiResponse, ApiResult, CreateGroupRequest, CreateRollRequest,
        CreateStudentRequest, EmptyData, GroupData, GroupsData, HealthResponse, MembersData,
        RollData, RollsData, RunData, StatusData, StudentData, StudentsData, UpdateGroupRequest,
    },
};
use axum::{
    Json,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
    response::IntoResponse,
};
use chrono::Utc;
use rollcall_core::{GroupId, StudentId};

// =============================================================================
// HEALTH & STATUS
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

/// Store statistics.
pub async fn status_handler(State(state): State<AppState>) -> ApiResult<StatusData> {
    let store = state.store.read().await;
    let stats = store.stats()?;
    Ok(ApiResponse::ok(StatusData { stats }))
}

// =============================================================================
// GROUP HANDLERS
// =============================================================================

/// List all groups.
pub async fn list_groups_handler(State(state): State<AppState>) -> ApiResult<GroupsData> {
    let store = state.store.read().await;
    let groups = store.list_groups()?;
    Ok(ApiResponse::ok(GroupsData { groups }))
}

/// Create a group.
pub async fn create_group_handler(
    State(state): State<AppState>,
    payload: Result<Json<CreateGroupRequest>, JsonRejection>,
) -> ApiResult<GroupData> {
    let Json(request) = payload?;
    let input = request.to_new_group()?;

    let store = state.store.write().await;
    let group = store.create_group(input)?;
    Ok(ApiResponse::ok(GroupData { group }))
}

/// Partially update a group.
pub async fn update_group_handler(
    State(state): State<AppState>,
    id: Result<Path<u64>, PathRejection>,
    payload: Result<Json<UpdateGroupRequest>, JsonRejection>,
) -> ApiResult<GroupData> {
    let Path(id) = id?;
    let Json(request) = payload?;
    let patch = request.to_patch(id)?;

    let store = state.store.write().await;
    let group = store.update_group(GroupId(id), patch)?;
    Ok(ApiResponse::ok(GroupData { group }))
}

/// Delete a group and its membership.
pub async fn delete_group_handler(
    State(state): State<AppState>,
    id: Result<Path<u64>, PathRejection>,
) -> ApiResult<EmptyData> {
    let Path(id) = id?;

    let store = state.store.write().await;
    store.delete_group(GroupId(id))?;
    Ok(ApiResponse::with_message(
        EmptyData::default(),
        format!("Group with {} successfully removed.", id),
    ))
}

/// Members of a group from its last filter run.
pub async fn group_students_handler(
    State(state): State<AppState>,
    id: Result<Path<u64>, PathRejection>,
) -> ApiResult<MembersData> {
    let Path(id) = id?;

    let store = state.store.read().await;
    let students = store.group_students(GroupId(id))?;
    Ok(ApiResponse::ok(MembersData { students }))
}

/// Recompute every group's membership as of now.
pub async fn run_filters_handler(State(state): State<AppState>) -> ApiResult<RunData> {
    let store = state.store.write().await;
    let summary = store.run_group_filters(Utc::now())?;
    Ok(ApiResponse::with_message(
        RunData { summary },
        "Group filters ran successfully.",
    ))
}

// =============================================================================
// STUDENT HANDLERS
// =============================================================================

/// List all students.
pub async fn list_students_handler(State(state): State<AppState>) -> ApiResult<StudentsData> {
    let store = state.store.read().await;
    let students = store.list_students()?;
    Ok(ApiResponse::ok(StudentsData { students }))
}

/// Create a student.
pub async fn create_student_handler(
    State(state): State<AppState>,
    payload: Result<Json<CreateStudentRequest>, JsonRejection>,
) -> ApiResult<StudentData> {
    let Json(request) = payload?;
    let input = request.to_new_student()?;

    let store = state.store.write().await;
    let student = store.create_student(input)?;
    Ok(ApiResponse::ok(StudentData { student }))
}

/// One student by id.
pub async fn get_student_handler(
    State(state): State<AppState>,
    id: Result<Path<u64>, PathRejection>,
) -> ApiResult<StudentData> {
    let Path(id) = id?;

    let store = state.store.read().await;
    let student = store.get_student(StudentId(id))?;
    Ok(ApiResponse::ok(StudentData { student }))
}

// =============================================================================
// ROLL HANDLERS
// =============================================================================

/// List all rolls with their states.
pub async fn list_rolls_handler(State(state): State<AppState>) -> ApiResult<RollsData> {
    let store = state.store.read().await;
    let rolls = store.list_rolls()?;
    Ok(ApiResponse::ok(RollsData { rolls }))
}

/// Record a roll with its states. Unknown students reject the whole roll.
pub async fn create_roll_handler(
    State(state): State<AppState>,
    payload: Result<Json<CreateRollRequest>, JsonRejection>,
) -> ApiResult<RollData> {
    let Json(request) = payload?;
    let input = request.to_new_roll()?;

    let store = state.store.write().await;
    let roll = store.create_roll(input)?;
    Ok(ApiResponse::ok(RollData { roll }))
}

/// Fallback for unknown routes, in the error envelope.
pub async fn not_found_handler() -> ApiError {
    ApiError::Rejected(axum::http::StatusCode::NOT_FOUND, "Not Found".to_string())
}
