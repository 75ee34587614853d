//! # rollcall-core
//!
//! The attendance engine for Rollcall.
//!
//! This crate owns the records (groups, rolls, students, recorded states and
//! derived group membership), the rules that validate them, and the group
//! filter job that recomputes membership from recent attendance.
//!
//! ## Architectural Constraints
//!
//! - Synchronous and transport-agnostic: no async, no network dependencies
//! - Every mutation is one redb write transaction
//! - The filter evaluator is pure; the clock is always an input

// =============================================================================
// MODULES
// =============================================================================

pub mod filter;
pub mod primitives;
pub mod storage;
pub mod types;
pub mod validation;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    Comparison, Group, GroupId, GroupMember, GroupPatch, GroupRunResult, GroupStudent, NewGroup,
    NewRoll, NewStudent, Roll, RollId, RollMark, RollRecord, RollState, RollcallError, RunSummary,
    StoreStats, Student, StudentId, StudentRollState,
};

// =============================================================================
// RE-EXPORTS: Engine
// =============================================================================

pub use filter::{GroupEvaluation, evaluate_group};
pub use storage::{ImportSummary, Store};
pub use validation::Violations;
