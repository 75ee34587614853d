//! # Storage
//!
//! Durable persistence for groups, rolls, students and derived membership.

mod redb_store;

pub use redb_store::{ImportSummary, Store};
