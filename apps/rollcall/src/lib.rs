//! # rollcall
//!
//! HTTP API, CLI and configuration for the Rollcall attendance groups server.
//! The store and the filter engine live in `rollcall-core`.

pub mod api;
pub mod cli;
pub mod config;
