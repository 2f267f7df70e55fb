//! # plank-core
//!
//! Foundation types for the plank board relay.
//!
//! This crate provides the shared vocabulary the other plank crates depend on:
//!
//! - **Objects**: [`object::Object`] — the polymorphic board record (task,
//!   project, epic, rule) with its typed relationship and dependency arrays
//! - **Change records**: [`change::ChangeRecord`] — the diff-plus-snapshot
//!   emitted for every observable mutation of an object
//! - **Errors**: [`errors::RelayError`] — the relay-facing error taxonomy
//! - **Logging**: [`logging::init`] — tracing-subscriber bootstrap
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by all other plank crates.

#![deny(unsafe_code)]

pub mod change;
pub mod errors;
pub mod logging;
pub mod object;
