//! Shared domain types for the RunRelay workspace.
//!
//! Everything other crates agree on lives here: the event vocabulary,
//! usage facts and executor trust tiers, the per-run context bundle,
//! the shared error type, configuration, and structured trace events.

pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod stream;
pub mod trace;
pub mod usage;
