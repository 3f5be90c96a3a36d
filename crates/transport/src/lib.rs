//! The execution transport boundary.
//!
//! A transport is whatever actually runs a graph — an in-process model
//! caller, a sandboxed container, an external graph server. This crate
//! only defines the contract they satisfy: an ordered stream of
//! [`rr_domain::event::AiEvent`]s that ends in exactly one terminal
//! event, plus a final-result handle.

pub mod scripted;
pub mod traits;

pub use scripted::ScriptedTransport;
pub use traits::{ExecutionTransport, FinalResult, RunRequest, TransportRun};
