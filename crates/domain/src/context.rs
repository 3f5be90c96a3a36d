//! The immutable per-run identity bundle.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity attached once per run and supplied to every subscriber by
/// the relay. Events themselves never carry these fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunContext {
    pub run_id: Uuid,
    /// Retry counter within the run's identity. A whole-run retry is a
    /// new run with a new `run_id`, not a new attempt.
    pub attempt: u32,
    pub account_id: String,
    pub thread_id: String,
}

impl RunContext {
    pub fn new(run_id: Uuid, attempt: u32, account_id: &str, thread_id: &str) -> Self {
        Self {
            run_id,
            attempt,
            account_id: account_id.to_owned(),
            thread_id: thread_id.to_owned(),
        }
    }
}
