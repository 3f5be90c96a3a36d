//! Billing: usage-fact validation and idempotent ledger commits.
//!
//! The [`committer::LedgerCommitter`] is the only component in the
//! workspace that can write to a ledger store — the store handle is a
//! private field, so "who can move money" is a compile-time property,
//! not a runtime check.

pub mod committer;
pub mod store;
pub mod validator;

pub use committer::LedgerCommitter;
pub use store::{InsertOutcome, LedgerEntry, LedgerStore, MemoryLedgerStore};
pub use validator::{validate, Defect, Validation};
