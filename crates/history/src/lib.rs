//! Conversation-history artifacts.
//!
//! Best-effort persistence of what the user sent and what the
//! assistant finally said, redacted before hashing and storage.
//! History is a cache, not a financial record: a store outage drops
//! artifacts with a metric instead of failing the run.

pub mod masking;
pub mod store;
pub mod writer;

pub use masking::SecretMasker;
pub use store::{ArtifactKey, ArtifactRecord, ArtifactStore, InsertOutcome, MemoryArtifactStore};
pub use writer::HistoryWriter;
