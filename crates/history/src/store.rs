//! The artifact store port and a reference in-memory adapter.
//!
//! Artifacts are keyed by `(account, run, artifact_key)` and written
//! with the same insert-if-absent discipline as the ledger, so a
//! replayed final answer or tool result lands on the existing row.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use rr_domain::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Artifact records
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What part of the run an artifact captures. Renders as the storage
/// key segment: `input`, `output`, or `tool/{call_id}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArtifactKey {
    Input,
    Output,
    Tool { call_id: String },
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKey::Input => write!(f, "input"),
            ArtifactKey::Output => write!(f, "output"),
            ArtifactKey::Tool { call_id } => write!(f, "tool/{call_id}"),
        }
    }
}

/// One persisted conversation artifact. `content` is already masked;
/// `content_hash` is the hash of that masked content.
#[derive(Debug, Clone)]
pub struct ArtifactRecord {
    pub account_id: String,
    pub run_id: Uuid,
    pub artifact_key: ArtifactKey,
    pub role: String,
    pub content: String,
    pub content_hash: String,
    pub recorded_at: DateTime<Utc>,
}

impl ArtifactRecord {
    /// Full storage key: `account/run/artifact_key`.
    pub fn storage_key(&self) -> String {
        format!("{}/{}/{}", self.account_id, self.run_id, self.artifact_key)
    }
}

/// Result of a conditional insert.
#[derive(Debug, Clone)]
pub enum InsertOutcome {
    Inserted,
    Existing(ArtifactRecord),
}

/// The write port. [`crate::writer::HistoryWriter`] is its only caller
/// in production code.
#[async_trait::async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn insert_if_absent(&self, record: ArtifactRecord) -> Result<InsertOutcome>;
}

#[async_trait::async_trait]
impl<S: ArtifactStore + ?Sized> ArtifactStore for std::sync::Arc<S> {
    async fn insert_if_absent(&self, record: ArtifactRecord) -> Result<InsertOutcome> {
        (**self).insert_if_absent(record).await
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// In-memory reference adapter
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Keyed in-memory artifact store for tests and single-process use.
pub struct MemoryArtifactStore {
    rows: RwLock<HashMap<String, ArtifactRecord>>,
    /// Outage simulation switch for tests.
    unavailable: AtomicBool,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Flip the simulated-outage switch.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }

    pub fn row_count(&self) -> usize {
        self.rows.read().len()
    }

    pub fn get(&self, storage_key: &str) -> Option<ArtifactRecord> {
        self.rows.read().get(storage_key).cloned()
    }
}

impl Default for MemoryArtifactStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn insert_if_absent(&self, record: ArtifactRecord) -> Result<InsertOutcome> {
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(Error::ArtifactStore("store unavailable".into()));
        }

        let key = record.storage_key();
        let mut rows = self.rows.write();
        if let Some(existing) = rows.get(&key) {
            return Ok(InsertOutcome::Existing(existing.clone()));
        }
        rows.insert(key, record);
        Ok(InsertOutcome::Inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(key: ArtifactKey, content: &str) -> ArtifactRecord {
        ArtifactRecord {
            account_id: "acct-1".into(),
            run_id: Uuid::nil(),
            artifact_key: key,
            role: "assistant".into(),
            content: content.into(),
            content_hash: format!("h:{content}"),
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn artifact_keys_render_as_segments() {
        assert_eq!(ArtifactKey::Input.to_string(), "input");
        assert_eq!(ArtifactKey::Output.to_string(), "output");
        assert_eq!(
            ArtifactKey::Tool {
                call_id: "call_7".into()
            }
            .to_string(),
            "tool/call_7"
        );
    }

    #[tokio::test]
    async fn insert_then_conflict() {
        let store = MemoryArtifactStore::new();
        assert!(matches!(
            store
                .insert_if_absent(record(ArtifactKey::Output, "first"))
                .await
                .unwrap(),
            InsertOutcome::Inserted
        ));
        match store
            .insert_if_absent(record(ArtifactKey::Output, "second"))
            .await
            .unwrap()
        {
            InsertOutcome::Existing(row) => assert_eq!(row.content, "first"),
            InsertOutcome::Inserted => panic!("duplicate key inserted"),
        }
        assert_eq!(store.row_count(), 1);
    }

    #[tokio::test]
    async fn tool_calls_are_distinct_rows() {
        let store = MemoryArtifactStore::new();
        for id in ["call_1", "call_2"] {
            store
                .insert_if_absent(record(
                    ArtifactKey::Tool {
                        call_id: id.into(),
                    },
                    "{}",
                ))
                .await
                .unwrap();
        }
        assert_eq!(store.row_count(), 2);
    }

    #[tokio::test]
    async fn unavailable_store_errors() {
        let store = MemoryArtifactStore::new();
        store.set_unavailable(true);
        let err = store
            .insert_if_absent(record(ArtifactKey::Input, "hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ArtifactStore(_)));
        assert_eq!(store.row_count(), 0);
    }
}
