//! The ledger store port and a reference in-memory adapter.
//!
//! The production store is a relational table with a unique index on
//! the idempotency key; this crate only sees the "insert if absent,
//! else return existing" port. Cross-process atomicity is the store's
//! job — nothing here takes an in-process lock on behalf of other
//! processes.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use rr_domain::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Ledger rows
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One committed charge receipt. Zero-amount receipts are kept too —
/// reconciliation counts one receipt per billable unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Idempotency key: `run/attempt/unit`.
    pub key: String,
    pub run_id: Uuid,
    pub attempt: u32,
    pub usage_unit_id: String,
    pub billing_account_id: String,
    pub virtual_key_id: String,
    pub graph_id: String,
    pub amount_microusd: i64,
    /// Fingerprint of the non-amount payload, for duplicate comparison.
    pub metadata_hash: String,
    pub recorded_at: DateTime<Utc>,
}

/// Result of a conditional insert.
#[derive(Debug, Clone)]
pub enum InsertOutcome {
    Inserted,
    Existing(LedgerEntry),
}

/// The write port. Only [`crate::committer::LedgerCommitter`] holds a
/// store in production code.
#[async_trait::async_trait]
pub trait LedgerStore: Send + Sync {
    async fn insert_if_absent(&self, entry: LedgerEntry) -> Result<InsertOutcome>;
}

#[async_trait::async_trait]
impl<S: LedgerStore + ?Sized> LedgerStore for std::sync::Arc<S> {
    async fn insert_if_absent(&self, entry: LedgerEntry) -> Result<InsertOutcome> {
        (**self).insert_if_absent(entry).await
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// In-memory reference adapter
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Keyed in-memory ledger with an optional append-only JSONL journal.
///
/// Used by tests and single-process deployments; the journal is
/// replayed on startup so receipts survive restarts.
pub struct MemoryLedgerStore {
    rows: RwLock<HashMap<String, LedgerEntry>>,
    journal_path: Option<PathBuf>,
    /// Outage simulation switch for tests.
    unavailable: AtomicBool,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
            journal_path: None,
            unavailable: AtomicBool::new(false),
        }
    }

    /// Open a store backed by a JSONL journal, replaying existing rows.
    pub fn with_journal(path: &Path) -> Result<Self> {
        let mut rows = HashMap::new();
        if path.exists() {
            let raw = std::fs::read_to_string(path).map_err(Error::Io)?;
            for line in raw.lines() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<LedgerEntry>(line) {
                    Ok(entry) => {
                        rows.insert(entry.key.clone(), entry);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "skipping malformed ledger journal line");
                    }
                }
            }
        }
        Ok(Self {
            rows: RwLock::new(rows),
            journal_path: Some(path.to_path_buf()),
            unavailable: AtomicBool::new(false),
        })
    }

    /// Flip the simulated-outage switch.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }

    pub fn row_count(&self) -> usize {
        self.rows.read().len()
    }

    /// Sum of all committed amounts, for reconciliation checks.
    pub fn total_microusd(&self) -> i64 {
        self.rows.read().values().map(|e| e.amount_microusd).sum()
    }

    pub fn get(&self, key: &str) -> Option<LedgerEntry> {
        self.rows.read().get(key).cloned()
    }

    fn journal(&self, entry: &LedgerEntry) -> Result<()> {
        let Some(path) = &self.journal_path else {
            return Ok(());
        };
        let json = serde_json::to_string(entry)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(Error::Io)?;
        writeln!(file, "{json}").map_err(Error::Io)?;
        Ok(())
    }
}

impl Default for MemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn insert_if_absent(&self, entry: LedgerEntry) -> Result<InsertOutcome> {
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(Error::LedgerStore("store unavailable".into()));
        }

        // The write lock makes check-and-insert atomic within this
        // process; a relational store does the same with its unique
        // index.
        let mut rows = self.rows.write();
        if let Some(existing) = rows.get(&entry.key) {
            return Ok(InsertOutcome::Existing(existing.clone()));
        }
        self.journal(&entry)?;
        rows.insert(entry.key.clone(), entry);
        Ok(InsertOutcome::Inserted)
    }
}
