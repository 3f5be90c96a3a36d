use serde::Serialize;

/// Structured trace events emitted across all RunRelay crates.
///
/// Correctness alerts (`LedgerMismatch`, `ArtifactMismatch`) carry
/// idempotency keys only — never amounts or content.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    RunTerminated {
        run_id: String,
        reason: String,
        dropped_after_terminal: u64,
    },
    EventDroppedAfterTerminal {
        run_id: String,
    },
    LedgerCommitted {
        key: String,
        inserted: bool,
    },
    LedgerMismatch {
        key: String,
    },
    LedgerSkipped {
        run_id: String,
        reason: String,
    },
    UsageValidationWarning {
        run_id: String,
        defects: Vec<String>,
    },
    ArtifactWritten {
        key: String,
        inserted: bool,
    },
    ArtifactMismatch {
        key: String,
    },
    ArtifactStoreDegraded {
        key: String,
        error: String,
    },
    HistoryEventDropped {
        run_id: String,
        dropped: u64,
    },
    UiSubscriberDetached {
        run_id: String,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "rr_event");
    }
}
