//! Usage facts and executor trust tiers.
//!
//! A [`UsageFact`] describes one billable unit of work (typically one
//! model call) as reported by the executor that performed it. How much
//! the report is trusted depends on the executor type: in-process and
//! sandboxed executors run inside our trust boundary and must attach a
//! stable `usage_unit_id`; an external graph server cannot be relied on
//! for that, so its reports are advisory hints only.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Executor types & trust tiers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The kind of executor that produced a run's events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorType {
    /// Model calls made directly by this process.
    InProcess,
    /// A containerized agent we launched and control.
    Sandboxed,
    /// An external graph server outside the trust boundary.
    ExternalServer,
}

/// How much weight a usage report from an executor carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustTier {
    /// Reports are billed inline; malformed facts fail the run.
    BillingAuthoritative,
    /// Reports are advisory; malformed facts are logged and skipped.
    HintsOnly,
}

impl ExecutorType {
    pub fn trust_tier(self) -> TrustTier {
        match self {
            Self::InProcess | Self::Sandboxed => TrustTier::BillingAuthoritative,
            Self::ExternalServer => TrustTier::HintsOnly,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// UsageFact
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One billable unit of work reported by an executor.
///
/// Cost is carried as integer micro-USD so that duplicate-delivery
/// comparisons are exact; floats would make the idempotency-mismatch
/// check unreliable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageFact {
    pub run_id: Uuid,
    pub attempt: u32,
    /// Free-form producer label, e.g. "completion" or "embedding".
    pub source: String,
    pub executor_type: ExecutorType,
    pub billing_account_id: String,
    pub virtual_key_id: String,
    /// Namespaced graph identifier, e.g. "acme:support-triage".
    pub graph_id: String,
    /// Stable id of the billable unit. Mandatory for
    /// billing-authoritative executors, optional for hints-only ones.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage_unit_id: Option<String>,
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
    #[serde(default)]
    pub cost_microusd: i64,
}

impl UsageFact {
    /// The ledger idempotency key: `run/attempt/unit`.
    ///
    /// `None` when the fact has no `usage_unit_id` — such facts are
    /// never committed.
    pub fn ledger_key(&self) -> Option<String> {
        self.usage_unit_id
            .as_deref()
            .map(|unit| format!("{}/{}/{}", self.run_id, self.attempt, unit))
    }

    /// Split `graph_id` into its `(namespace, name)` parts.
    ///
    /// `None` when the id is not of the `provider:name` form.
    pub fn graph_namespace(&self) -> Option<(&str, &str)> {
        let (ns, name) = self.graph_id.split_once(':')?;
        if ns.is_empty() || name.is_empty() {
            return None;
        }
        Some((ns, name))
    }
}
