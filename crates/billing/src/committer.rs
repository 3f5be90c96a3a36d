//! The ledger committer: the single writer of charge receipts.
//!
//! Consumes validated `usage_report` events and turns each into an
//! idempotent ledger row keyed `run/attempt/unit`. Duplicate delivery
//! of the same fact is a no-op; a duplicate key with a *different*
//! payload is a producer bug and raises a correctness alert (key only)
//! instead of being reconciled silently.

use sha2::{Digest, Sha256};

use rr_domain::context::RunContext;
use rr_domain::error::{Error, Result};
use rr_domain::event::AiEvent;
use rr_domain::trace::TraceEvent;
use rr_domain::usage::UsageFact;
use rr_relay::queue::QueuePolicy;
use rr_relay::subscriber::RunSubscriber;

use crate::store::{InsertOutcome, LedgerEntry, LedgerStore};
use crate::validator::{validate, Validation};

/// Billing subscriber. Owns the only [`LedgerStore`] handle in
/// production code — the single-writer invariant is structural.
pub struct LedgerCommitter<S: LedgerStore> {
    store: S,
}

impl<S: LedgerStore> LedgerCommitter<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    async fn commit(&self, ctx: &RunContext, fact: &UsageFact) -> Result<()> {
        match validate(ctx, fact) {
            Validation::Ok => {}
            Validation::SoftWarning(defects) => {
                let defects: Vec<String> = defects.iter().map(ToString::to_string).collect();
                tracing::warn!(
                    run_id = %ctx.run_id,
                    defects = ?defects,
                    "hints-tier usage fact malformed; skipping its commit"
                );
                TraceEvent::UsageValidationWarning {
                    run_id: ctx.run_id.to_string(),
                    defects,
                }
                .emit();
                TraceEvent::LedgerSkipped {
                    run_id: ctx.run_id.to_string(),
                    reason: "hints_tier_malformed".into(),
                }
                .emit();
                return Ok(());
            }
            Validation::HardFailure(defects) => {
                let defects: Vec<String> = defects.iter().map(ToString::to_string).collect();
                return Err(Error::Validation(defects.join(", ")));
            }
        }

        let key = fact
            .ledger_key()
            .ok_or_else(|| Error::Validation("missing usage_unit_id".into()))?;
        let metadata_hash = metadata_fingerprint(fact);
        // Zero-cost facts still get a receipt: reconciliation relies on
        // one row per billable unit, not one row per nonzero charge.
        let amount_microusd = fact.cost_microusd;

        let entry = LedgerEntry {
            key: key.clone(),
            run_id: fact.run_id,
            attempt: fact.attempt,
            usage_unit_id: fact.usage_unit_id.clone().unwrap_or_default(),
            billing_account_id: fact.billing_account_id.clone(),
            virtual_key_id: fact.virtual_key_id.clone(),
            graph_id: fact.graph_id.clone(),
            amount_microusd,
            metadata_hash: metadata_hash.clone(),
            recorded_at: chrono::Utc::now(),
        };

        match self.store.insert_if_absent(entry).await? {
            InsertOutcome::Inserted => {
                TraceEvent::LedgerCommitted {
                    key,
                    inserted: true,
                }
                .emit();
            }
            InsertOutcome::Existing(row) => {
                if row.amount_microusd == amount_microusd && row.metadata_hash == metadata_hash {
                    // Duplicate delivery of the same fact: benign.
                    TraceEvent::LedgerCommitted {
                        key,
                        inserted: false,
                    }
                    .emit();
                } else {
                    // Same key, different payload: a non-deterministic
                    // or buggy producer. Never overwrite; alert with
                    // the key only.
                    tracing::error!(key = %key, "ledger idempotency mismatch");
                    TraceEvent::LedgerMismatch { key }.emit();
                }
            }
        }

        Ok(())
    }
}

/// Fingerprint of everything duplicate detection compares besides the
/// amount. Fixed field order so the hash is deterministic.
fn metadata_fingerprint(fact: &UsageFact) -> String {
    let mut hasher = Sha256::new();
    hasher.update(fact.billing_account_id.as_bytes());
    hasher.update(b"|");
    hasher.update(fact.virtual_key_id.as_bytes());
    hasher.update(b"|");
    hasher.update(fact.graph_id.as_bytes());
    hasher.update(b"|");
    hasher.update(fact.source.as_bytes());
    hasher.update(b"|");
    hasher.update(fact.prompt_tokens.to_le_bytes());
    hasher.update(fact.completion_tokens.to_le_bytes());
    hasher.update(fact.total_tokens.to_le_bytes());
    hex::encode(hasher.finalize())
}

#[async_trait::async_trait]
impl<S: LedgerStore> RunSubscriber for LedgerCommitter<S> {
    fn name(&self) -> &'static str {
        "ledger"
    }

    fn queue_policy(&self) -> QueuePolicy {
        // Billing never drops a chargeable event under pressure.
        QueuePolicy::FailRunWhenFull
    }

    async fn on_event(&self, ctx: &RunContext, event: &AiEvent) -> Result<()> {
        match event {
            AiEvent::UsageReport { fact } => self.commit(ctx, fact).await,
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryLedgerStore;
    use rr_domain::usage::ExecutorType;
    use uuid::Uuid;

    fn ctx() -> RunContext {
        RunContext::new(Uuid::nil(), 0, "acct-1", "thread-1")
    }

    fn fact(unit: &str, cost: i64) -> UsageFact {
        UsageFact {
            run_id: Uuid::nil(),
            attempt: 0,
            source: "completion".into(),
            executor_type: ExecutorType::InProcess,
            billing_account_id: "acct-1".into(),
            virtual_key_id: "vk-1".into(),
            graph_id: "acme:triage".into(),
            usage_unit_id: Some(unit.into()),
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
            cost_microusd: cost,
        }
    }

    fn committer() -> LedgerCommitter<MemoryLedgerStore> {
        LedgerCommitter::new(MemoryLedgerStore::new())
    }

    #[tokio::test]
    async fn commits_one_row_per_unit() {
        let committer = committer();
        let ctx = ctx();
        committer.commit(&ctx, &fact("a", 100)).await.unwrap();
        committer.commit(&ctx, &fact("b", 200)).await.unwrap();

        assert_eq!(committer.store.row_count(), 2);
        assert_eq!(committer.store.total_microusd(), 300);
    }

    #[tokio::test]
    async fn duplicate_delivery_is_a_noop() {
        let committer = committer();
        let ctx = ctx();
        for _ in 0..5 {
            committer.commit(&ctx, &fact("a", 100)).await.unwrap();
        }
        assert_eq!(committer.store.row_count(), 1);
        assert_eq!(committer.store.total_microusd(), 100);
    }

    #[tokio::test]
    async fn mismatched_duplicate_never_overwrites() {
        let committer = committer();
        let ctx = ctx();
        committer.commit(&ctx, &fact("a", 100)).await.unwrap();
        // Same unit, different amount: alert, keep the original row.
        committer.commit(&ctx, &fact("a", 500)).await.unwrap();

        assert_eq!(committer.store.row_count(), 1);
        assert_eq!(committer.store.total_microusd(), 100);
    }

    #[tokio::test]
    async fn zero_cost_still_gets_a_receipt() {
        let committer = committer();
        committer.commit(&ctx(), &fact("free", 0)).await.unwrap();
        assert_eq!(committer.store.row_count(), 1);
        assert_eq!(committer.store.total_microusd(), 0);
    }

    #[tokio::test]
    async fn hard_failure_writes_nothing() {
        let committer = committer();
        let mut bad = fact("a", 100);
        bad.usage_unit_id = None;

        let err = committer.commit(&ctx(), &bad).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(committer.store.row_count(), 0);
    }

    #[tokio::test]
    async fn soft_warning_skips_commit_and_succeeds() {
        let committer = committer();
        let mut hinted = fact("a", 100);
        hinted.executor_type = ExecutorType::ExternalServer;
        hinted.usage_unit_id = None;

        committer.commit(&ctx(), &hinted).await.unwrap();
        assert_eq!(committer.store.row_count(), 0);
    }

    #[tokio::test]
    async fn store_outage_is_fatal() {
        let committer = committer();
        committer.store.set_unavailable(true);
        let err = committer.commit(&ctx(), &fact("a", 100)).await.unwrap_err();
        assert!(matches!(err, Error::LedgerStore(_)));
    }

    #[tokio::test]
    async fn ignores_non_usage_events() {
        let committer = committer();
        committer
            .on_event(&ctx(), &AiEvent::TextDelta { text: "hi".into() })
            .await
            .unwrap();
        assert_eq!(committer.store.row_count(), 0);
    }
}
