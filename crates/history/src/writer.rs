//! The history subscriber: masked, idempotent artifact writes.
//!
//! Masking runs exactly once, before hashing, so the stored content
//! and its hash always agree. Store outages degrade: the artifact is
//! dropped with a counter and a trace event, and the run keeps going.

use std::sync::atomic::{AtomicU64, Ordering};

use sha2::{Digest, Sha256};

use rr_domain::config::MaskingConfig;
use rr_domain::context::RunContext;
use rr_domain::error::Result;
use rr_domain::event::AiEvent;
use rr_domain::trace::TraceEvent;
use rr_relay::queue::QueuePolicy;
use rr_relay::subscriber::RunSubscriber;

use crate::masking::SecretMasker;
use crate::store::{ArtifactKey, ArtifactRecord, ArtifactStore, InsertOutcome};

/// History subscriber. Owns the only [`ArtifactStore`] handle in
/// production code.
pub struct HistoryWriter<S: ArtifactStore> {
    store: S,
    masker: SecretMasker,
    /// Artifacts lost to store outages, for the degradation metric.
    dropped: AtomicU64,
}

impl<S: ArtifactStore> HistoryWriter<S> {
    pub fn new(store: S, masking: &MaskingConfig) -> Result<Self> {
        Ok(Self {
            store,
            masker: SecretMasker::new(masking)?,
            dropped: AtomicU64::new(0),
        })
    }

    /// Persist the user's input before the run starts streaming. Called
    /// by the host, not driven by events: the input exists whether or
    /// not the transport ever produces anything.
    pub async fn record_input(&self, ctx: &RunContext, content: &str) -> Result<()> {
        self.persist(ctx, ArtifactKey::Input, "user", content).await
    }

    /// Artifacts dropped because the store was unavailable.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    async fn persist(
        &self,
        ctx: &RunContext,
        artifact_key: ArtifactKey,
        role: &str,
        content: &str,
    ) -> Result<()> {
        // Mask once, hash the masked form.
        let masked = self.masker.mask(content);
        let content_hash = hex::encode(Sha256::digest(masked.as_bytes()));

        let record = ArtifactRecord {
            account_id: ctx.account_id.clone(),
            run_id: ctx.run_id,
            artifact_key,
            role: role.to_owned(),
            content: masked,
            content_hash: content_hash.clone(),
            recorded_at: chrono::Utc::now(),
        };
        let key = record.storage_key();

        match self.store.insert_if_absent(record).await {
            Ok(InsertOutcome::Inserted) => {
                TraceEvent::ArtifactWritten {
                    key,
                    inserted: true,
                }
                .emit();
            }
            Ok(InsertOutcome::Existing(row)) => {
                if row.content_hash == content_hash {
                    // Replay of the same artifact: benign.
                    TraceEvent::ArtifactWritten {
                        key,
                        inserted: false,
                    }
                    .emit();
                } else {
                    // Same key, different content. Keep the original
                    // row; alert with the key only.
                    tracing::error!(key = %key, "artifact idempotency mismatch");
                    TraceEvent::ArtifactMismatch { key }.emit();
                }
            }
            Err(e) => {
                // History is best-effort: swallow the outage, count
                // the loss, let the run finish.
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(key = %key, error = %e, "artifact store unavailable; dropping artifact");
                TraceEvent::ArtifactStoreDegraded {
                    key,
                    error: e.to_string(),
                }
                .emit();
                TraceEvent::HistoryEventDropped {
                    run_id: ctx.run_id.to_string(),
                    dropped,
                }
                .emit();
            }
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl<S: ArtifactStore> RunSubscriber for HistoryWriter<S> {
    fn name(&self) -> &'static str {
        "history"
    }

    fn queue_policy(&self) -> QueuePolicy {
        // Under pressure, losing history beats failing the run.
        QueuePolicy::DropOldest
    }

    async fn on_event(&self, ctx: &RunContext, event: &AiEvent) -> Result<()> {
        match event {
            AiEvent::AssistantFinal { content } => {
                self.persist(ctx, ArtifactKey::Output, "assistant", content)
                    .await
            }
            AiEvent::ToolCallEnd {
                call_id, arguments, ..
            } => {
                let content = serde_json::to_string(arguments).unwrap_or_default();
                self.persist(
                    ctx,
                    ArtifactKey::Tool {
                        call_id: call_id.clone(),
                    },
                    "tool",
                    &content,
                )
                .await
            }
            _ => Ok(()),
        }
    }
}
