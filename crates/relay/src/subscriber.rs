use rr_domain::config::QueueConfig;
use rr_domain::context::RunContext;
use rr_domain::error::Result;
use rr_domain::event::{AiEvent, TerminalReason};

use crate::queue::QueuePolicy;

/// A passive consumer of a run's event stream.
///
/// The relay gives every attached subscriber its own bounded queue and
/// a dedicated worker task, so one subscriber's latency never blocks
/// the pump or its peers. Each subscriber observes events in exactly
/// the order the relay received them, and sees the terminal transition
/// at most once.
#[async_trait::async_trait]
pub trait RunSubscriber: Send + Sync {
    /// Short stable name used in logs and error reports.
    fn name(&self) -> &'static str;

    /// What happens when this subscriber's queue fills up.
    ///
    /// `FailRunWhenFull` marks a correctness-critical consumer: an
    /// error it returns from [`Self::on_event`] fails the whole run.
    fn queue_policy(&self) -> QueuePolicy;

    /// Queue size for this subscriber, derived from config.
    fn queue_capacity(&self, queues: &QueueConfig) -> usize {
        match self.queue_policy() {
            QueuePolicy::FailRunWhenFull => queues.billing_capacity(),
            QueuePolicy::DropOldest => queues.history_capacity,
        }
    }

    /// Handle one non-terminal event.
    async fn on_event(&self, ctx: &RunContext, event: &AiEvent) -> Result<()>;

    /// Observe the terminal transition. Delivered exactly once, after
    /// every queued event.
    async fn on_terminal(&self, ctx: &RunContext, reason: &TerminalReason) -> Result<()> {
        let _ = (ctx, reason);
        Ok(())
    }
}
