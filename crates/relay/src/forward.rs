//! Best-effort forwarding of the live stream to a UI client.
//!
//! The client holds the receiving half of a channel and may disconnect
//! at any time — a closed or congested channel never fails the run and
//! never slows the billing or history subscribers
//! (BILLING_INDEPENDENT_OF_CLIENT).

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;

use rr_domain::config::QueueConfig;
use rr_domain::context::RunContext;
use rr_domain::error::Result;
use rr_domain::event::{AiEvent, TerminalReason};
use rr_domain::trace::TraceEvent;

use crate::queue::QueuePolicy;
use crate::subscriber::RunSubscriber;

/// Forwards every event (terminal included) to a UI channel.
pub struct UiForwarder {
    tx: mpsc::Sender<AiEvent>,
    detached: AtomicBool,
}

impl UiForwarder {
    /// Build a forwarder and the client-side receiver.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<AiEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                tx,
                detached: AtomicBool::new(false),
            },
            rx,
        )
    }

    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Relaxed)
    }

    fn send(&self, ctx: &RunContext, event: AiEvent) {
        if self.is_detached() {
            return;
        }
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Closed(_)) => {
                // Client went away; log once and stay silent after.
                self.detached.store(true, Ordering::Relaxed);
                TraceEvent::UiSubscriberDetached {
                    run_id: ctx.run_id.to_string(),
                }
                .emit();
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::debug!(run_id = %ctx.run_id, "UI channel congested, frame dropped");
            }
        }
    }
}

#[async_trait::async_trait]
impl RunSubscriber for UiForwarder {
    fn name(&self) -> &'static str {
        "ui"
    }

    fn queue_policy(&self) -> QueuePolicy {
        QueuePolicy::DropOldest
    }

    fn queue_capacity(&self, queues: &QueueConfig) -> usize {
        queues.ui_capacity
    }

    async fn on_event(&self, ctx: &RunContext, event: &AiEvent) -> Result<()> {
        self.send(ctx, event.clone());
        Ok(())
    }

    async fn on_terminal(&self, ctx: &RunContext, reason: &TerminalReason) -> Result<()> {
        // Reconstruct the terminal event the client expects on the wire.
        let event = match reason {
            TerminalReason::Done => AiEvent::Done,
            TerminalReason::Error { code } => AiEvent::Error { code: code.clone() },
        };
        self.send(ctx, event);
        Ok(())
    }
}
