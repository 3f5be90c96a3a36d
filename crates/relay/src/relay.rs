//! The pump: one producer task fanning a transport stream out to
//! independent subscriber workers.
//!
//! Entry point: build a [`RunRelay`] for a run's [`RunContext`],
//! [`RunRelay::attach`] subscribers, then [`RunRelay::pump`] the
//! transport stream. `pump` consumes the relay, so it can only run
//! once per instance, and it resolves only after every subscriber has
//! drained its queue and observed the terminal transition.

use std::sync::Arc;

use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::task::JoinSet;
use tracing::Instrument;

use rr_domain::config::RelayConfig;
use rr_domain::context::RunContext;
use rr_domain::error::{Error, Result};
use rr_domain::event::{AiEvent, TerminalReason};
use rr_domain::stream::BoxStream;
use rr_domain::trace::TraceEvent;

use crate::queue::{EventQueue, QueueItem, QueuePolicy};
use crate::subscriber::RunSubscriber;
use crate::termination::TerminationGate;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Outcome
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What the caller learns once the pump has fully drained.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// `true` only when the run completed normally and every
    /// correctness-critical subscriber committed its side effects.
    pub ok: bool,
    pub reason: TerminalReason,
    /// Events observed after the terminal transition and discarded.
    pub dropped_after_terminal: u64,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// RunRelay
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct Attached {
    subscriber: Arc<dyn RunSubscriber>,
    queue: Arc<EventQueue>,
}

/// The per-run event relay.
pub struct RunRelay {
    ctx: RunContext,
    config: RelayConfig,
    gate: Arc<TerminationGate>,
    subscribers: Vec<Arc<dyn RunSubscriber>>,
}

impl RunRelay {
    pub fn new(ctx: RunContext, config: RelayConfig) -> Self {
        Self {
            ctx,
            config,
            gate: Arc::new(TerminationGate::new()),
            subscribers: Vec::new(),
        }
    }

    /// The run's termination gate, for callers that want to observe
    /// completion from outside the pump.
    pub fn gate(&self) -> Arc<TerminationGate> {
        self.gate.clone()
    }

    /// Register a subscriber. Must happen before [`Self::pump`].
    pub fn attach(&mut self, subscriber: Arc<dyn RunSubscriber>) {
        self.subscribers.push(subscriber);
    }

    /// Drive the transport stream to completion.
    ///
    /// Reads one event at a time, fans non-terminal events out to
    /// every subscriber queue, flips the termination gate on the first
    /// `done`/`error` before forwarding it, and counts (never
    /// forwards) everything that arrives afterwards. A transport-level
    /// fault or a stream that ends without a terminal is converted
    /// into a synthesized terminal `error`, so subscribers always
    /// observe a well-formed transition.
    pub async fn pump(self, stream: BoxStream<'static, Result<AiEvent>>) -> RunOutcome {
        let span = tracing::info_span!(
            "pump",
            run_id = %self.ctx.run_id,
            attempt = self.ctx.attempt,
        );
        self.pump_inner(stream).instrument(span).await
    }

    async fn pump_inner(self, mut stream: BoxStream<'static, Result<AiEvent>>) -> RunOutcome {
        let RunRelay {
            ctx,
            config,
            gate,
            subscribers,
        } = self;

        // First failure reported by a correctness-critical subscriber
        // (or by an overflowing critical queue), as a terminal code.
        let failure: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));

        // ── Build queues and spawn one worker per subscriber ──────
        let attached: Vec<Attached> = subscribers
            .into_iter()
            .map(|subscriber| {
                let capacity = subscriber.queue_capacity(&config.queues);
                let queue = Arc::new(EventQueue::new(capacity, subscriber.queue_policy()));
                Attached { subscriber, queue }
            })
            .collect();

        let mut workers: JoinSet<(&'static str, Result<()>)> = JoinSet::new();
        for entry in &attached {
            let subscriber = entry.subscriber.clone();
            let queue = entry.queue.clone();
            let ctx = ctx.clone();
            let failure = failure.clone();
            let name = subscriber.name();
            let worker_span = tracing::info_span!("subscriber", name);
            workers.spawn(
                async move {
                    let result = drive_subscriber(subscriber, queue, ctx, failure).await;
                    (name, result)
                }
                .instrument(worker_span),
            );
        }

        // ── Pump loop ─────────────────────────────────────────────
        while let Some(next) = stream.next().await {
            // A critical subscriber failed mid-run: stop billing and
            // terminate rather than continuing to forward events.
            if !gate.is_terminated() {
                let code = failure.lock().clone();
                if let Some(code) = code {
                    terminate(&gate, &attached, TerminalReason::Error { code });
                }
            }

            if gate.is_terminated() {
                gate.record_dropped();
                TraceEvent::EventDroppedAfterTerminal {
                    run_id: ctx.run_id.to_string(),
                }
                .emit();
                continue;
            }

            match next {
                Ok(event) => {
                    if let Some(reason) = event.terminal_reason() {
                        terminate(&gate, &attached, reason);
                    } else {
                        forward(&attached, event, &failure);
                    }
                }
                Err(error) => {
                    // Never forward the raw fault; synthesize a clean
                    // terminal error instead.
                    tracing::warn!(run_id = %ctx.run_id, error = %error, "transport fault mid-stream");
                    terminate(
                        &gate,
                        &attached,
                        TerminalReason::Error {
                            code: "transport_fault".into(),
                        },
                    );
                }
            }
        }

        // Stream exhausted without a terminal event: a contract
        // violation by the transport, re-enforced here.
        if !gate.is_terminated() {
            let code = failure
                .lock()
                .clone()
                .unwrap_or_else(|| "transport_incomplete".into());
            terminate(&gate, &attached, TerminalReason::Error { code });
        }

        // ── Drain: wait for every subscriber to finish ────────────
        let mut worker_failure: Option<String> = None;
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((name, Err(error))) => {
                    tracing::error!(subscriber = name, error = %error, "subscriber finished with error");
                    worker_failure.get_or_insert_with(|| failure_code(&error));
                }
                Err(join_error) => {
                    tracing::error!(error = %join_error, "subscriber worker panicked");
                    worker_failure.get_or_insert_with(|| "subscriber_panicked".into());
                }
            }
        }

        // ── Outcome ───────────────────────────────────────────────
        let gate_reason = gate.reason().unwrap_or(TerminalReason::Error {
            code: "internal".into(),
        });
        let late_failure = failure.lock().clone().or(worker_failure);
        let reason = match (&gate_reason, late_failure) {
            // A critical side effect failed after the stream already
            // terminated normally; the run still counts as failed.
            (TerminalReason::Done, Some(code)) => TerminalReason::Error { code },
            _ => gate_reason,
        };

        let dropped_after_terminal = gate.dropped_after_terminal();
        TraceEvent::RunTerminated {
            run_id: ctx.run_id.to_string(),
            reason: reason.code().to_owned(),
            dropped_after_terminal,
        }
        .emit();

        RunOutcome {
            ok: !reason.is_error(),
            reason,
            dropped_after_terminal,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Pump helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Flip the gate and, if this call won, forward the terminal to every
/// subscriber queue. Losing calls leave the queues untouched so each
/// subscriber sees the transition at most once.
fn terminate(gate: &TerminationGate, attached: &[Attached], reason: TerminalReason) -> bool {
    if !gate.try_terminate(reason.clone()) {
        return false;
    }
    for entry in attached {
        // Terminal pushes are always admitted.
        let _ = entry.queue.push(QueueItem::Terminal(reason.clone()));
    }
    true
}

/// Fan one non-terminal event out to every queue. A full critical
/// queue records a run-failing code; best-effort queues handle
/// overflow themselves.
fn forward(attached: &[Attached], event: AiEvent, failure: &Mutex<Option<String>>) {
    let shared = Arc::new(event);
    for entry in attached {
        if let Err(full) = entry.queue.push(QueueItem::Event(shared.clone())) {
            let error = Error::QueueOverflow {
                subscriber: entry.subscriber.name(),
                capacity: full.capacity,
            };
            tracing::error!(error = %error, "critical subscriber queue overflowed");
            failure.lock().get_or_insert_with(|| failure_code(&error));
        }
    }
}

/// Map a subscriber error to the terminal code reported to callers.
fn failure_code(error: &Error) -> String {
    match error {
        Error::Validation(_) => "usage_validation_failed".into(),
        Error::QueueOverflow { .. } => "subscriber_queue_overflow".into(),
        Error::LedgerStore(_) => "ledger_store_unavailable".into(),
        Error::ArtifactStore(_) => "artifact_store_unavailable".into(),
        _ => "internal".into(),
    }
}

/// One subscriber's consumption loop: process queued events in order,
/// then observe the terminal and exit.
///
/// A failing critical subscriber records the failure for the pump and
/// keeps draining (without processing) so the queue still empties and
/// the terminal is still observed.
async fn drive_subscriber(
    subscriber: Arc<dyn RunSubscriber>,
    queue: Arc<EventQueue>,
    ctx: RunContext,
    failure: Arc<Mutex<Option<String>>>,
) -> Result<()> {
    let critical = subscriber.queue_policy() == QueuePolicy::FailRunWhenFull;
    let mut result: Result<()> = Ok(());

    loop {
        match queue.pop().await {
            QueueItem::Event(event) => {
                if result.is_err() {
                    continue;
                }
                if let Err(error) = subscriber.on_event(&ctx, &event).await {
                    if critical {
                        tracing::error!(
                            subscriber = subscriber.name(),
                            error = %error,
                            "critical subscriber failed; run will terminate"
                        );
                        failure
                            .lock()
                            .get_or_insert_with(|| failure_code(&error));
                        result = Err(error);
                    } else {
                        tracing::warn!(
                            subscriber = subscriber.name(),
                            error = %error,
                            "best-effort subscriber error ignored"
                        );
                    }
                }
            }
            QueueItem::Terminal(reason) => {
                if let Err(error) = subscriber.on_terminal(&ctx, &reason).await {
                    tracing::warn!(
                        subscriber = subscriber.name(),
                        error = %error,
                        "terminal handler error"
                    );
                    if critical && result.is_ok() {
                        failure
                            .lock()
                            .get_or_insert_with(|| failure_code(&error));
                        result = Err(error);
                    }
                }
                if queue.dropped() > 0 {
                    tracing::debug!(
                        subscriber = subscriber.name(),
                        dropped = queue.dropped(),
                        "events evicted under queue pressure"
                    );
                }
                break;
            }
        }
    }

    result
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    /// Records everything it observes; used to assert ordering and
    /// exactly-once terminal delivery.
    struct Recording {
        policy: QueuePolicy,
        events: Mutex<Vec<String>>,
        terminals: Mutex<Vec<TerminalReason>>,
    }

    impl Recording {
        fn new(policy: QueuePolicy) -> Arc<Self> {
            Arc::new(Self {
                policy,
                events: Mutex::new(Vec::new()),
                terminals: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait::async_trait]
    impl RunSubscriber for Recording {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn queue_policy(&self) -> QueuePolicy {
            self.policy
        }

        async fn on_event(&self, _ctx: &RunContext, event: &AiEvent) -> Result<()> {
            if let AiEvent::TextDelta { text } = event {
                self.events.lock().push(text.clone());
            }
            Ok(())
        }

        async fn on_terminal(&self, _ctx: &RunContext, reason: &TerminalReason) -> Result<()> {
            self.terminals.lock().push(reason.clone());
            Ok(())
        }
    }

    fn ctx() -> RunContext {
        RunContext::new(Uuid::new_v4(), 0, "acct-1", "thread-1")
    }

    fn stream_of(events: Vec<AiEvent>) -> BoxStream<'static, Result<AiEvent>> {
        Box::pin(futures_util::stream::iter(events.into_iter().map(Ok)))
    }

    #[tokio::test]
    async fn events_delivered_in_order_before_pump_returns() {
        let recording = Recording::new(QueuePolicy::DropOldest);
        let mut relay = RunRelay::new(ctx(), RelayConfig::default());
        relay.attach(recording.clone());

        let outcome = relay
            .pump(stream_of(vec![
                AiEvent::TextDelta { text: "a".into() },
                AiEvent::TextDelta { text: "b".into() },
                AiEvent::TextDelta { text: "c".into() },
                AiEvent::Done,
            ]))
            .await;

        assert!(outcome.ok);
        assert_eq!(*recording.events.lock(), vec!["a", "b", "c"]);
        assert_eq!(*recording.terminals.lock(), vec![TerminalReason::Done]);
    }

    #[tokio::test]
    async fn duplicate_terminal_counted_not_forwarded() {
        let recording = Recording::new(QueuePolicy::DropOldest);
        let mut relay = RunRelay::new(ctx(), RelayConfig::default());
        relay.attach(recording.clone());

        let outcome = relay
            .pump(stream_of(vec![
                AiEvent::Error { code: "boom".into() },
                AiEvent::Error { code: "boom-again".into() },
            ]))
            .await;

        assert!(!outcome.ok);
        assert_eq!(outcome.reason.code(), "boom");
        assert_eq!(outcome.dropped_after_terminal, 1);
        assert_eq!(recording.terminals.lock().len(), 1);
    }

    #[tokio::test]
    async fn events_after_terminal_are_discarded() {
        let recording = Recording::new(QueuePolicy::DropOldest);
        let mut relay = RunRelay::new(ctx(), RelayConfig::default());
        relay.attach(recording.clone());

        let outcome = relay
            .pump(stream_of(vec![
                AiEvent::TextDelta { text: "before".into() },
                AiEvent::Done,
                AiEvent::TextDelta { text: "after".into() },
            ]))
            .await;

        assert!(outcome.ok);
        assert_eq!(outcome.dropped_after_terminal, 1);
        assert_eq!(*recording.events.lock(), vec!["before"]);
    }

    #[tokio::test]
    async fn missing_terminal_is_synthesized() {
        let recording = Recording::new(QueuePolicy::DropOldest);
        let mut relay = RunRelay::new(ctx(), RelayConfig::default());
        relay.attach(recording.clone());

        let outcome = relay
            .pump(stream_of(vec![AiEvent::TextDelta { text: "x".into() }]))
            .await;

        assert!(!outcome.ok);
        assert_eq!(outcome.reason.code(), "transport_incomplete");
        assert_eq!(
            *recording.terminals.lock(),
            vec![TerminalReason::Error {
                code: "transport_incomplete".into()
            }]
        );
    }

    #[tokio::test]
    async fn transport_fault_becomes_clean_terminal_error() {
        let recording = Recording::new(QueuePolicy::DropOldest);
        let mut relay = RunRelay::new(ctx(), RelayConfig::default());
        relay.attach(recording.clone());

        let stream: BoxStream<'static, Result<AiEvent>> =
            Box::pin(futures_util::stream::iter(vec![
                Ok(AiEvent::TextDelta { text: "x".into() }),
                Err(Error::Transport("connection reset".into())),
            ]));

        let outcome = relay.pump(stream).await;
        assert!(!outcome.ok);
        assert_eq!(outcome.reason.code(), "transport_fault");
        assert_eq!(recording.terminals.lock().len(), 1);
    }

    #[tokio::test]
    async fn gate_visible_to_external_callers() {
        let mut relay = RunRelay::new(ctx(), RelayConfig::default());
        relay.attach(Recording::new(QueuePolicy::DropOldest));
        let gate = relay.gate();
        assert!(!gate.is_terminated());

        relay.pump(stream_of(vec![AiEvent::Done])).await;
        assert!(gate.is_terminated());
        assert_eq!(gate.reason(), Some(TerminalReason::Done));
    }

    /// A critical subscriber whose handler always fails.
    struct FailingCritical;

    #[async_trait::async_trait]
    impl RunSubscriber for FailingCritical {
        fn name(&self) -> &'static str {
            "failing-critical"
        }

        fn queue_policy(&self) -> QueuePolicy {
            QueuePolicy::FailRunWhenFull
        }

        async fn on_event(&self, _ctx: &RunContext, _event: &AiEvent) -> Result<()> {
            Err(Error::LedgerStore("store offline".into()))
        }
    }

    /// A critical subscriber too slow to keep up, squeezed through a
    /// single-slot queue.
    struct SlowCritical;

    #[async_trait::async_trait]
    impl RunSubscriber for SlowCritical {
        fn name(&self) -> &'static str {
            "slow-critical"
        }

        fn queue_policy(&self) -> QueuePolicy {
            QueuePolicy::FailRunWhenFull
        }

        fn queue_capacity(&self, _queues: &rr_domain::config::QueueConfig) -> usize {
            1
        }

        async fn on_event(&self, _ctx: &RunContext, _event: &AiEvent) -> Result<()> {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn critical_queue_overflow_fails_the_run() {
        let mut relay = RunRelay::new(ctx(), RelayConfig::default());
        relay.attach(Arc::new(SlowCritical));

        let outcome = relay
            .pump(stream_of(vec![
                AiEvent::TextDelta { text: "a".into() },
                AiEvent::TextDelta { text: "b".into() },
                AiEvent::TextDelta { text: "c".into() },
                AiEvent::TextDelta { text: "d".into() },
                AiEvent::Done,
            ]))
            .await;

        assert!(!outcome.ok);
        assert_eq!(outcome.reason.code(), "subscriber_queue_overflow");
    }

    #[tokio::test]
    async fn critical_failure_fails_the_run() {
        let mut relay = RunRelay::new(ctx(), RelayConfig::default());
        relay.attach(Arc::new(FailingCritical));

        let outcome = relay
            .pump(stream_of(vec![
                AiEvent::TextDelta { text: "x".into() },
                AiEvent::Done,
            ]))
            .await;

        assert!(!outcome.ok);
        assert_eq!(outcome.reason.code(), "ledger_store_unavailable");
    }
}
