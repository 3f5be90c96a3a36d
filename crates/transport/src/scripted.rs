//! A deterministic transport that replays a canned event script.
//!
//! Used by tests across the workspace to drive the relay without any
//! external executor. A script is a list of events with optional
//! injected transport faults, so misbehaving producers (duplicate
//! terminals, mid-stream faults, missing terminals) are easy to stage.

use async_stream::stream;
use tokio::sync::oneshot;

use rr_domain::error::{Error, Result};
use rr_domain::event::AiEvent;
use rr_domain::stream::BoxStream;
use rr_domain::usage::ExecutorType;

use crate::traits::{ExecutionTransport, FinalResult, RunRequest, TransportRun};

/// One step of a scripted run.
#[derive(Debug, Clone)]
pub enum ScriptedItem {
    /// Yield this event.
    Event(AiEvent),
    /// Raise a transport-level fault (stream yields `Err`).
    Fault(String),
}

/// A transport that replays the same script for every run.
pub struct ScriptedTransport {
    id: String,
    executor_type: ExecutorType,
    script: Vec<ScriptedItem>,
}

impl ScriptedTransport {
    pub fn new(executor_type: ExecutorType, script: Vec<ScriptedItem>) -> Self {
        Self {
            id: "scripted".into(),
            executor_type,
            script,
        }
    }

    /// Convenience constructor for fault-free scripts.
    pub fn events(executor_type: ExecutorType, events: Vec<AiEvent>) -> Self {
        Self::new(
            executor_type,
            events.into_iter().map(ScriptedItem::Event).collect(),
        )
    }
}

#[async_trait::async_trait]
impl ExecutionTransport for ScriptedTransport {
    async fn run(&self, _req: RunRequest) -> Result<TransportRun> {
        let script = self.script.clone();
        let (result_tx, result_rx) = oneshot::channel();

        // Settle the final result from the script up front; the stream
        // below replays the same items.
        let mut final_result = FinalResult::default();
        for item in &script {
            match item {
                ScriptedItem::Event(AiEvent::AssistantFinal { content }) => {
                    final_result.content = Some(content.clone());
                }
                ScriptedItem::Event(AiEvent::Error { code }) => {
                    final_result.error = Some(code.clone());
                }
                ScriptedItem::Fault(message) => {
                    final_result.error = Some(message.clone());
                }
                _ => {}
            }
        }
        let _ = result_tx.send(final_result);

        let events: BoxStream<'static, Result<AiEvent>> = Box::pin(stream! {
            for item in script {
                match item {
                    ScriptedItem::Event(event) => yield Ok(event),
                    ScriptedItem::Fault(message) => {
                        yield Err(Error::Transport(message));
                        return;
                    }
                }
            }
        });

        Ok(TransportRun {
            events,
            final_result: result_rx,
        })
    }

    fn executor_type(&self) -> ExecutorType {
        self.executor_type
    }

    fn transport_id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn replays_events_in_order() {
        let transport = ScriptedTransport::events(
            ExecutorType::InProcess,
            vec![
                AiEvent::TextDelta { text: "a".into() },
                AiEvent::TextDelta { text: "b".into() },
                AiEvent::Done,
            ],
        );

        let mut run = transport.run(RunRequest::default()).await.unwrap();
        let mut texts = Vec::new();
        while let Some(event) = run.events.next().await {
            match event.unwrap() {
                AiEvent::TextDelta { text } => texts.push(text),
                AiEvent::Done => break,
                other => panic!("unexpected event: {other:?}"),
            }
        }
        assert_eq!(texts, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn fault_ends_the_stream() {
        let transport = ScriptedTransport::new(
            ExecutorType::InProcess,
            vec![
                ScriptedItem::Event(AiEvent::TextDelta { text: "x".into() }),
                ScriptedItem::Fault("connection reset".into()),
                // Never reached.
                ScriptedItem::Event(AiEvent::Done),
            ],
        );

        let mut run = transport.run(RunRequest::default()).await.unwrap();
        assert!(run.events.next().await.unwrap().is_ok());
        assert!(run.events.next().await.unwrap().is_err());
        assert!(run.events.next().await.is_none());
    }

    #[tokio::test]
    async fn final_result_resolves() {
        let transport = ScriptedTransport::events(
            ExecutorType::Sandboxed,
            vec![
                AiEvent::AssistantFinal { content: "answer".into() },
                AiEvent::Done,
            ],
        );

        let run = transport.run(RunRequest::default()).await.unwrap();
        let result = run.final_result.await.unwrap();
        assert_eq!(result.content.as_deref(), Some("answer"));
        assert!(result.error.is_none());
    }
}
