use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use rr_domain::error::Result;
use rr_domain::event::AiEvent;
use rr_domain::stream::BoxStream;
use rr_domain::usage::ExecutorType;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request / Response types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A transport-agnostic run request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunRequest {
    /// Namespaced graph identifier, e.g. "acme:support-triage".
    pub graph_id: String,
    /// The user input that starts the run.
    pub input: String,
    /// Model override. `None` lets the executor choose.
    #[serde(default)]
    pub model: Option<String>,
    /// Opaque executor-specific settings.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// The eventual final result of a run, resolved after the stream ends.
#[derive(Debug, Clone, Default)]
pub struct FinalResult {
    /// Final assistant content, when the run produced one.
    pub content: Option<String>,
    /// Transport-level error description, when the run failed.
    pub error: Option<String>,
}

/// A started run: the live event stream plus the final-result handle.
///
/// The stream yields events until a terminal `done`/`error`; the
/// final-result receiver resolves once the transport has settled.
pub struct TransportRun {
    pub events: BoxStream<'static, Result<AiEvent>>,
    pub final_result: oneshot::Receiver<FinalResult>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Core transport trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Trait every execution transport must implement.
///
/// Implementations are executor-specific adapters that translate
/// between our event vocabulary and whatever the executor actually
/// does. The relay only ever consumes this interface.
#[async_trait::async_trait]
pub trait ExecutionTransport: Send + Sync {
    /// Start a run and return its event stream and final-result handle.
    async fn run(&self, req: RunRequest) -> Result<TransportRun>;

    /// The executor type behind this transport, which decides the
    /// billing trust tier of its usage reports.
    fn executor_type(&self) -> ExecutorType;

    /// A unique identifier for this transport instance.
    fn transport_id(&self) -> &str;
}
