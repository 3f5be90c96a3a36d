//! The event vocabulary a transport emits during a run.
//!
//! Events are deliberately identity-free: no run, tenant, or thread ids
//! ride on individual events. Identity is supplied once per run by the
//! relay's [`crate::context::RunContext`], which prevents a buggy or
//! hostile transport from attributing events to someone else's run.

use serde::{Deserialize, Serialize};

use crate::usage::UsageFact;

/// A single typed event on a run's transport stream.
///
/// A well-behaved stream ends with exactly one `done` or `error`; the
/// relay re-enforces that contract for streams that do not.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AiEvent {
    /// A chunk of assistant text.
    #[serde(rename = "text_delta")]
    TextDelta { text: String },

    /// A tool call has started.
    #[serde(rename = "tool_call_start")]
    ToolCallStart { call_id: String, tool_name: String },

    /// Incremental tool call argument data.
    #[serde(rename = "tool_call_delta")]
    ToolCallDelta { call_id: String, delta: String },

    /// A tool call is complete with full arguments.
    #[serde(rename = "tool_call_end")]
    ToolCallEnd {
        call_id: String,
        tool_name: String,
        arguments: serde_json::Value,
    },

    /// A billing-relevant usage fact reported by the executor.
    #[serde(rename = "usage_report")]
    UsageReport { fact: UsageFact },

    /// The final assistant message (full text).
    #[serde(rename = "assistant_final")]
    AssistantFinal { content: String },

    /// The run finished normally.
    #[serde(rename = "done")]
    Done,

    /// The run failed.
    #[serde(rename = "error")]
    Error { code: String },
}

impl AiEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error { .. })
    }

    /// The terminal reason this event carries, if it is a terminal event.
    pub fn terminal_reason(&self) -> Option<TerminalReason> {
        match self {
            Self::Done => Some(TerminalReason::Done),
            Self::Error { code } => Some(TerminalReason::Error { code: code.clone() }),
            _ => None,
        }
    }
}

/// Why a run reached its terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum TerminalReason {
    Done,
    Error { code: String },
}

impl TerminalReason {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// The error code, or `"done"` for a normal completion.
    pub fn code(&self) -> &str {
        match self {
            Self::Done => "done",
            Self::Error { code } => code,
        }
    }
}
