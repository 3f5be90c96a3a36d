use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RelayConfig {
    #[serde(default)]
    pub queues: QueueConfig,
    #[serde(default)]
    pub masking: MaskingConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Subscriber queue sizing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum tool-call loop iterations a run may perform. Also caps
    /// the billing queue: overflowing it fails the run rather than
    /// dropping a chargeable event.
    #[serde(default = "d_25")]
    pub max_tool_iterations: usize,
    /// Upper bound on usage reports emitted per loop iteration.
    #[serde(default = "d_4")]
    pub usage_events_per_iteration: usize,
    /// Bounded history queue; evicts oldest under pressure.
    #[serde(default = "d_128")]
    pub history_capacity: usize,
    /// Bounded UI forward queue; evicts oldest under pressure.
    #[serde(default = "d_128")]
    pub ui_capacity: usize,
}

impl QueueConfig {
    /// Capacity of the billing queue: a full run's worth of usage events.
    pub fn billing_capacity(&self) -> usize {
        self.max_tool_iterations * self.usage_events_per_iteration
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_tool_iterations: 25,
            usage_events_per_iteration: 4,
            history_capacity: 128,
            ui_capacity: 128,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Secret masking
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MaskingConfig {
    /// Additional regex patterns to redact, on top of the built-ins.
    #[serde(default)]
    pub extra_patterns: Vec<String>,
}

// ── serde default helpers ─────────────────────────────────────────

fn d_25() -> usize {
    25
}
fn d_4() -> usize {
    4
}
fn d_128() -> usize {
    128
}
