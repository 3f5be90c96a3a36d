//! The run-scoped event relay.
//!
//! One relay instance serves one run: it consumes the transport's
//! event stream, owns the terminal state machine, and fans events out
//! to registered subscribers over independent bounded queues so that a
//! slow or disconnected consumer can never stall the pump or corrupt
//! billing.

pub mod forward;
pub mod queue;
pub mod relay;
pub mod subscriber;
pub mod termination;

pub use forward::UiForwarder;
pub use queue::QueuePolicy;
pub use relay::{RunOutcome, RunRelay};
pub use subscriber::RunSubscriber;
pub use termination::TerminationGate;
