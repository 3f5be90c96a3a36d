/// Shared error type used across all RunRelay crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("transport: {0}")]
    Transport(String),

    #[error("usage fact rejected: {0}")]
    Validation(String),

    #[error("{subscriber} queue overflowed at capacity {capacity}")]
    QueueOverflow {
        subscriber: &'static str,
        capacity: usize,
    },

    #[error("ledger store: {0}")]
    LedgerStore(String),

    #[error("artifact store: {0}")]
    ArtifactStore(String),

    #[error("config: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
