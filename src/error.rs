use thiserror::Error;

/// Errors raised by the trainable and its training loop.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Expected data for {expected} agents, got {found}")]
    AgentCountMismatch { expected: usize, found: usize },

    #[error("No cached actions: select_actions must run before store_transition")]
    NoCachedActions,

    #[error("Cannot sample from action distribution: {0}")]
    Sampling(#[from] rand::distr::weighted::Error),

    #[error("Checkpoint I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize parameters: {0}")]
    Record(String),

    #[error("Failed to format run timestamp: {0}")]
    Timestamp(#[from] time::error::Format),
}

pub type Result<T> = std::result::Result<T, Error>;
