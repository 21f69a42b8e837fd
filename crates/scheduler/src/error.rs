use thiserror::Error;

/// Errors raised by the scheduling core.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("unknown bulkhead priority level {0}")]
    UnknownPriorityLevel(usize),

    #[error("bulkhead underflow on level {level}: decrement with no active slot")]
    BulkheadUnderflow { level: usize },

    #[error("invalid partition config: {0}")]
    InvalidPartition(String),

    #[error("client {0} is already registered")]
    DuplicateClient(String),

    #[error("client error: {0}")]
    Client(String),

    #[error("payload handler error: {0}")]
    Handler(String),
}
