use thiserror::Error;

/// Errors raised while configuring or starting a node.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("config error: {0}")]
    Config(String),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("config I/O error: {0}")]
    ConfigIo(#[from] std::io::Error),

    #[error("scheduler error: {0}")]
    Scheduler(#[from] switchyard_scheduler::SchedulerError),

    #[error("negotiation error: {0}")]
    Negotiation(#[from] switchyard_negotiation::NegotiationError),
}
