use thiserror::Error;

/// Errors raised by the negotiation layer.
#[derive(Debug, Error)]
pub enum NegotiationError {
    #[error("serialization error: {0}")]
    Serialization(#[from] rmp_serde::encode::Error),

    #[error("deserialization error: {0}")]
    Deserialization(#[from] rmp_serde::decode::Error),

    #[error("zeromq error: {0}")]
    Zmq(#[from] zeromq::ZmqError),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("negotiation channel closed")]
    ChannelClosed,

    #[error("unknown negotiation action: {0}")]
    UnknownAction(String),

    #[error("master job {name} failed: {reason}")]
    Job { name: String, reason: String },
}
