//! The switchyard node: listener clients over ZeroMQ, the poll scheduler,
//! master negotiation with its peers and an HTTP stats endpoint.

pub mod config;
pub mod error;
pub mod handler;
pub mod jobs;
pub mod listener;
pub mod node;
pub mod stats;

pub use config::{ClientConfig, ClusterConfig, NodeConfig};
pub use error::NodeError;
pub use handler::LoggingHandler;
pub use listener::ZmqListenerClient;
pub use node::Node;
pub use stats::{NodeState, NodeStatistics};
