use switchyard_negotiation::Transport;

use crate::error::NodeError;

/// Parse an endpoint string like `ipc:///tmp/switchyard/foo.sock` or
/// `tcp://host:port` into a [`Transport`], as a config error.
pub fn parse_endpoint_to_transport(endpoint: &str) -> Result<Transport, NodeError> {
    endpoint
        .parse::<Transport>()
        .map_err(|e| NodeError::Config(e.to_string()))
}
