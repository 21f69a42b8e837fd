use serde::{Deserialize, Serialize};
use switchyard_negotiation::NegotiationConfig;
use switchyard_scheduler::{PriorityPartitionConfig, SchedulerConfig};

// ── Top-level config ────────────────────────────────────────────────

/// Full configuration of one switchyard node.
///
/// Parsed from `switchyard.toml`. Every section except `service_id` has
/// defaults, so a minimal file only names the node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Identity of this instance in the master negotiation.
    pub service_id: String,

    /// Port of the `/stats` and `/health` HTTP endpoints (0 = disabled).
    #[serde(default = "default_stats_port")]
    pub stats_port: u16,

    /// Interval of the master-only scheduler report, in seconds (0 = disabled).
    #[serde(default = "default_report_interval_secs")]
    pub report_interval_secs: u64,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub negotiation: NegotiationConfig,

    /// Where the negotiation channel binds and which peers it listens to.
    #[serde(default)]
    pub cluster: ClusterConfig,

    /// Listener clients polled by the scheduler.
    #[serde(default)]
    pub clients: Vec<ClientConfig>,
}

fn default_stats_port() -> u16 { 9300 }
fn default_report_interval_secs() -> u64 { 60 }

// ── Section configs ─────────────────────────────────────────────────

/// Negotiation sockets. Each node binds one PUB endpoint and subscribes to
/// every endpoint in `peers`, which should include its own.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClusterConfig {
    #[serde(default = "default_cluster_bind")]
    pub bind: String,

    #[serde(default)]
    pub peers: Vec<String>,
}

fn default_cluster_bind() -> String {
    "ipc:///tmp/switchyard/negotiation.sock".to_string()
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            bind: default_cluster_bind(),
            peers: Vec::new(),
        }
    }
}

impl ClusterConfig {
    /// Peers to subscribe to, falling back to this node's own endpoint.
    pub fn subscriptions(&self) -> Vec<String> {
        if self.peers.is_empty() {
            vec![self.bind.clone()]
        } else {
            self.peers.clone()
        }
    }
}

/// One listener client: a PULL endpoint feeding a channel partition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub id: String,

    /// Channel the client belongs to; clients of one channel share a collection.
    pub channel: String,

    /// Endpoint the client's PULL socket binds, e.g. `tcp://0.0.0.0:5600`.
    pub endpoint: String,

    pub partition: PriorityPartitionConfig,

    /// Payloads buffered locally before the client stops reading the socket.
    #[serde(default = "default_buffer_limit")]
    pub buffer_limit: usize,
}

fn default_buffer_limit() -> usize { 1_000 }
