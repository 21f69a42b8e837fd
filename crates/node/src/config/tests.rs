use std::collections::HashMap;
use std::io::Write;

use switchyard_negotiation::Transport;

use super::helpers::parse_endpoint_to_transport;
use super::types::NodeConfig;
use crate::error::NodeError;

const MINIMAL: &str = r#"service_id = "node-a""#;

const FULL: &str = r#"
service_id = "node-a"
stats_port = 9400

[scheduler]
shutdown_grace_ms = 5000

[scheduler.algorithm]
allowed_overage = 2
supports_past_due_scan = false

[[scheduler.bulkhead]]
level = 0
reservation = 6
overage = 2

[[scheduler.bulkhead]]
level = 1
reservation = 2

[negotiation]
initial_wait_ms = 500

[cluster]
bind = "tcp://0.0.0.0:5700"
peers = ["tcp://10.0.0.1:5700", "tcp://10.0.0.2:5700"]

[[clients]]
id = "orders-hot"
channel = "orders"
endpoint = "tcp://0.0.0.0:5600"
partition = { priority = 0, priority_weighting = 2.0 }

[[clients]]
id = "orders-bulk"
channel = "orders"
endpoint = "ipc:///tmp/switchyard/orders-bulk.sock"
buffer_limit = 50
partition = { priority = 1 }
"#;

#[test]
fn parse_minimal_toml() {
    let cfg = NodeConfig::from_toml(MINIMAL).unwrap();
    assert_eq!(cfg.service_id, "node-a");
    assert!(cfg.clients.is_empty());
    assert_eq!(cfg.scheduler.bulkhead.len(), 2);
    assert!(cfg.negotiation.enabled);
    assert_eq!(cfg.cluster.subscriptions(), vec![cfg.cluster.bind.clone()]);
}

#[test]
fn parse_full_toml() {
    let cfg = NodeConfig::from_toml(FULL).unwrap();
    assert_eq!(cfg.scheduler.shutdown_grace_ms, 5000);
    assert_eq!(cfg.scheduler.algorithm.allowed_overage, 2);
    assert!(!cfg.scheduler.algorithm.supports_past_due_scan);
    assert_eq!(cfg.scheduler.bulkhead[1].overage, 1); // default
    assert_eq!(cfg.negotiation.initial_wait_ms, 500);
    assert_eq!(cfg.negotiation.request_interval_ms, 1000); // default
    assert_eq!(cfg.cluster.subscriptions().len(), 2);

    assert_eq!(cfg.clients.len(), 2);
    assert_eq!(cfg.clients[0].partition.priority_weighting, 2.0);
    assert_eq!(cfg.clients[0].buffer_limit, 1000); // default
    assert_eq!(cfg.clients[1].buffer_limit, 50);
    assert_eq!(cfg.clients[1].partition.priority, 1);
}

#[test]
fn missing_service_id_fails_to_parse() {
    let err = NodeConfig::from_toml("stats_port = 1").unwrap_err();
    assert!(matches!(err, NodeError::ConfigParse(_)));
}

#[test]
fn detect_duplicate_client_ids() {
    let toml = FULL.replace("orders-bulk", "orders-hot");
    let err = NodeConfig::from_toml(&toml).unwrap_err();
    assert!(err.to_string().contains("used more than once"), "{err}");
}

#[test]
fn detect_non_positive_weighting() {
    let toml = FULL.replace("priority_weighting = 2.0", "priority_weighting = 0.0");
    let err = NodeConfig::from_toml(&toml).unwrap_err();
    assert!(err.to_string().contains("weighting must be > 0"), "{err}");
}

#[test]
fn detect_priority_without_bulkhead_level() {
    let toml = FULL.replace("partition = { priority = 1 }", "partition = { priority = 3 }");
    let err = NodeConfig::from_toml(&toml).unwrap_err();
    assert!(err.to_string().contains("priority 3"), "{err}");
}

#[test]
fn detect_empty_bulkhead() {
    let toml = r#"
service_id = "node-a"
[scheduler]
bulkhead = []
"#;
    let err = NodeConfig::from_toml(toml).unwrap_err();
    assert!(err.to_string().contains("at least one level"), "{err}");
}

#[test]
fn detect_bad_endpoint() {
    let toml = FULL.replace("tcp://0.0.0.0:5600", "udp://0.0.0.0:5600");
    let err = NodeConfig::from_toml(&toml).unwrap_err();
    assert!(err.to_string().contains("unsupported endpoint"), "{err}");
}

#[test]
fn overrides_from_lookup() {
    let vars: HashMap<&str, &str> = HashMap::from([
        ("SWITCHYARD_SERVICE_ID", "node-b"),
        ("SWITCHYARD_STATS_PORT", "9500"),
        ("SWITCHYARD_CLUSTER_PEERS", "tcp://a:1, tcp://b:2,"),
        ("SWITCHYARD_NEGOTIATION_ENABLED", "false"),
        ("SWITCHYARD_SCHEDULER_ALGORITHM_CAPACITY_PERCENTAGE", "0.5"),
        ("SWITCHYARD_NEGOTIATION_TICK_INTERVAL_MS", "not-a-number"),
    ]);
    let mut cfg = NodeConfig::from_toml(MINIMAL).unwrap();
    cfg.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

    assert_eq!(cfg.service_id, "node-b");
    assert_eq!(cfg.stats_port, 9500);
    assert_eq!(cfg.cluster.peers, vec!["tcp://a:1", "tcp://b:2"]);
    assert!(!cfg.negotiation.enabled);
    assert_eq!(cfg.scheduler.algorithm.capacity_percentage, 0.5);
    // Unparsable values leave the field alone.
    assert_eq!(cfg.negotiation.tick_interval_ms, 1000);
}

#[test]
fn env_override_partner_timeout() {
    std::env::set_var("SWITCHYARD_NEGOTIATION_PARTNER_TIMEOUT_MS", "1234");
    let cfg = NodeConfig::from_toml(MINIMAL).unwrap();
    std::env::remove_var("SWITCHYARD_NEGOTIATION_PARTNER_TIMEOUT_MS");
    assert_eq!(cfg.negotiation.partner_timeout_ms, 1234);
}

#[test]
fn load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(FULL.as_bytes()).unwrap();
    let cfg = NodeConfig::from_file(file.path()).unwrap();
    assert_eq!(cfg.stats_port, 9400);

    let err = NodeConfig::from_file("/nonexistent/switchyard.toml").unwrap_err();
    assert!(matches!(err, NodeError::ConfigIo(_)));
}

#[test]
fn parse_endpoints() {
    assert_eq!(
        parse_endpoint_to_transport("ipc:///tmp/switchyard/orders.sock").unwrap(),
        Transport::ipc("orders")
    );
    assert_eq!(
        parse_endpoint_to_transport("tcp://10.0.0.1:5600").unwrap(),
        Transport::tcp("10.0.0.1", 5600)
    );
    assert_eq!(
        parse_endpoint_to_transport("ipc:///run/feeds/orders.sock").unwrap().endpoint(),
        "ipc:///run/feeds/orders.sock"
    );
    let err = parse_endpoint_to_transport("tcp://10.0.0.1").unwrap_err();
    assert!(matches!(err, NodeError::Config(msg) if msg.contains("no port")));
    assert!(parse_endpoint_to_transport("tcp://10.0.0.1:http").is_err());
}
