use std::path::Path;
use std::str::FromStr;

use tracing::warn;

use crate::error::NodeError;

use super::types::NodeConfig;

impl NodeConfig {
    /// Parse config from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, NodeError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, NodeError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    // ── Environment variable overrides ──────────────────────────────

    /// Apply environment variable overrides.
    ///
    /// Convention: `SWITCHYARD_SECTION_KEY` overrides `section.key`.
    /// Examples:
    /// - `SWITCHYARD_SERVICE_ID` -> `service_id`
    /// - `SWITCHYARD_STATS_PORT` -> `stats_port`
    /// - `SWITCHYARD_CLUSTER_BIND` -> `cluster.bind`
    /// - `SWITCHYARD_CLUSTER_PEERS` -> `cluster.peers` (comma separated)
    /// - `SWITCHYARD_NEGOTIATION_ENABLED` -> `negotiation.enabled`
    /// - `SWITCHYARD_SCHEDULER_SHUTDOWN_GRACE_MS` -> `scheduler.shutdown_grace_ms`
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup.
    pub(crate) fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("SWITCHYARD_SERVICE_ID") {
            self.service_id = v;
        }
        override_parsed(&lookup, "SWITCHYARD_STATS_PORT", &mut self.stats_port);

        if let Some(v) = lookup("SWITCHYARD_CLUSTER_BIND") {
            self.cluster.bind = v;
        }
        if let Some(v) = lookup("SWITCHYARD_CLUSTER_PEERS") {
            self.cluster.peers = v
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect();
        }

        let negotiation = &mut self.negotiation;
        override_parsed(&lookup, "SWITCHYARD_NEGOTIATION_ENABLED", &mut negotiation.enabled);
        if let Some(v) = lookup("SWITCHYARD_NEGOTIATION_TOPIC") {
            negotiation.topic = v;
        }
        override_parsed(&lookup, "SWITCHYARD_NEGOTIATION_TICK_INTERVAL_MS", &mut negotiation.tick_interval_ms);
        override_parsed(&lookup, "SWITCHYARD_NEGOTIATION_COMMS_TIMEOUT_MS", &mut negotiation.comms_timeout_ms);
        override_parsed(&lookup, "SWITCHYARD_NEGOTIATION_INITIAL_WAIT_MS", &mut negotiation.initial_wait_ms);
        override_parsed(&lookup, "SWITCHYARD_NEGOTIATION_REQUEST_INTERVAL_MS", &mut negotiation.request_interval_ms);
        override_parsed(&lookup, "SWITCHYARD_NEGOTIATION_MASTER_TIMEOUT_MS", &mut negotiation.master_timeout_ms);
        override_parsed(&lookup, "SWITCHYARD_NEGOTIATION_PARTNER_TIMEOUT_MS", &mut negotiation.partner_timeout_ms);

        let scheduler = &mut self.scheduler;
        override_parsed(&lookup, "SWITCHYARD_SCHEDULER_SHUTDOWN_GRACE_MS", &mut scheduler.shutdown_grace_ms);
        let algorithm = &mut scheduler.algorithm;
        override_parsed(&lookup, "SWITCHYARD_SCHEDULER_ALGORITHM_ALLOWED_OVERAGE", &mut algorithm.allowed_overage);
        override_parsed(&lookup, "SWITCHYARD_SCHEDULER_ALGORITHM_CAPACITY_PERCENTAGE", &mut algorithm.capacity_percentage);
        override_parsed(&lookup, "SWITCHYARD_SCHEDULER_ALGORITHM_SUPPORTS_PAST_DUE_SCAN", &mut algorithm.supports_past_due_scan);
        override_parsed(
            &lookup,
            "SWITCHYARD_SCHEDULER_ALGORITHM_MAX_ALLOWED_WAIT_BETWEEN_POLLS_MS",
            &mut algorithm.max_allowed_wait_between_polls_ms,
        );
    }
}

/// Overwrite `target` when `key` is set and parses; unparsable values are
/// logged and ignored.
fn override_parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, target: &mut T) {
    let Some(raw) = lookup(key) else { return };
    match raw.parse::<T>() {
        Ok(value) => *target = value,
        Err(_) => warn!(key, value = %raw, "ignoring unparsable config override"),
    }
}
