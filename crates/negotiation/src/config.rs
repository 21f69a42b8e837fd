use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Negotiation timing, typically parsed from TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegotiationConfig {
    /// Whether this instance takes part in the election at all.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Topic of the negotiation channel.
    #[serde(default = "default_topic")]
    pub topic: String,
    /// Interval between state machine ticks, in milliseconds.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Silence after which comms are considered lost, in milliseconds.
    #[serde(default = "default_comms_timeout_ms")]
    pub comms_timeout_ms: u64,
    /// Time spent in `Starting` watching for a master, in milliseconds.
    #[serde(default = "default_initial_wait_ms")]
    pub initial_wait_ms: u64,
    /// Time spent in each requesting step, in milliseconds.
    #[serde(default = "default_request_interval_ms")]
    pub request_interval_ms: u64,
    /// Absence of `IAmMaster` after which standbys re-negotiate, in milliseconds.
    #[serde(default = "default_master_timeout_ms")]
    pub master_timeout_ms: u64,
    /// Absence of `IAmStandby` after which a partner is reported dead, in milliseconds.
    #[serde(default = "default_partner_timeout_ms")]
    pub partner_timeout_ms: u64,
}

fn default_enabled() -> bool { true }
fn default_topic() -> String { "switchyard.negotiation".to_string() }
fn default_tick_interval_ms() -> u64 { 1_000 }
fn default_comms_timeout_ms() -> u64 { 10_000 }
fn default_initial_wait_ms() -> u64 { 3_000 }
fn default_request_interval_ms() -> u64 { 1_000 }
fn default_master_timeout_ms() -> u64 { 15_000 }
fn default_partner_timeout_ms() -> u64 { 15_000 }

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            topic: default_topic(),
            tick_interval_ms: default_tick_interval_ms(),
            comms_timeout_ms: default_comms_timeout_ms(),
            initial_wait_ms: default_initial_wait_ms(),
            request_interval_ms: default_request_interval_ms(),
            master_timeout_ms: default_master_timeout_ms(),
            partner_timeout_ms: default_partner_timeout_ms(),
        }
    }
}

impl NegotiationConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn comms_timeout(&self) -> chrono::Duration {
        millis(self.comms_timeout_ms)
    }

    pub fn initial_wait(&self) -> chrono::Duration {
        millis(self.initial_wait_ms)
    }

    pub fn request_interval(&self) -> chrono::Duration {
        millis(self.request_interval_ms)
    }

    pub fn master_timeout(&self) -> chrono::Duration {
        millis(self.master_timeout_ms)
    }

    pub fn partner_timeout(&self) -> chrono::Duration {
        millis(self.partner_timeout_ms)
    }
}

fn millis(ms: u64) -> chrono::Duration {
    chrono::Duration::milliseconds(i64::try_from(ms).unwrap_or(i64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = NegotiationConfig::default();
        assert!(config.enabled);
        assert_eq!(config.tick_interval(), Duration::from_secs(1));
        assert_eq!(config.master_timeout(), chrono::Duration::seconds(15));
    }
}
