//! Poll allocation policy.
//!
//! The trait separates policy from client storage and ordering, so a
//! [`ClientPriorityCollection`](crate::ClientPriorityCollection) can run any
//! strategy. [`MultipleClientPollSlotAllocation`] is the default weighted fair
//! queueing strategy.

mod multiple_client;
#[cfg(test)]
mod tests;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::metrics::ClientMetrics;

pub use multiple_client::MultipleClientPollSlotAllocation;

/// Tunables shared by the poll algorithms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollAlgorithmConfig {
    /// Slots a single client may claim beyond what is available.
    #[serde(default = "default_allowed_overage")]
    pub allowed_overage: u32,
    /// Minimum age of a cached priority score before it is recomputed, in seconds.
    #[serde(default = "default_priority_recalculate_secs")]
    pub priority_recalculate_frequency_secs: u64,
    /// Longest a client may go unpolled before it is past due, in milliseconds.
    #[serde(default = "default_max_wait_between_polls_ms")]
    pub max_allowed_wait_between_polls_ms: u64,
    /// Shortest pause between two scans, in milliseconds.
    #[serde(default = "default_min_wait_between_polls_ms")]
    pub min_expected_wait_between_polls_ms: u64,
    /// Starting lower poll-wait bound of a client, in milliseconds.
    #[serde(default = "default_fabric_poll_wait_min_ms")]
    pub fabric_poll_wait_min_ms: u64,
    /// Starting upper poll-wait bound of a client, in milliseconds.
    #[serde(default = "default_fabric_poll_wait_max_ms")]
    pub fabric_poll_wait_max_ms: u64,
    /// Starting capacity fraction of a client.
    #[serde(default = "default_capacity_percentage")]
    pub capacity_percentage: f64,
    /// Whether past-due clients are scanned ahead of the priority order.
    #[serde(default = "default_supports_past_due_scan")]
    pub supports_past_due_scan: bool,
}

fn default_allowed_overage() -> u32 { 5 }
fn default_priority_recalculate_secs() -> u64 { 600 }
fn default_max_wait_between_polls_ms() -> u64 { 1000 }
fn default_min_wait_between_polls_ms() -> u64 { 100 }
fn default_fabric_poll_wait_min_ms() -> u64 { 100 }
fn default_fabric_poll_wait_max_ms() -> u64 { 1000 }
fn default_capacity_percentage() -> f64 { 0.75 }
fn default_supports_past_due_scan() -> bool { true }

impl Default for PollAlgorithmConfig {
    fn default() -> Self {
        Self {
            allowed_overage: default_allowed_overage(),
            priority_recalculate_frequency_secs: default_priority_recalculate_secs(),
            max_allowed_wait_between_polls_ms: default_max_wait_between_polls_ms(),
            min_expected_wait_between_polls_ms: default_min_wait_between_polls_ms(),
            fabric_poll_wait_min_ms: default_fabric_poll_wait_min_ms(),
            fabric_poll_wait_max_ms: default_fabric_poll_wait_max_ms(),
            capacity_percentage: default_capacity_percentage(),
            supports_past_due_scan: default_supports_past_due_scan(),
        }
    }
}

impl PollAlgorithmConfig {
    pub fn priority_recalculate_frequency(&self) -> Duration {
        Duration::from_secs(self.priority_recalculate_frequency_secs)
    }

    pub fn max_allowed_wait_between_polls(&self) -> Duration {
        Duration::from_millis(self.max_allowed_wait_between_polls_ms)
    }

    pub fn min_expected_wait_between_polls(&self) -> Duration {
        Duration::from_millis(self.min_expected_wait_between_polls_ms)
    }

    pub fn fabric_poll_wait_min(&self) -> Duration {
        Duration::from_millis(self.fabric_poll_wait_min_ms)
    }

    pub fn fabric_poll_wait_max(&self) -> Duration {
        Duration::from_millis(self.fabric_poll_wait_max_ms.max(self.fabric_poll_wait_min_ms))
    }
}

/// Policy deciding how listener clients share poll slots.
///
/// Methods take the client's [`ClientMetrics`] by reference and mutate it in
/// place; timestamps are millisecond ticks from [`crate::clock`], `None`
/// meaning now.
pub trait ListenerClientPollAlgorithm: Send + Sync {
    /// Strategy name for logging and statistics.
    fn name(&self) -> &str;

    fn allowed_overage(&self) -> u32;

    fn priority_recalculate_frequency(&self) -> Duration;

    fn max_allowed_wait_between_polls(&self) -> Duration;

    fn min_expected_wait_between_polls(&self) -> Duration;

    /// Whether the collection should grant past-due clients first.
    fn supports_past_due_scan(&self) -> bool;

    /// Slots this client may claim out of `available`. Never more than
    /// `available + allowed_overage`; `available` may be zero or negative.
    fn calculate_slots(&self, available: i64, metrics: &ClientMetrics) -> u32;

    /// Whether the client sits this scan out. Consumes one skip when it does.
    fn should_skip(&self, metrics: &ClientMetrics) -> bool;

    /// Adjust the capacity fraction from recent poll history.
    fn capacity_percentage_recalculate(&self, metrics: &ClientMetrics);

    /// Return the capacity fraction and poll history to their starting state.
    fn capacity_reset(&self, metrics: &ClientMetrics);

    /// Priority score of the client; higher polls sooner.
    fn priority_recalculate(
        &self,
        queue_length: Option<i64>,
        metrics: &ClientMetrics,
        timestamp: Option<u64>,
    ) -> i64;

    /// Fold one completed poll into the counters and wait bounds.
    fn poll_metrics_recalculate(&self, success: bool, has_errored: bool, metrics: &ClientMetrics);

    /// Starting values for a newly registered client.
    fn initialise_metrics(&self, metrics: &ClientMetrics);

    /// Whether the client has gone unpolled for longer than allowed.
    fn past_due_calculate(&self, metrics: &ClientMetrics, timestamp: Option<u64>) -> bool;
}
