use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::algorithm::PollAlgorithmConfig;
use crate::bulkhead::{BulkheadStatistics, TaskSlotReservation};
use crate::collection::CollectionStatistics;
use crate::error::SchedulerError;

/// Reservation for one bulkhead priority level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkheadLevelConfig {
    /// Priority level, 0 is the highest.
    pub level: usize,
    /// Slots guaranteed to this level.
    pub reservation: u32,
    /// Extra slots the level may run beyond its reservation.
    #[serde(default = "default_level_overage")]
    pub overage: u32,
}

fn default_level_overage() -> u32 { 1 }

/// Scheduler configuration, typically parsed from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default)]
    pub algorithm: PollAlgorithmConfig,
    /// Bulkhead levels. Levels not listed are created with no reservation.
    #[serde(default = "default_bulkhead")]
    pub bulkhead: Vec<BulkheadLevelConfig>,
    /// How long a stopping scheduler waits for in-flight work, in milliseconds.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

fn default_shutdown_grace_ms() -> u64 { 30_000 }

fn default_bulkhead() -> Vec<BulkheadLevelConfig> {
    vec![
        BulkheadLevelConfig { level: 0, reservation: 8, overage: 2 },
        BulkheadLevelConfig { level: 1, reservation: 4, overage: 1 },
    ]
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            algorithm: PollAlgorithmConfig::default(),
            bulkhead: default_bulkhead(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

impl SchedulerConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Number of levels needed to hold every configured level.
    pub fn level_count(&self) -> usize {
        self.bulkhead.iter().map(|l| l.level + 1).max().unwrap_or(0)
    }

    /// Build the bulkhead described by this config.
    pub fn build_bulkhead(&self) -> Result<TaskSlotReservation, SchedulerError> {
        let bulkhead = TaskSlotReservation::new(self.level_count());
        for level in &self.bulkhead {
            bulkhead.bulk_head_reserve(level.level, level.reservation, level.overage)?;
        }
        Ok(bulkhead)
    }
}

/// Snapshot of the running scheduler.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatistics {
    pub scans: u64,
    pub grants: u64,
    pub polls: u64,
    pub poll_errors: u64,
    pub payloads_processed: u64,
    pub payloads_failed: u64,
    pub payloads_evicted: u64,
    /// Polled payloads admitted past their level's reservation plus overage.
    pub payloads_over_limit: u64,
    pub collections: Vec<CollectionStatistics>,
    pub bulkhead: BulkheadStatistics,
}
