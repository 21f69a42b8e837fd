use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SchedulerError;

/// Immutable settings of one priority partition of a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityPartitionConfig {
    /// Partition priority. Also selects the bulkhead level its payloads run on.
    pub priority: usize,
    /// Multiplier applied to the queue length when scoring clients.
    #[serde(default = "default_weighting")]
    pub priority_weighting: f64,
    /// Whether an external rate limiter may throttle this partition.
    /// Defaults to true for priority 0 only.
    #[serde(default)]
    pub supports_rate_limiting: Option<bool>,
    /// Maximum time a payload may run before it is evicted, in milliseconds.
    #[serde(default = "default_payload_max_processing_ms")]
    pub payload_max_processing_ms: u64,
}

fn default_weighting() -> f64 { 1.0 }
fn default_payload_max_processing_ms() -> u64 { 4 * 60 * 1000 }

impl PriorityPartitionConfig {
    /// A partition with default weighting and processing limits.
    pub fn new(priority: usize) -> Self {
        Self {
            priority,
            priority_weighting: default_weighting(),
            supports_rate_limiting: None,
            payload_max_processing_ms: default_payload_max_processing_ms(),
        }
    }

    /// Override the weighting. Fails when the weighting is not strictly positive.
    pub fn with_weighting(mut self, weighting: f64) -> Result<Self, SchedulerError> {
        self.priority_weighting = weighting;
        self.validate()?;
        Ok(self)
    }

    pub fn with_rate_limiting(mut self, enabled: bool) -> Self {
        self.supports_rate_limiting = Some(enabled);
        self
    }

    pub fn with_payload_max_processing_time(mut self, limit: Duration) -> Self {
        self.payload_max_processing_ms = limit.as_millis() as u64;
        self
    }

    pub fn supports_rate_limiting(&self) -> bool {
        self.supports_rate_limiting.unwrap_or(self.priority == 0)
    }

    pub fn payload_max_processing_time(&self) -> Duration {
        Duration::from_millis(self.payload_max_processing_ms)
    }

    pub fn validate(&self) -> Result<(), SchedulerError> {
        if !self.priority_weighting.is_finite() || self.priority_weighting <= 0.0 {
            return Err(SchedulerError::InvalidPartition(format!(
                "priority {} weighting must be > 0, got {}",
                self.priority, self.priority_weighting
            )));
        }
        if self.payload_max_processing_ms == 0 {
            return Err(SchedulerError::InvalidPartition(format!(
                "priority {} payload max processing time must be > 0",
                self.priority
            )));
        }
        Ok(())
    }
}
