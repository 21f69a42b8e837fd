use std::time::Duration;

use tracing::warn;

use crate::clock;
use crate::metrics::ClientMetrics;

use super::{ListenerClientPollAlgorithm, PollAlgorithmConfig};

/// Capacity change per recalculation.
const CAPACITY_STEP: f64 = 0.05;
/// Capacity never drops below this unless a rate limiter demands it.
const CAPACITY_FLOOR: f64 = 0.1;
/// Polls needed before the success rate moves capacity.
const MIN_POLL_SAMPLE: u64 = 5;
/// Success rate at or above which capacity grows.
const HIGH_SUCCESS_RATE: f64 = 0.75;
/// Success rate at or below which capacity shrinks.
const LOW_SUCCESS_RATE: f64 = 0.25;
/// Scans an errored client sits out.
const ERROR_SKIP_COUNT: u32 = 2;
/// Polls needed before sustained success tightens the wait bound.
const SUSTAINED_SAMPLE: u64 = 10;
const SUSTAINED_SUCCESS_RATE: f64 = 0.9;
/// Multiplier on the max wait when sustained success tightens it.
const WAIT_TIGHTEN_FACTOR: f64 = 0.9;
/// Multiplier on the max wait when empty polls let it drift back out.
const WAIT_WIDEN_FACTOR: f64 = 1.1;
/// Reduce-ratio multiplier after a poll that returned work.
const RATIO_SUCCESS_FACTOR: f64 = 0.5;
/// Share of the distance to 1 the ratio moves after an empty poll.
const RATIO_EMPTY_WIDEN: f64 = 0.25;
/// Share of the distance to 1 the ratio moves after a failed poll.
const RATIO_ERROR_WIDEN: f64 = 0.5;
/// Reduce ratio of a newly initialised client.
const INITIAL_REDUCE_RATIO: f64 = 0.5;

/// Weighted fair queueing across the clients of a channel.
///
/// A client's priority is its backlog times its partition weighting; its slot
/// grant is a share of what is available proportional to its capacity
/// fraction. A client running at full capacity may burst into the allowed
/// overage to drain a backlog.
#[derive(Debug, Clone, Default)]
pub struct MultipleClientPollSlotAllocation {
    config: PollAlgorithmConfig,
}

impl MultipleClientPollSlotAllocation {
    pub fn new(config: PollAlgorithmConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PollAlgorithmConfig {
        &self.config
    }
}

impl ListenerClientPollAlgorithm for MultipleClientPollSlotAllocation {
    fn name(&self) -> &str {
        "multiple-client-poll-slot-allocation"
    }

    fn allowed_overage(&self) -> u32 {
        self.config.allowed_overage
    }

    fn priority_recalculate_frequency(&self) -> Duration {
        self.config.priority_recalculate_frequency()
    }

    fn max_allowed_wait_between_polls(&self) -> Duration {
        self.config.max_allowed_wait_between_polls()
    }

    fn min_expected_wait_between_polls(&self) -> Duration {
        self.config.min_expected_wait_between_polls()
    }

    fn supports_past_due_scan(&self) -> bool {
        self.config.supports_past_due_scan
    }

    fn calculate_slots(&self, available: i64, metrics: &ClientMetrics) -> u32 {
        let overage = i64::from(self.config.allowed_overage);
        let limit = available.saturating_add(overage).max(0);
        let open = available.max(0);
        let capacity = metrics.capacity_percentage();

        let mut slots = (open as f64 * capacity).round() as i64;
        if slots == 0 && open > 0 && capacity > 0.0 {
            slots = 1;
        }

        if capacity >= 1.0 {
            let backlog = metrics.priority_queue_length().unwrap_or(0);
            if backlog > slots {
                slots = backlog;
            }
        }

        let slots = slots.clamp(0, limit) as u32;
        metrics.set_last_reserved(Some(u64::from(slots)));
        slots
    }

    fn should_skip(&self, metrics: &ClientMetrics) -> bool {
        metrics.skip_count_decrement()
    }

    fn capacity_percentage_recalculate(&self, metrics: &ClientMetrics) {
        let mut capacity = metrics.capacity_percentage();

        if metrics.poll_attempted_batch() >= MIN_POLL_SAMPLE {
            let rate = metrics.poll_success_rate();
            if rate >= HIGH_SUCCESS_RATE {
                capacity += CAPACITY_STEP;
            } else if rate <= LOW_SUCCESS_RATE {
                capacity -= CAPACITY_STEP;
            }
        }
        capacity = capacity.clamp(CAPACITY_FLOOR, 1.0);

        if let Some(adjustment) = metrics
            .rate_limiter()
            .and_then(|limiter| limiter.rate_limit_adjustment())
        {
            let adjustment = if adjustment.is_nan() { 1.0 } else { adjustment.clamp(0.0, 1.0) };
            capacity = capacity.min(adjustment);
        }

        metrics.set_capacity_percentage(capacity);
    }

    fn capacity_reset(&self, metrics: &ClientMetrics) {
        metrics.set_capacity_percentage(self.config.capacity_percentage);
        metrics.reset_poll_batches();
    }

    fn priority_recalculate(
        &self,
        queue_length: Option<i64>,
        metrics: &ClientMetrics,
        timestamp: Option<u64>,
    ) -> i64 {
        let now = clock::resolve(timestamp);
        let frequency = self.config.priority_recalculate_frequency().as_millis() as u64;

        if let (Some(score), Some(tick)) = (metrics.priority_calculated(), metrics.priority_tick()) {
            if now >= tick && now - tick < frequency {
                return score;
            }
        }

        let queue = match queue_length {
            Some(q) if q < 0 => {
                warn!(queue_length = q, "negative queue length treated as empty");
                0
            }
            Some(q) => q,
            None => 0,
        };

        let score = (queue as f64 * metrics.priority_weighting()).round() as i64;
        metrics.set_priority(score, Some(queue), now);
        score
    }

    fn poll_metrics_recalculate(&self, success: bool, has_errored: bool, metrics: &ClientMetrics) {
        metrics.record_poll(success, has_errored);

        let ratio = metrics.poll_time_reduce_ratio().unwrap_or(1.0);
        let ratio = if has_errored {
            metrics.set_skip_count(ERROR_SKIP_COUNT);
            ratio + (1.0 - ratio) * RATIO_ERROR_WIDEN
        } else if success {
            ratio * RATIO_SUCCESS_FACTOR
        } else {
            ratio + (1.0 - ratio) * RATIO_EMPTY_WIDEN
        };
        metrics.set_poll_time_reduce_ratio(Some(ratio));

        let fabric_max = self.config.fabric_poll_wait_max();
        let min = metrics.min_expected_poll_wait();
        let max = metrics.max_allowed_poll_wait();

        let next_max = if has_errored {
            fabric_max
        } else if metrics.poll_attempted_batch() >= SUSTAINED_SAMPLE
            && metrics.poll_success_rate() >= SUSTAINED_SUCCESS_RATE
        {
            max.mul_f64(WAIT_TIGHTEN_FACTOR)
        } else if !success {
            max.mul_f64(WAIT_WIDEN_FACTOR).min(fabric_max)
        } else {
            max
        };
        metrics.set_max_allowed_poll_wait(next_max.max(min));
    }

    fn initialise_metrics(&self, metrics: &ClientMetrics) {
        metrics.set_min_expected_poll_wait(self.config.fabric_poll_wait_min());
        metrics.set_max_allowed_poll_wait(self.config.fabric_poll_wait_max());
        metrics.set_capacity_percentage(self.config.capacity_percentage);
        metrics.set_poll_time_reduce_ratio(Some(INITIAL_REDUCE_RATIO));
        metrics.set_skip_count(0);
        metrics.set_last_poll_tick(None);
        metrics.set_last_reserved(None);
        metrics.clear_priority();
        metrics.reset_poll_batches();
    }

    fn past_due_calculate(&self, metrics: &ClientMetrics, timestamp: Option<u64>) -> bool {
        let Some(last) = metrics.last_poll_tick() else {
            return false;
        };
        let now = clock::resolve(timestamp);
        let bound = self.config.max_allowed_wait_between_polls().as_millis() as u64;
        now.saturating_sub(last) > bound
    }
}
