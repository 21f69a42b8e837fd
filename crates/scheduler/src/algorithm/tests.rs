use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::metrics::{ClientMetrics, RateLimiter};

use super::{ListenerClientPollAlgorithm, MultipleClientPollSlotAllocation, PollAlgorithmConfig};

fn algorithm() -> MultipleClientPollSlotAllocation {
    MultipleClientPollSlotAllocation::new(PollAlgorithmConfig::default())
}

fn initialised(algo: &MultipleClientPollSlotAllocation) -> ClientMetrics {
    let m = ClientMetrics::new(1.0);
    algo.initialise_metrics(&m);
    m
}

/// Limiter whose adjustment the test can move.
struct FixedLimiter(AtomicU64);

impl FixedLimiter {
    fn new(adjustment: f64) -> Self {
        Self(AtomicU64::new(adjustment.to_bits()))
    }
}

impl RateLimiter for FixedLimiter {
    fn rate_limit_adjustment(&self) -> Option<f64> {
        Some(f64::from_bits(self.0.load(Ordering::Relaxed)))
    }
}

#[test]
fn config_defaults() {
    let config = PollAlgorithmConfig::default();
    assert_eq!(config.allowed_overage, 5);
    assert_eq!(config.priority_recalculate_frequency(), Duration::from_secs(600));
    assert_eq!(config.max_allowed_wait_between_polls(), Duration::from_secs(1));
    assert_eq!(config.fabric_poll_wait_min(), Duration::from_millis(100));
    assert_eq!(config.fabric_poll_wait_max(), Duration::from_secs(1));
    assert_eq!(config.capacity_percentage, 0.75);
    assert!(config.supports_past_due_scan);
}

#[test]
fn initialise_sets_starting_bounds() {
    let algo = algorithm();
    let m = initialised(&algo);
    assert_eq!(m.min_expected_poll_wait(), Duration::from_millis(100));
    assert_eq!(m.max_allowed_poll_wait(), Duration::from_secs(1));
    assert_eq!(m.capacity_percentage(), 0.75);
    assert_eq!(m.skip_count(), 0);
    assert_eq!(m.last_poll_tick(), None);
}

#[test]
fn slots_are_a_capacity_share_of_available() {
    let algo = algorithm();
    let m = initialised(&algo);
    assert_eq!(algo.calculate_slots(4, &m), 3);
    assert_eq!(m.last_reserved(), Some(3));
    assert_eq!(algo.calculate_slots(1, &m), 1);
    assert_eq!(algo.calculate_slots(100, &m), 75);
}

#[test]
fn nothing_available_grants_at_most_the_overage() {
    let algo = algorithm();
    for capacity in [0.0, 0.3, 0.75, 1.0] {
        for backlog in [None, Some(0), Some(3), Some(500)] {
            let m = initialised(&algo);
            m.set_capacity_percentage(capacity);
            if let Some(q) = backlog {
                m.set_priority(q, Some(q), 0);
            }
            let slots = algo.calculate_slots(0, &m);
            assert!(slots <= algo.allowed_overage(), "capacity {capacity} backlog {backlog:?} got {slots}");
        }
    }
}

#[test]
fn grant_never_exceeds_available_plus_overage() {
    let algo = algorithm();
    let m = initialised(&algo);
    m.set_capacity_percentage(1.0);
    m.set_priority(1_000, Some(1_000), 0);
    assert_eq!(algo.calculate_slots(10, &m), 15);
    assert_eq!(algo.calculate_slots(-3, &m), 2);
    assert_eq!(algo.calculate_slots(-10, &m), 0);
}

#[test]
fn full_capacity_bursts_only_as_far_as_the_backlog() {
    let algo = algorithm();
    let m = initialised(&algo);
    m.set_capacity_percentage(1.0);
    m.set_priority(12, Some(12), 0);
    assert_eq!(algo.calculate_slots(10, &m), 12);
}

#[test]
fn skip_consumes_one_count() {
    let algo = algorithm();
    let m = initialised(&algo);
    assert!(!algo.should_skip(&m));
    m.set_skip_count(2);
    assert!(algo.should_skip(&m));
    assert!(algo.should_skip(&m));
    assert!(!algo.should_skip(&m));
    assert_eq!(m.skip_count(), 0);
}

#[test]
fn capacity_stays_in_unit_interval() {
    let algo = algorithm();
    let m = initialised(&algo);

    for _ in 0..100 {
        algo.poll_metrics_recalculate(true, false, &m);
        algo.capacity_percentage_recalculate(&m);
        let c = m.capacity_percentage();
        assert!((0.0..=1.0).contains(&c), "capacity {c}");
    }
    assert_eq!(m.capacity_percentage(), 1.0);

    algo.capacity_reset(&m);
    for _ in 0..100 {
        algo.poll_metrics_recalculate(false, true, &m);
        algo.capacity_percentage_recalculate(&m);
        let c = m.capacity_percentage();
        assert!((0.0..=1.0).contains(&c), "capacity {c}");
    }
    assert!(m.capacity_percentage() < 0.75);
}

#[test]
fn rate_limiter_caps_capacity() {
    let algo = algorithm();
    let limiter = Arc::new(FixedLimiter::new(0.2));
    let m = ClientMetrics::new(1.0).with_rate_limiter(limiter.clone());
    algo.initialise_metrics(&m);

    algo.capacity_percentage_recalculate(&m);
    assert_eq!(m.capacity_percentage(), 0.2);

    limiter.0.store(1.0f64.to_bits(), Ordering::Relaxed);
    algo.capacity_percentage_recalculate(&m);
    assert!(m.capacity_percentage() >= 0.2);
    assert!(m.capacity_percentage() <= 1.0);
}

#[test]
fn capacity_reset_is_idempotent() {
    let algo = algorithm();
    let m = initialised(&algo);
    for _ in 0..7 {
        algo.poll_metrics_recalculate(true, false, &m);
    }
    algo.capacity_percentage_recalculate(&m);

    algo.capacity_reset(&m);
    let once = m.snapshot();
    algo.capacity_reset(&m);
    assert_eq!(m.snapshot(), once);
    assert_eq!(once.capacity_percentage, 0.75);
    assert_eq!(once.poll_attempted_batch, 0);
}

#[test]
fn priority_is_cached_within_the_window() {
    let algo = algorithm();
    let m = initialised(&algo);

    let first = algo.priority_recalculate(Some(10), &m, Some(1_000));
    let second = algo.priority_recalculate(Some(10), &m, Some(1_000));
    assert_eq!(first, 10);
    assert_eq!(first, second);

    // A new backlog inside the window does not move the cached score.
    assert_eq!(algo.priority_recalculate(Some(50), &m, Some(1_000 + 599_999)), 10);
    // Once the window has elapsed the score is recomputed.
    assert_eq!(algo.priority_recalculate(Some(50), &m, Some(1_000 + 600_000)), 50);
}

#[test]
fn priority_applies_weighting() {
    let algo = algorithm();
    let m = ClientMetrics::new(2.5);
    algo.initialise_metrics(&m);
    assert_eq!(algo.priority_recalculate(Some(4), &m, Some(0)), 10);
}

#[test]
fn malformed_queue_length_scores_zero() {
    let algo = algorithm();
    let m = initialised(&algo);
    assert_eq!(algo.priority_recalculate(Some(-7), &m, Some(0)), 0);
    assert_eq!(m.priority_queue_length(), Some(0));

    let m = initialised(&algo);
    assert_eq!(algo.priority_recalculate(None, &m, Some(0)), 0);
}

#[test]
fn errors_widen_the_reduce_ratio_and_skip() {
    let algo = algorithm();
    let m = initialised(&algo);
    let before = m.poll_time_reduce_ratio().unwrap();
    algo.poll_metrics_recalculate(false, true, &m);
    let after = m.poll_time_reduce_ratio().unwrap();
    assert!(after > before);
    assert!(after <= 1.0);
    assert_eq!(m.skip_count(), 2);
    assert_eq!(m.max_allowed_poll_wait(), Duration::from_secs(1));
}

#[test]
fn sustained_success_tightens_toward_min_wait() {
    let algo = algorithm();
    let m = initialised(&algo);
    for _ in 0..200 {
        algo.poll_metrics_recalculate(true, false, &m);
    }
    assert_eq!(m.max_allowed_poll_wait(), m.min_expected_poll_wait());
    assert!(m.poll_time_reduce_ratio().unwrap() < 0.01);
    assert_eq!(m.poll_success_rate(), 1.0);
}

#[test]
fn empty_polls_drift_back_to_the_fabric_max() {
    let algo = algorithm();
    let m = initialised(&algo);
    m.set_max_allowed_poll_wait(Duration::from_millis(200));
    for _ in 0..50 {
        algo.poll_metrics_recalculate(false, false, &m);
    }
    assert_eq!(m.max_allowed_poll_wait(), Duration::from_secs(1));
}

#[test]
fn past_due_after_max_wait() {
    let algo = algorithm();
    let m = initialised(&algo);
    assert!(!algo.past_due_calculate(&m, Some(10_000)), "never polled is not past due");

    m.set_last_poll_tick(Some(10_000));
    assert!(!algo.past_due_calculate(&m, Some(10_500)));
    assert!(!algo.past_due_calculate(&m, Some(11_000)));
    assert!(algo.past_due_calculate(&m, Some(12_000)));
}
