use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::atomic::{AtomicF64, AtomicOptionF64, AtomicOptionI64, AtomicOptionU64};

/// External throttle signal, read by the algorithm when a partition supports
/// rate limiting.
pub trait RateLimiter: Send + Sync {
    /// Fraction of normal capacity currently allowed, in `[0, 1]`.
    /// `None` means no limit is in force.
    fn rate_limit_adjustment(&self) -> Option<f64>;
}

/// Per-client scheduling state.
///
/// Written by a single scheduling loop, read concurrently by statistics
/// consumers. Every field is an atomic so readers never take a lock.
pub struct ClientMetrics {
    capacity_percentage: AtomicF64,
    last_poll_tick: AtomicOptionU64,
    last_reserved: AtomicOptionU64,
    max_allowed_poll_wait_ms: AtomicU64,
    min_expected_poll_wait_ms: AtomicU64,
    poll_achieved_batch: AtomicU64,
    poll_attempted_batch: AtomicU64,
    poll_errors: AtomicU64,
    poll_time_reduce_ratio: AtomicOptionF64,
    priority_calculated: AtomicOptionI64,
    priority_queue_length: AtomicOptionI64,
    priority_tick: AtomicOptionU64,
    priority_weighting: f64,
    skip_count: AtomicU32,
    rate_limiter: Option<Arc<dyn RateLimiter>>,
}

impl ClientMetrics {
    /// Fresh metrics for a client whose partition uses `priority_weighting`.
    ///
    /// The algorithm's `initialise_metrics` sets the real starting values.
    pub fn new(priority_weighting: f64) -> Self {
        Self {
            capacity_percentage: AtomicF64::new(0.0),
            last_poll_tick: AtomicOptionU64::new(None),
            last_reserved: AtomicOptionU64::new(None),
            max_allowed_poll_wait_ms: AtomicU64::new(0),
            min_expected_poll_wait_ms: AtomicU64::new(0),
            poll_achieved_batch: AtomicU64::new(0),
            poll_attempted_batch: AtomicU64::new(0),
            poll_errors: AtomicU64::new(0),
            poll_time_reduce_ratio: AtomicOptionF64::new(None),
            priority_calculated: AtomicOptionI64::new(None),
            priority_queue_length: AtomicOptionI64::new(None),
            priority_tick: AtomicOptionU64::new(None),
            priority_weighting,
            skip_count: AtomicU32::new(0),
            rate_limiter: None,
        }
    }

    pub fn with_rate_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    // ── Capacity ─────────────────────────────────────────────────

    pub fn capacity_percentage(&self) -> f64 {
        self.capacity_percentage.load()
    }

    /// Stores the capacity clamped to `[0, 1]`.
    pub fn set_capacity_percentage(&self, value: f64) {
        let value = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };
        self.capacity_percentage.store(value);
    }

    pub fn rate_limiter(&self) -> Option<&Arc<dyn RateLimiter>> {
        self.rate_limiter.as_ref()
    }

    // ── Poll timing ──────────────────────────────────────────────

    pub fn last_poll_tick(&self) -> Option<u64> {
        self.last_poll_tick.load()
    }

    pub fn set_last_poll_tick(&self, tick: Option<u64>) {
        self.last_poll_tick.store(tick);
    }

    pub fn last_reserved(&self) -> Option<u64> {
        self.last_reserved.load()
    }

    pub fn set_last_reserved(&self, slots: Option<u64>) {
        self.last_reserved.store(slots);
    }

    pub fn max_allowed_poll_wait(&self) -> Duration {
        Duration::from_millis(self.max_allowed_poll_wait_ms.load(Ordering::Acquire))
    }

    pub fn set_max_allowed_poll_wait(&self, wait: Duration) {
        self.max_allowed_poll_wait_ms
            .store(wait.as_millis() as u64, Ordering::Release);
    }

    pub fn min_expected_poll_wait(&self) -> Duration {
        Duration::from_millis(self.min_expected_poll_wait_ms.load(Ordering::Acquire))
    }

    pub fn set_min_expected_poll_wait(&self, wait: Duration) {
        self.min_expected_poll_wait_ms
            .store(wait.as_millis() as u64, Ordering::Release);
    }

    pub fn poll_time_reduce_ratio(&self) -> Option<f64> {
        self.poll_time_reduce_ratio.load()
    }

    /// Stores the ratio clamped to `[0, 1]`.
    pub fn set_poll_time_reduce_ratio(&self, ratio: Option<f64>) {
        self.poll_time_reduce_ratio
            .store(ratio.filter(|r| !r.is_nan()).map(|r| r.clamp(0.0, 1.0)));
    }

    /// Wait before this client should poll again: the ratio interpolates
    /// between the minimum and maximum wait.
    pub fn next_poll_wait(&self) -> Duration {
        let min = self.min_expected_poll_wait();
        let max = self.max_allowed_poll_wait().max(min);
        let ratio = self.poll_time_reduce_ratio().unwrap_or(1.0);
        min + (max - min).mul_f64(ratio)
    }

    // ── Poll outcomes ────────────────────────────────────────────

    pub fn poll_achieved_batch(&self) -> u64 {
        self.poll_achieved_batch.load(Ordering::Acquire)
    }

    pub fn poll_attempted_batch(&self) -> u64 {
        self.poll_attempted_batch.load(Ordering::Acquire)
    }

    pub fn poll_errors(&self) -> u64 {
        self.poll_errors.load(Ordering::Acquire)
    }

    /// Record one completed poll.
    pub fn record_poll(&self, achieved: bool, errored: bool) {
        self.poll_attempted_batch.fetch_add(1, Ordering::AcqRel);
        if achieved {
            self.poll_achieved_batch.fetch_add(1, Ordering::AcqRel);
        }
        if errored {
            self.poll_errors.fetch_add(1, Ordering::AcqRel);
        }
    }

    /// Zero the achieved/attempted counters.
    pub fn reset_poll_batches(&self) {
        self.poll_achieved_batch.store(0, Ordering::Release);
        self.poll_attempted_batch.store(0, Ordering::Release);
    }

    /// `achieved / attempted`, 0 when nothing has been attempted.
    pub fn poll_success_rate(&self) -> f64 {
        let attempted = self.poll_attempted_batch();
        if attempted == 0 {
            return 0.0;
        }
        (self.poll_achieved_batch() as f64 / attempted as f64).clamp(0.0, 1.0)
    }

    // ── Priority ─────────────────────────────────────────────────

    pub fn priority_calculated(&self) -> Option<i64> {
        self.priority_calculated.load()
    }

    pub fn priority_queue_length(&self) -> Option<i64> {
        self.priority_queue_length.load()
    }

    pub fn priority_tick(&self) -> Option<u64> {
        self.priority_tick.load()
    }

    pub fn set_priority(&self, score: i64, queue_length: Option<i64>, tick: u64) {
        self.priority_calculated.store(Some(score));
        self.priority_queue_length.store(queue_length);
        self.priority_tick.store(Some(tick));
    }

    /// Forget the cached priority so the next recalculation runs.
    pub fn clear_priority(&self) {
        self.priority_calculated.store(None);
        self.priority_tick.store(None);
    }

    pub fn priority_weighting(&self) -> f64 {
        self.priority_weighting
    }

    // ── Skip counter ─────────────────────────────────────────────

    pub fn skip_count(&self) -> u32 {
        self.skip_count.load(Ordering::Acquire)
    }

    pub fn set_skip_count(&self, count: u32) {
        self.skip_count.store(count, Ordering::Release);
    }

    /// Decrement the skip counter. Returns `false` (and changes nothing) when
    /// it is already zero.
    pub fn skip_count_decrement(&self) -> bool {
        self.skip_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| c.checked_sub(1))
            .is_ok()
    }

    /// Point-in-time copy for statistics.
    pub fn snapshot(&self) -> ClientMetricsSnapshot {
        ClientMetricsSnapshot {
            capacity_percentage: self.capacity_percentage(),
            last_poll_tick: self.last_poll_tick(),
            last_reserved: self.last_reserved(),
            max_allowed_poll_wait_ms: self.max_allowed_poll_wait().as_millis() as u64,
            min_expected_poll_wait_ms: self.min_expected_poll_wait().as_millis() as u64,
            next_poll_wait_ms: self.next_poll_wait().as_millis() as u64,
            poll_achieved_batch: self.poll_achieved_batch(),
            poll_attempted_batch: self.poll_attempted_batch(),
            poll_errors: self.poll_errors(),
            poll_success_rate: self.poll_success_rate(),
            poll_time_reduce_ratio: self.poll_time_reduce_ratio(),
            priority_calculated: self.priority_calculated(),
            priority_queue_length: self.priority_queue_length(),
            priority_weighting: self.priority_weighting,
            skip_count: self.skip_count(),
        }
    }
}

impl fmt::Debug for ClientMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientMetrics")
            .field("snapshot", &self.snapshot())
            .field("rate_limited", &self.rate_limiter.is_some())
            .finish()
    }
}

/// Serializable copy of [`ClientMetrics`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientMetricsSnapshot {
    pub capacity_percentage: f64,
    pub last_poll_tick: Option<u64>,
    pub last_reserved: Option<u64>,
    pub max_allowed_poll_wait_ms: u64,
    pub min_expected_poll_wait_ms: u64,
    pub next_poll_wait_ms: u64,
    pub poll_achieved_batch: u64,
    pub poll_attempted_batch: u64,
    pub poll_errors: u64,
    pub poll_success_rate: f64,
    pub poll_time_reduce_ratio: Option<f64>,
    pub priority_calculated: Option<i64>,
    pub priority_queue_length: Option<i64>,
    pub priority_weighting: f64,
    pub skip_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_is_clamped() {
        let m = ClientMetrics::new(1.0);
        m.set_capacity_percentage(1.7);
        assert_eq!(m.capacity_percentage(), 1.0);
        m.set_capacity_percentage(-0.2);
        assert_eq!(m.capacity_percentage(), 0.0);
        m.set_capacity_percentage(f64::NAN);
        assert_eq!(m.capacity_percentage(), 0.0);
    }

    #[test]
    fn success_rate_follows_counters() {
        let m = ClientMetrics::new(1.0);
        assert_eq!(m.poll_success_rate(), 0.0);
        m.record_poll(true, false);
        m.record_poll(false, false);
        m.record_poll(true, false);
        m.record_poll(false, true);
        assert_eq!(m.poll_attempted_batch(), 4);
        assert_eq!(m.poll_achieved_batch(), 2);
        assert_eq!(m.poll_errors(), 1);
        assert_eq!(m.poll_success_rate(), 0.5);
    }

    #[test]
    fn skip_count_never_goes_negative() {
        let m = ClientMetrics::new(1.0);
        assert!(!m.skip_count_decrement());
        m.set_skip_count(2);
        assert!(m.skip_count_decrement());
        assert!(m.skip_count_decrement());
        assert!(!m.skip_count_decrement());
        assert_eq!(m.skip_count(), 0);
    }

    #[test]
    fn next_poll_wait_interpolates() {
        let m = ClientMetrics::new(1.0);
        m.set_min_expected_poll_wait(Duration::from_millis(100));
        m.set_max_allowed_poll_wait(Duration::from_millis(1100));
        m.set_poll_time_reduce_ratio(Some(0.5));
        assert_eq!(m.next_poll_wait(), Duration::from_millis(600));
        m.set_poll_time_reduce_ratio(Some(0.0));
        assert_eq!(m.next_poll_wait(), Duration::from_millis(100));
        m.set_poll_time_reduce_ratio(None);
        assert_eq!(m.next_poll_wait(), Duration::from_millis(1100));
    }

    #[test]
    fn reduce_ratio_is_clamped() {
        let m = ClientMetrics::new(1.0);
        m.set_poll_time_reduce_ratio(Some(3.0));
        assert_eq!(m.poll_time_reduce_ratio(), Some(1.0));
    }
}
