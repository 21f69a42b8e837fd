//! Per-priority concurrency reservation.
//!
//! Each level is guaranteed `bulkhead_reservation` concurrent slots and may
//! run up to `overage` more. Admission is optimistic: `increment` never
//! blocks, and exhaustion shows up as `available() == 0` rather than an error.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::SchedulerError;

/// Slot accounting for one priority level.
#[derive(Debug)]
pub struct TaskManagerPrioritySettings {
    level: usize,
    bulkhead_reservation: AtomicI64,
    overage: AtomicI64,
    active: AtomicI64,
    count: AtomicU64,
    killed: AtomicU64,
    underflows: AtomicU64,
}

impl TaskManagerPrioritySettings {
    pub fn new(level: usize) -> Self {
        Self {
            level,
            bulkhead_reservation: AtomicI64::new(0),
            overage: AtomicI64::new(0),
            active: AtomicI64::new(0),
            count: AtomicU64::new(0),
            killed: AtomicU64::new(0),
            underflows: AtomicU64::new(0),
        }
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn bulk_head_reserve(&self, slot_count: u32, overage: u32) {
        self.bulkhead_reservation
            .store(i64::from(slot_count), Ordering::Release);
        self.overage.store(i64::from(overage), Ordering::Release);
    }

    pub fn bulkhead_reservation(&self) -> i64 {
        self.bulkhead_reservation.load(Ordering::Acquire)
    }

    pub fn overage(&self) -> i64 {
        self.overage.load(Ordering::Acquire)
    }

    pub fn active(&self) -> i64 {
        self.active.load(Ordering::Acquire)
    }

    /// Total admissions since start.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }

    /// Tasks evicted before completing.
    pub fn killed(&self) -> u64 {
        self.killed.load(Ordering::Acquire)
    }

    pub fn underflows(&self) -> u64 {
        self.underflows.load(Ordering::Acquire)
    }

    /// Reserved slots not in use, never negative.
    pub fn available(&self) -> i64 {
        (self.bulkhead_reservation() - self.active()).max(0)
    }

    /// Slots left before the reservation plus overage is reached.
    pub fn headroom(&self) -> i64 {
        (self.bulkhead_reservation() + self.overage() - self.active()).max(0)
    }

    /// Whether one more task fits within the reservation plus overage.
    pub fn can_admit(&self) -> bool {
        self.active() < self.bulkhead_reservation() + self.overage()
    }

    /// Take a slot unconditionally. Returns the new active count.
    pub fn increment(&self) -> i64 {
        self.count.fetch_add(1, Ordering::AcqRel);
        self.active.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Take a slot if one fits within the reservation plus overage.
    pub fn try_increment(&self) -> bool {
        let limit = self.bulkhead_reservation() + self.overage();
        let admitted = self
            .active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |active| {
                (active < limit).then_some(active + 1)
            })
            .is_ok();
        if admitted {
            self.count.fetch_add(1, Ordering::AcqRel);
        }
        admitted
    }

    /// Release a slot; `force` records an eviction.
    ///
    /// Releasing with nothing active is a double-release bug: it is logged,
    /// counted and returned as an error, and `active` stays at zero.
    pub fn decrement(&self, force: bool) -> Result<i64, SchedulerError> {
        match self
            .active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |active| {
                (active > 0).then_some(active - 1)
            }) {
            Ok(previous) => {
                if force {
                    self.killed.fetch_add(1, Ordering::AcqRel);
                }
                Ok(previous - 1)
            }
            Err(_) => {
                self.underflows.fetch_add(1, Ordering::AcqRel);
                error!(level = self.level, force, "bulkhead decrement with no active slot");
                Err(SchedulerError::BulkheadUnderflow { level: self.level })
            }
        }
    }

    /// Zero every counter.
    pub fn reset(&self) {
        self.active.store(0, Ordering::Release);
        self.count.store(0, Ordering::Release);
        self.killed.store(0, Ordering::Release);
        self.underflows.store(0, Ordering::Release);
    }

    pub fn statistics(&self) -> LevelStatistics {
        LevelStatistics {
            level: self.level,
            bulkhead_reservation: self.bulkhead_reservation(),
            overage: self.overage(),
            active: self.active(),
            available: self.available(),
            count: self.count(),
            killed: self.killed(),
            underflows: self.underflows(),
        }
    }
}

/// Serializable snapshot of one level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LevelStatistics {
    pub level: usize,
    pub bulkhead_reservation: i64,
    pub overage: i64,
    pub active: i64,
    pub available: i64,
    pub count: u64,
    pub killed: u64,
    pub underflows: u64,
}

/// Serializable snapshot of the whole bulkhead.
#[derive(Debug, Clone, Serialize)]
pub struct BulkheadStatistics {
    pub levels: Vec<LevelStatistics>,
    pub available: i64,
    pub active: i64,
}

/// The bulkhead: one [`TaskManagerPrioritySettings`] per priority level.
///
/// Level 0 is the highest priority by convention. Counters are shared by
/// every worker completion, so all of them are atomics.
#[derive(Debug)]
pub struct TaskSlotReservation {
    levels: Vec<TaskManagerPrioritySettings>,
}

impl TaskSlotReservation {
    /// A bulkhead with `levels` priority levels, none reserved yet.
    pub fn new(levels: usize) -> Self {
        Self {
            levels: (0..levels).map(TaskManagerPrioritySettings::new).collect(),
        }
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn level(&self, level: usize) -> Result<&TaskManagerPrioritySettings, SchedulerError> {
        self.levels
            .get(level)
            .ok_or(SchedulerError::UnknownPriorityLevel(level))
    }

    /// Guarantee `slot_count` slots to `level`, plus `overage` beyond that.
    pub fn bulk_head_reserve(&self, level: usize, slot_count: u32, overage: u32) -> Result<(), SchedulerError> {
        self.level(level)?.bulk_head_reserve(slot_count, overage);
        info!(level, slot_count, overage, "bulkhead level reserved");
        Ok(())
    }

    /// Advisory admission: callers check [`available`](Self::available) (or
    /// accept running in the overage) before calling.
    pub fn increment(&self, level: usize) -> Result<i64, SchedulerError> {
        let active = self.level(level)?.increment();
        debug!(level, active, "bulkhead slot taken");
        Ok(active)
    }

    /// Checked admission against reservation plus overage.
    pub fn try_reserve(&self, level: usize) -> Result<bool, SchedulerError> {
        let settings = self.level(level)?;
        let admitted = settings.try_increment();
        if !admitted {
            debug!(level, active = settings.active(), "bulkhead level full");
        }
        Ok(admitted)
    }

    pub fn decrement(&self, level: usize, force: bool) -> Result<i64, SchedulerError> {
        let active = self.level(level)?.decrement(force)?;
        if force {
            warn!(level, active, "bulkhead slot released by eviction");
        }
        Ok(active)
    }

    pub fn available(&self, level: usize) -> Result<i64, SchedulerError> {
        Ok(self.level(level)?.available())
    }

    pub fn headroom(&self, level: usize) -> Result<i64, SchedulerError> {
        Ok(self.level(level)?.headroom())
    }

    /// Sum of the reserved slots not in use across all levels.
    pub fn available_total(&self) -> i64 {
        self.levels.iter().map(|l| l.available()).sum()
    }

    pub fn active_total(&self) -> i64 {
        self.levels.iter().map(|l| l.active()).sum()
    }

    /// Zero the counters of every level. Used on service stop.
    pub fn reset(&self) {
        for level in &self.levels {
            level.reset();
        }
    }

    pub fn statistics(&self) -> BulkheadStatistics {
        BulkheadStatistics {
            levels: self.levels.iter().map(|l| l.statistics()).collect(),
            available: self.available_total(),
            active: self.active_total(),
        }
    }
}
