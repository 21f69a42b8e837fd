use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::info;

use crate::algorithm::{ListenerClientPollAlgorithm, MultipleClientPollSlotAllocation};
use crate::bulkhead::TaskSlotReservation;
use crate::client::{ListenerClient, PayloadHandler};
use crate::collection::{ClientPriorityCollection, ClientPriorityHolder};
use crate::error::SchedulerError;
use crate::types::{SchedulerConfig, SchedulerStatistics};

/// Counters shared with every poll and payload task.
#[derive(Debug, Default)]
pub(super) struct RunnerCounters {
    pub(super) scans: AtomicU64,
    pub(super) grants: AtomicU64,
    pub(super) polls: AtomicU64,
    pub(super) poll_errors: AtomicU64,
    pub(super) payloads_processed: AtomicU64,
    pub(super) payloads_failed: AtomicU64,
    pub(super) payloads_evicted: AtomicU64,
    pub(super) payloads_over_limit: AtomicU64,
}

/// Slots granted to polls that have not handed their payloads over yet, per
/// bulkhead level. Subtracted from the level's budget on the next scan.
#[derive(Debug)]
pub(super) struct PendingGrants {
    levels: Vec<AtomicI64>,
}

impl PendingGrants {
    pub(super) fn new(levels: usize) -> Self {
        Self {
            levels: (0..levels).map(|_| AtomicI64::new(0)).collect(),
        }
    }

    pub(super) fn get(&self, level: usize) -> i64 {
        self.levels.get(level).map_or(0, |p| p.load(Ordering::Acquire))
    }

    pub(super) fn add(&self, level: usize, slots: u32) {
        if let Some(p) = self.levels.get(level) {
            p.fetch_add(i64::from(slots), Ordering::AcqRel);
        }
    }

    pub(super) fn release(&self, level: usize, slots: u32) {
        if let Some(p) = self.levels.get(level) {
            p.fetch_sub(i64::from(slots), Ordering::AcqRel);
        }
    }
}

/// The poll scheduler. Owns one [`ClientPriorityCollection`] per channel and
/// the shared bulkhead, and hands admitted payloads to a [`PayloadHandler`].
pub struct Scheduler {
    pub(super) config: SchedulerConfig,
    pub(super) algorithm: Arc<dyn ListenerClientPollAlgorithm>,
    /// One collection per channel, in registration order.
    pub(super) collections: RwLock<Vec<Arc<ClientPriorityCollection>>>,
    pub(super) bulkhead: Arc<TaskSlotReservation>,
    pub(super) handler: Arc<dyn PayloadHandler>,
    pub(super) counters: Arc<RunnerCounters>,
    pub(super) pending: Arc<PendingGrants>,
}

impl Scheduler {
    /// Create a scheduler using the default weighted fair queueing algorithm.
    pub fn new(config: SchedulerConfig, handler: Arc<dyn PayloadHandler>) -> Result<Self, SchedulerError> {
        let algorithm = Arc::new(MultipleClientPollSlotAllocation::new(config.algorithm.clone()));
        Self::with_algorithm(config, algorithm, handler)
    }

    pub fn with_algorithm(
        config: SchedulerConfig,
        algorithm: Arc<dyn ListenerClientPollAlgorithm>,
        handler: Arc<dyn PayloadHandler>,
    ) -> Result<Self, SchedulerError> {
        let bulkhead = Arc::new(config.build_bulkhead()?);
        let pending = Arc::new(PendingGrants::new(bulkhead.level_count()));
        info!(
            algorithm = algorithm.name(),
            levels = bulkhead.level_count(),
            "scheduler created"
        );
        Ok(Self {
            config,
            algorithm,
            collections: RwLock::new(Vec::new()),
            bulkhead,
            handler,
            counters: Arc::new(RunnerCounters::default()),
            pending,
        })
    }

    /// Register a client in the collection of its channel, creating the
    /// collection on first use. The client's partition priority selects its
    /// bulkhead level, which must exist.
    pub fn register_client(&self, client: Arc<dyn ListenerClient>) -> Result<Arc<ClientPriorityHolder>, SchedulerError> {
        let level = client.partition().priority;
        self.bulkhead.level(level)?;

        let collection = {
            let mut collections = self.collections.write().unwrap_or_else(PoisonError::into_inner);
            match collections.iter().find(|c| c.channel_id() == client.channel_id()) {
                Some(existing) => Arc::clone(existing),
                None => {
                    let created = Arc::new(ClientPriorityCollection::new(
                        client.channel_id(),
                        Arc::clone(&self.algorithm),
                    ));
                    info!(channel = client.channel_id(), "channel collection created");
                    collections.push(Arc::clone(&created));
                    created
                }
            }
        };
        collection.register(client)
    }

    /// Remove a client from whichever collection holds it.
    pub fn remove_client(&self, client_id: &str) -> bool {
        self.collections().iter().any(|c| c.remove(client_id))
    }

    pub fn collections(&self) -> Vec<Arc<ClientPriorityCollection>> {
        self.collections.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn collection(&self, channel_id: &str) -> Option<Arc<ClientPriorityCollection>> {
        self.collections().into_iter().find(|c| c.channel_id() == channel_id)
    }

    pub fn bulkhead(&self) -> &Arc<TaskSlotReservation> {
        &self.bulkhead
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn statistics(&self) -> SchedulerStatistics {
        let c = &self.counters;
        SchedulerStatistics {
            scans: c.scans.load(Ordering::Relaxed),
            grants: c.grants.load(Ordering::Relaxed),
            polls: c.polls.load(Ordering::Relaxed),
            poll_errors: c.poll_errors.load(Ordering::Relaxed),
            payloads_processed: c.payloads_processed.load(Ordering::Relaxed),
            payloads_failed: c.payloads_failed.load(Ordering::Relaxed),
            payloads_evicted: c.payloads_evicted.load(Ordering::Relaxed),
            payloads_over_limit: c.payloads_over_limit.load(Ordering::Relaxed),
            collections: self.collections().iter().map(|c| c.statistics()).collect(),
            bulkhead: self.bulkhead.statistics(),
        }
    }
}
