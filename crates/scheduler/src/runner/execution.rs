use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::algorithm::ListenerClientPollAlgorithm;
use crate::bulkhead::TaskSlotReservation;
use crate::client::{Payload, PayloadHandler};
use crate::clock;
use crate::collection::{ClientPriorityHolder, ScanBudget, SlotGrant};

use super::core::{PendingGrants, RunnerCounters, Scheduler};

/// Interval at which a stopping scheduler checks for drained work.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Everything a spawned poll or payload task needs.
#[derive(Clone)]
struct PollContext {
    algorithm: Arc<dyn ListenerClientPollAlgorithm>,
    bulkhead: Arc<TaskSlotReservation>,
    handler: Arc<dyn PayloadHandler>,
    counters: Arc<RunnerCounters>,
    pending: Arc<PendingGrants>,
}

impl Scheduler {
    /// Run one scan cycle across every collection and start a poll task per
    /// grant. Returns the number of polls started.
    ///
    /// Every grant is charged to the bulkhead level of its client, and
    /// collections share one budget: slots granted to one channel are
    /// subtracted before the next channel is scanned.
    pub fn scan_once(&self, timestamp: Option<u64>) -> usize {
        self.counters.scans.fetch_add(1, Ordering::Relaxed);
        let mut budget = self.scan_budget();
        let mut started = 0;

        for collection in self.collections() {
            let grants = collection.scan_within(&mut budget, timestamp);
            let ctx = PollContext {
                algorithm: Arc::clone(collection.algorithm()),
                bulkhead: Arc::clone(&self.bulkhead),
                handler: Arc::clone(&self.handler),
                counters: Arc::clone(&self.counters),
                pending: Arc::clone(&self.pending),
            };
            for grant in grants {
                self.counters.grants.fetch_add(1, Ordering::Relaxed);
                if start_poll(grant, ctx.clone(), timestamp) {
                    started += 1;
                }
            }
        }

        started
    }

    /// Free reserved slots and headroom of every level, less the slots still
    /// promised to polls in flight.
    fn scan_budget(&self) -> ScanBudget {
        ScanBudget::per_level((0..self.bulkhead.level_count()).map(|level| {
            let pending = self.pending.get(level);
            let available = self.bulkhead.available(level).unwrap_or(0);
            let headroom = self.bulkhead.headroom(level).unwrap_or(0);
            ((available - pending).max(0), (headroom - pending).max(0))
        }))
    }

    /// Pause before the next cycle: the shortest wait any collection asks for.
    pub fn next_scan_wait(&self) -> Duration {
        self.collections()
            .iter()
            .map(|c| c.next_scan_wait())
            .min()
            .unwrap_or_else(|| self.algorithm.max_allowed_wait_between_polls())
    }

    /// Run the scheduling loop until `shutdown` turns true (or its sender is
    /// dropped), then wait for in-flight work and reset the bulkhead.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            collections = self.collections().len(),
            available = self.bulkhead.available_total(),
            "scheduler starting"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let started = self.scan_once(None);
            let wait = self.next_scan_wait();
            debug!(started, wait_ms = wait.as_millis() as u64, "scan complete");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("scheduler stopping");
        self.drain().await;
        info!("scheduler stopped");
    }

    /// Wait up to the shutdown grace for polls and payloads to finish, then
    /// zero the bulkhead counters.
    async fn drain(&self) {
        let busy = || {
            self.bulkhead.active_total() > 0
                || self
                    .collections()
                    .iter()
                    .any(|c| c.clients().iter().any(|h| h.is_polling()))
        };

        let grace = self.config.shutdown_grace();
        let drained = tokio::time::timeout(grace, async {
            while busy() {
                tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                active = self.bulkhead.active_total(),
                grace_ms = grace.as_millis() as u64,
                "in-flight work still running after shutdown grace"
            );
            return;
        }
        self.bulkhead.reset();
    }
}

/// Claim the granted client and spawn its poll. Returns false when the client
/// already has a poll in flight.
fn start_poll(grant: SlotGrant, ctx: PollContext, timestamp: Option<u64>) -> bool {
    let holder = grant.client;
    if !holder.try_begin_poll(clock::resolve(timestamp)) {
        debug!(client = holder.id(), "poll already in flight");
        return false;
    }

    debug!(client = holder.id(), slots = grant.slots, past_due = grant.past_due, "poll started");
    let level = holder.partition().priority;
    ctx.pending.add(level, grant.slots);
    tokio::spawn(async move {
        poll_client(&holder, grant.slots, &ctx).await;
        ctx.pending.release(level, grant.slots);
        holder.end_poll();
    });
    true
}

async fn poll_client(holder: &Arc<ClientPriorityHolder>, slots: u32, ctx: &PollContext) {
    let metrics = holder.metrics();
    ctx.counters.polls.fetch_add(1, Ordering::Relaxed);

    match holder.client().poll(slots).await {
        Ok(payloads) => {
            ctx.algorithm
                .poll_metrics_recalculate(!payloads.is_empty(), false, metrics);
            ctx.algorithm.capacity_percentage_recalculate(metrics);
            debug!(client = holder.id(), received = payloads.len(), "poll returned");

            let level = holder.partition().priority;
            let max_processing = holder.partition().payload_max_processing_time();
            for payload in payloads {
                admit(payload, level, max_processing, ctx);
            }
        }
        Err(err) => {
            ctx.counters.poll_errors.fetch_add(1, Ordering::Relaxed);
            ctx.algorithm.poll_metrics_recalculate(false, true, metrics);
            ctx.algorithm.capacity_percentage_recalculate(metrics);
            warn!(client = holder.id(), error = %err, "poll failed");
        }
    }
}

/// Take a bulkhead slot for `payload` and process it on its own task.
///
/// A polled payload is never dropped. When its level is already at the
/// reservation plus overage the slot is taken anyway and counted.
fn admit(payload: Payload, level: usize, max_processing: Duration, ctx: &PollContext) {
    let slot = match ctx.bulkhead.try_reserve(level) {
        Ok(true) => Some(level),
        Ok(false) => {
            let active = ctx.bulkhead.increment(level).ok();
            ctx.counters.payloads_over_limit.fetch_add(1, Ordering::Relaxed);
            warn!(
                payload = %payload.id,
                client = %payload.client_id,
                level,
                ?active,
                "bulkhead level full, payload admitted over the limit"
            );
            active.map(|_| level)
        }
        Err(err) => {
            warn!(payload = %payload.id, error = %err, "payload admitted without a bulkhead slot");
            None
        }
    };

    let ctx = ctx.clone();
    tokio::spawn(async move { process(payload, slot, max_processing, &ctx).await });
}

async fn process(payload: Payload, slot: Option<usize>, max_processing: Duration, ctx: &PollContext) {
    let id = payload.id;
    let force = match tokio::time::timeout(max_processing, ctx.handler.handle(payload)).await {
        Ok(Ok(())) => {
            ctx.counters.payloads_processed.fetch_add(1, Ordering::Relaxed);
            false
        }
        Ok(Err(err)) => {
            ctx.counters.payloads_failed.fetch_add(1, Ordering::Relaxed);
            warn!(payload = %id, error = %err, "payload handler failed");
            false
        }
        Err(_) => {
            ctx.counters.payloads_evicted.fetch_add(1, Ordering::Relaxed);
            warn!(
                payload = %id,
                max_ms = max_processing.as_millis() as u64,
                "payload exceeded max processing time, evicted"
            );
            true
        }
    };

    // Underflow is already logged and counted by the bulkhead.
    if let Some(level) = slot {
        if let Err(err) = ctx.bulkhead.decrement(level, force) {
            debug!(payload = %id, error = %err, "slot release failed");
        }
    }
}
