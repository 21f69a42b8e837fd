use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::algorithm::ListenerClientPollAlgorithm;
use crate::client::ListenerClient;
use crate::clock;
use crate::error::SchedulerError;
use crate::metrics::{ClientMetrics, ClientMetricsSnapshot};
use crate::partition::PriorityPartitionConfig;

/// A registered client together with its scheduling metrics.
pub struct ClientPriorityHolder {
    client: Arc<dyn ListenerClient>,
    metrics: Arc<ClientMetrics>,
    polling: AtomicBool,
}

impl ClientPriorityHolder {
    pub fn id(&self) -> &str {
        self.client.id()
    }

    pub fn channel_id(&self) -> &str {
        self.client.channel_id()
    }

    pub fn partition(&self) -> &PriorityPartitionConfig {
        self.client.partition()
    }

    pub fn client(&self) -> &Arc<dyn ListenerClient> {
        &self.client
    }

    pub fn metrics(&self) -> &Arc<ClientMetrics> {
        &self.metrics
    }

    /// Claim the client for a poll starting at `tick`. Fails while another
    /// poll is in flight, which keeps the metrics single-writer.
    pub fn try_begin_poll(&self, tick: u64) -> bool {
        if self
            .polling
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        self.metrics.set_last_poll_tick(Some(tick));
        true
    }

    pub fn end_poll(&self) {
        self.polling.store(false, Ordering::Release);
    }

    pub fn is_polling(&self) -> bool {
        self.polling.load(Ordering::Acquire)
    }
}

impl fmt::Debug for ClientPriorityHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientPriorityHolder")
            .field("id", &self.id())
            .field("channel_id", &self.channel_id())
            .field("polling", &self.is_polling())
            .field("metrics", &self.metrics)
            .finish()
    }
}

/// One scan decision: poll `client` for up to `slots` payloads.
#[derive(Debug, Clone)]
pub struct SlotGrant {
    pub client: Arc<ClientPriorityHolder>,
    pub slots: u32,
    /// Granted in the past-due pass rather than the priority pass.
    pub past_due: bool,
}

impl SlotGrant {
    pub fn client_id(&self) -> &str {
        self.client.id()
    }
}

/// Slots a scan may hand out.
///
/// `Shared` is one pool for every client. `PerLevel` charges each client to
/// its own bulkhead level: `available` sizes the grant and `headroom` caps it,
/// so a poll never asks for more payloads than the level can admit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanBudget {
    Shared(i64),
    PerLevel { available: Vec<i64>, headroom: Vec<i64> },
}

impl ScanBudget {
    /// A per-level budget from `(available, headroom)` pairs, indexed by level.
    pub fn per_level(levels: impl IntoIterator<Item = (i64, i64)>) -> Self {
        let (available, headroom): (Vec<i64>, Vec<i64>) = levels.into_iter().unzip();
        Self::PerLevel { available, headroom }
    }

    /// Slots still open to clients of `level`. Unknown levels get nothing.
    pub fn available(&self, level: usize) -> i64 {
        match self {
            Self::Shared(available) => *available,
            Self::PerLevel { available, .. } => available.get(level).copied().unwrap_or(0),
        }
    }

    /// Hard cap on a grant at `level`, if the budget has one.
    pub fn headroom(&self, level: usize) -> Option<i64> {
        match self {
            Self::Shared(_) => None,
            Self::PerLevel { headroom, .. } => Some(headroom.get(level).copied().unwrap_or(0)),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        match self {
            Self::Shared(available) => *available <= 0,
            Self::PerLevel { available, .. } => available.iter().all(|a| *a <= 0),
        }
    }

    fn consume(&mut self, level: usize, slots: u32) {
        let slots = i64::from(slots);
        match self {
            Self::Shared(available) => *available -= slots,
            Self::PerLevel { available, headroom } => {
                if let Some(a) = available.get_mut(level) {
                    *a -= slots;
                }
                if let Some(h) = headroom.get_mut(level) {
                    *h -= slots;
                }
            }
        }
    }
}

/// Statistics of one client inside a collection.
#[derive(Debug, Clone, Serialize)]
pub struct ClientStatistics {
    pub id: String,
    pub priority: usize,
    pub polling: bool,
    pub metrics: ClientMetricsSnapshot,
}

/// Statistics of a whole collection.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionStatistics {
    pub channel_id: String,
    pub algorithm: String,
    pub scans: u64,
    pub clients: Vec<ClientStatistics>,
}

/// The clients of one channel, ordered for polling by a
/// [`ListenerClientPollAlgorithm`].
///
/// Clients keep their registration order, which breaks ties between equal
/// priority scores.
pub struct ClientPriorityCollection {
    channel_id: String,
    algorithm: Arc<dyn ListenerClientPollAlgorithm>,
    clients: RwLock<Vec<Arc<ClientPriorityHolder>>>,
    scans: AtomicU64,
}

impl ClientPriorityCollection {
    /// An empty collection for `channel_id`.
    pub fn new(channel_id: impl Into<String>, algorithm: Arc<dyn ListenerClientPollAlgorithm>) -> Self {
        Self {
            channel_id: channel_id.into(),
            algorithm,
            clients: RwLock::new(Vec::new()),
            scans: AtomicU64::new(0),
        }
    }

    /// A collection holding `clients`, registered in the given order.
    pub fn with_clients(
        channel_id: impl Into<String>,
        clients: Vec<Arc<dyn ListenerClient>>,
        algorithm: Arc<dyn ListenerClientPollAlgorithm>,
    ) -> Result<Self, SchedulerError> {
        let collection = Self::new(channel_id, algorithm);
        for client in clients {
            collection.register(client)?;
        }
        Ok(collection)
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    pub fn algorithm(&self) -> &Arc<dyn ListenerClientPollAlgorithm> {
        &self.algorithm
    }

    /// Register a client and initialise its metrics.
    pub fn register(&self, client: Arc<dyn ListenerClient>) -> Result<Arc<ClientPriorityHolder>, SchedulerError> {
        self.register_at(client, None)
    }

    /// Register a client as of `timestamp`. The registration counts as the
    /// client's last poll, so a client that is never granted still falls past
    /// due once the maximum wait between polls has elapsed.
    pub fn register_at(
        &self,
        client: Arc<dyn ListenerClient>,
        timestamp: Option<u64>,
    ) -> Result<Arc<ClientPriorityHolder>, SchedulerError> {
        let partition = client.partition();
        partition.validate()?;

        let mut metrics = ClientMetrics::new(partition.priority_weighting);
        if partition.supports_rate_limiting() {
            if let Some(limiter) = client.rate_limiter() {
                metrics = metrics.with_rate_limiter(limiter);
            }
        }
        self.algorithm.initialise_metrics(&metrics);
        metrics.set_last_poll_tick(Some(clock::resolve(timestamp)));

        let mut clients = self.clients.write().unwrap_or_else(PoisonError::into_inner);
        if clients.iter().any(|h| h.id() == client.id()) {
            return Err(SchedulerError::DuplicateClient(client.id().to_string()));
        }

        info!(
            channel = %self.channel_id,
            client = %client.id(),
            priority = partition.priority,
            weighting = partition.priority_weighting,
            "client registered"
        );
        let holder = Arc::new(ClientPriorityHolder {
            client,
            metrics: Arc::new(metrics),
            polling: AtomicBool::new(false),
        });
        clients.push(Arc::clone(&holder));
        Ok(holder)
    }

    /// Remove a client. Returns whether it was registered.
    pub fn remove(&self, client_id: &str) -> bool {
        let mut clients = self.clients.write().unwrap_or_else(PoisonError::into_inner);
        let before = clients.len();
        clients.retain(|h| h.id() != client_id);
        let removed = clients.len() != before;
        if removed {
            info!(channel = %self.channel_id, client = %client_id, "client removed");
        }
        removed
    }

    pub fn get(&self, client_id: &str) -> Option<Arc<ClientPriorityHolder>> {
        self.clients()
            .into_iter()
            .find(|h| h.id() == client_id)
    }

    /// The registered clients, in registration order.
    pub fn clients(&self) -> Vec<Arc<ClientPriorityHolder>> {
        self.clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.clients.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decide which clients poll next and how many slots each may claim,
    /// drawing every grant from one shared pool of `available` slots.
    pub fn scan(&self, available: i64, timestamp: Option<u64>) -> Vec<SlotGrant> {
        self.scan_within(&mut ScanBudget::Shared(available), timestamp)
    }

    /// Decide which clients poll next, charging each grant to `budget`.
    ///
    /// Past-due clients are granted first (most overdue first) when the
    /// algorithm supports it; the rest follow in descending priority. A
    /// client whose level has nothing left is passed over, so only the client
    /// being evaluated when a level runs dry can dip into the overage. A
    /// pending skip is consumed in whichever pass reaches the client first.
    pub fn scan_within(&self, budget: &mut ScanBudget, timestamp: Option<u64>) -> Vec<SlotGrant> {
        let now = clock::resolve(timestamp);
        let clients = self.clients();
        self.scans.fetch_add(1, Ordering::Relaxed);

        for holder in &clients {
            let queue_length = holder.client.queue_length();
            if let Some(q) = queue_length.filter(|q| *q < 0) {
                warn!(
                    channel = %self.channel_id,
                    client = %holder.id(),
                    queue_length = q,
                    "client reported a negative queue length"
                );
            }
            self.algorithm
                .priority_recalculate(queue_length, &holder.metrics, Some(now));
        }

        let mut handled = vec![false; clients.len()];
        let mut grants = Vec::new();

        if self.algorithm.supports_past_due_scan() {
            let mut past_due: Vec<(usize, u64)> = clients
                .iter()
                .enumerate()
                .filter(|(_, h)| self.algorithm.past_due_calculate(&h.metrics, Some(now)))
                .map(|(i, h)| (i, h.metrics.last_poll_tick().unwrap_or(0)))
                .collect();
            past_due.sort_by_key(|&(i, last)| (last, i));

            for (i, _) in past_due {
                if budget.is_exhausted() {
                    break;
                }
                let holder = &clients[i];
                if budget.available(holder.partition().priority) <= 0 {
                    continue;
                }
                handled[i] = true;
                if self.algorithm.should_skip(&holder.metrics) {
                    debug!(channel = %self.channel_id, client = %holder.id(), "past-due client skipped");
                    continue;
                }
                if let Some(grant) = self.grant(holder, budget, true) {
                    debug!(channel = %self.channel_id, client = %holder.id(), slots = grant.slots, "past-due grant");
                    grants.push(grant);
                }
            }
        }

        let mut order: Vec<usize> = (0..clients.len()).filter(|&i| !handled[i]).collect();
        // Stable sort: equal scores keep registration order.
        order.sort_by_key(|&i| std::cmp::Reverse(clients[i].metrics.priority_calculated().unwrap_or(0)));

        for i in order {
            if budget.is_exhausted() {
                break;
            }
            let holder = &clients[i];
            if budget.available(holder.partition().priority) <= 0 {
                continue;
            }
            if self.algorithm.should_skip(&holder.metrics) {
                debug!(channel = %self.channel_id, client = %holder.id(), "client skipped");
                continue;
            }
            if let Some(grant) = self.grant(holder, budget, false) {
                grants.push(grant);
            }
        }

        grants
    }

    /// Size one grant from the client's level budget and charge it.
    fn grant(&self, holder: &Arc<ClientPriorityHolder>, budget: &mut ScanBudget, past_due: bool) -> Option<SlotGrant> {
        let level = holder.partition().priority;
        let mut slots = self.algorithm.calculate_slots(budget.available(level), &holder.metrics);
        if let Some(headroom) = budget.headroom(level) {
            let cap = u32::try_from(headroom.max(0)).unwrap_or(u32::MAX);
            if slots > cap {
                slots = cap;
                holder.metrics.set_last_reserved(Some(u64::from(slots)));
            }
        }
        if slots == 0 {
            return None;
        }
        budget.consume(level, slots);
        Some(SlotGrant {
            client: Arc::clone(holder),
            slots,
            past_due,
        })
    }

    /// Reset every client's capacity.
    pub fn capacity_reset_all(&self) {
        for holder in self.clients() {
            self.algorithm.capacity_reset(&holder.metrics);
        }
    }

    /// Pause before the next scan: the shortest client poll wait, bounded by
    /// the algorithm's minimum and maximum wait between polls.
    pub fn next_scan_wait(&self) -> Duration {
        let min = self.algorithm.min_expected_wait_between_polls();
        let max = self.algorithm.max_allowed_wait_between_polls().max(min);
        self.clients()
            .iter()
            .map(|h| h.metrics.next_poll_wait())
            .min()
            .unwrap_or(max)
            .clamp(min, max)
    }

    pub fn statistics(&self) -> CollectionStatistics {
        CollectionStatistics {
            channel_id: self.channel_id.clone(),
            algorithm: self.algorithm.name().to_string(),
            scans: self.scans.load(Ordering::Relaxed),
            clients: self
                .clients()
                .iter()
                .map(|h| ClientStatistics {
                    id: h.id().to_string(),
                    priority: h.partition().priority,
                    polling: h.is_polling(),
                    metrics: h.metrics.snapshot(),
                })
                .collect(),
        }
    }
}

impl fmt::Debug for ClientPriorityCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientPriorityCollection")
            .field("channel_id", &self.channel_id)
            .field("algorithm", &self.algorithm.name())
            .field("clients", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicI64;

    use async_trait::async_trait;

    use super::*;
    use crate::algorithm::{MultipleClientPollSlotAllocation, PollAlgorithmConfig};
    use crate::client::Payload;

    struct StubClient {
        id: String,
        partition: PriorityPartitionConfig,
        queue: AtomicI64,
    }

    impl StubClient {
        fn new(id: &str, queue: i64) -> Arc<Self> {
            Self::weighted(id, queue, 1.0)
        }

        fn weighted(id: &str, queue: i64, weighting: f64) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                partition: PriorityPartitionConfig::new(1).with_weighting(weighting).unwrap(),
                queue: AtomicI64::new(queue),
            })
        }
    }

    #[async_trait]
    impl ListenerClient for StubClient {
        fn id(&self) -> &str { &self.id }
        fn channel_id(&self) -> &str { "orders" }
        fn partition(&self) -> &PriorityPartitionConfig { &self.partition }
        fn queue_length(&self) -> Option<i64> { Some(self.queue.load(Ordering::Relaxed)) }
        async fn poll(&self, _max: u32) -> Result<Vec<Payload>, SchedulerError> { Ok(Vec::new()) }
    }

    fn collection(config: PollAlgorithmConfig) -> ClientPriorityCollection {
        ClientPriorityCollection::new("orders", Arc::new(MultipleClientPollSlotAllocation::new(config)))
    }

    fn ids(grants: &[SlotGrant]) -> Vec<(&str, u32)> {
        grants.iter().map(|g| (g.client_id(), g.slots)).collect()
    }

    #[test]
    fn grants_follow_descending_queue_length() {
        let c = collection(PollAlgorithmConfig::default());
        c.register(StubClient::new("small", 1)).unwrap();
        c.register(StubClient::new("large", 10)).unwrap();
        c.register(StubClient::new("medium", 5)).unwrap();

        let grants = c.scan(4, Some(0));
        assert_eq!(ids(&grants), vec![("large", 3), ("medium", 1)]);
        assert!(grants.iter().all(|g| !g.past_due));
    }

    #[test]
    fn equal_scores_keep_registration_order() {
        let c = collection(PollAlgorithmConfig::default());
        c.register(StubClient::new("first", 3)).unwrap();
        c.register(StubClient::new("second", 3)).unwrap();
        c.register(StubClient::new("third", 3)).unwrap();

        let grants = c.scan(3, Some(0));
        assert_eq!(ids(&grants), vec![("first", 2), ("second", 1)]);
    }

    #[test]
    fn weighting_reorders_clients() {
        let c = collection(PollAlgorithmConfig::default());
        c.register(StubClient::weighted("plain", 10, 1.0)).unwrap();
        c.register(StubClient::weighted("boosted", 4, 3.0)).unwrap();

        let grants = c.scan(8, Some(0));
        assert_eq!(grants[0].client_id(), "boosted");
    }

    #[test]
    fn skipped_clients_consume_nothing() {
        let c = collection(PollAlgorithmConfig::default());
        let busy = c.register(StubClient::new("busy", 10)).unwrap();
        c.register(StubClient::new("quiet", 1)).unwrap();
        busy.metrics().set_skip_count(1);

        let grants = c.scan(4, Some(0));
        assert_eq!(ids(&grants), vec![("quiet", 3)]);
        assert_eq!(busy.metrics().skip_count(), 0);

        let grants = c.scan(4, Some(0));
        assert_eq!(grants[0].client_id(), "busy");
    }

    #[test]
    fn past_due_clients_go_first() {
        let c = collection(PollAlgorithmConfig::default());
        let hot = c.register(StubClient::new("hot", 10)).unwrap();
        let stale = c.register(StubClient::new("stale", 1)).unwrap();
        hot.metrics().set_last_poll_tick(Some(1_500));
        stale.metrics().set_last_poll_tick(Some(0));

        let grants = c.scan(4, Some(2_000));
        assert_eq!(ids(&grants), vec![("stale", 3), ("hot", 1)]);
        assert!(grants[0].past_due);
        assert!(!grants[1].past_due);
    }

    #[test]
    fn registration_counts_as_the_last_poll() {
        let c = collection(PollAlgorithmConfig::default());
        let hot = c.register_at(StubClient::new("hot", 50), Some(0)).unwrap();
        let cold = c.register_at(StubClient::new("cold", 5), Some(0)).unwrap();
        hot.metrics().set_capacity_percentage(1.0);
        assert_eq!(cold.metrics().last_poll_tick(), Some(0));

        let mut cold_grants = 0;
        for scan in 1..=30u64 {
            let now = scan * 2_000;
            for grant in c.scan(4, Some(now)) {
                if grant.client_id() == "cold" {
                    assert!(grant.past_due);
                    cold_grants += 1;
                }
                assert!(grant.client.try_begin_poll(now));
                grant.client.end_poll();
            }
        }
        // The bursting client empties the pool on every scan it leads, so
        // the quiet one only gets in as the most overdue client.
        assert!(cold_grants >= 10, "cold client granted {cold_grants} times");
    }

    #[test]
    fn past_due_client_still_serves_its_skip() {
        let c = collection(PollAlgorithmConfig::default());
        let broken = c.register_at(StubClient::new("broken", 10), Some(0)).unwrap();
        c.register_at(StubClient::new("steady", 1), Some(1_500)).unwrap();
        broken.metrics().set_skip_count(2);

        let grants = c.scan(4, Some(2_000));
        assert_eq!(ids(&grants), vec![("steady", 3)]);
        assert_eq!(broken.metrics().skip_count(), 1);

        let grants = c.scan(4, Some(2_010));
        assert_eq!(ids(&grants), vec![("steady", 3)]);
        assert_eq!(broken.metrics().skip_count(), 0);

        let grants = c.scan(4, Some(2_020));
        assert_eq!(grants[0].client_id(), "broken");
        assert!(grants[0].past_due);
    }

    #[test]
    fn per_level_budget_caps_each_level() {
        let c = collection(PollAlgorithmConfig::default());
        let small = Arc::new(StubClient {
            id: "small".to_string(),
            partition: PriorityPartitionConfig::new(1),
            queue: AtomicI64::new(10),
        });
        let large = Arc::new(StubClient {
            id: "large".to_string(),
            partition: PriorityPartitionConfig::new(0),
            queue: AtomicI64::new(5),
        });
        let small = c.register_at(small, Some(0)).unwrap();
        c.register_at(large, Some(0)).unwrap();
        small.metrics().set_capacity_percentage(1.0);

        // Level 0 has eight free slots, level 1 one slot and no overage.
        let mut budget = ScanBudget::per_level([(8, 13), (1, 1)]);
        let grants = c.scan_within(&mut budget, Some(0));
        assert_eq!(ids(&grants), vec![("small", 1), ("large", 6)]);
        assert_eq!(small.metrics().last_reserved(), Some(1));
        assert_eq!(budget.available(1), 0);
        assert_eq!(budget.headroom(1), Some(0));
        assert_eq!(budget.available(0), 2);
    }

    #[test]
    fn exhausted_level_does_not_stop_other_levels() {
        let c = collection(PollAlgorithmConfig::default());
        let blocked = Arc::new(StubClient {
            id: "blocked".to_string(),
            partition: PriorityPartitionConfig::new(1),
            queue: AtomicI64::new(20),
        });
        c.register_at(blocked, Some(0)).unwrap();
        c.register_at(
            Arc::new(StubClient {
                id: "open".to_string(),
                partition: PriorityPartitionConfig::new(0),
                queue: AtomicI64::new(1),
            }),
            Some(0),
        )
        .unwrap();

        let mut budget = ScanBudget::per_level([(4, 5), (0, 0)]);
        let grants = c.scan_within(&mut budget, Some(0));
        assert_eq!(ids(&grants), vec![("open", 3)]);
        assert!(!budget.is_exhausted());
    }

    #[test]
    fn past_due_pass_can_be_disabled() {
        let config = PollAlgorithmConfig {
            supports_past_due_scan: false,
            ..PollAlgorithmConfig::default()
        };
        let c = collection(config);
        let hot = c.register(StubClient::new("hot", 10)).unwrap();
        let stale = c.register(StubClient::new("stale", 1)).unwrap();
        hot.metrics().set_last_poll_tick(Some(1_500));
        stale.metrics().set_last_poll_tick(Some(0));

        let grants = c.scan(4, Some(2_000));
        assert_eq!(grants[0].client_id(), "hot");
    }

    #[test]
    fn overshoot_is_limited_to_one_client() {
        let c = collection(PollAlgorithmConfig::default());
        let a = c.register(StubClient::new("a", 50)).unwrap();
        let b = c.register(StubClient::new("b", 40)).unwrap();
        a.metrics().set_capacity_percentage(1.0);
        b.metrics().set_capacity_percentage(1.0);

        let grants = c.scan(2, Some(0));
        assert_eq!(ids(&grants), vec![("a", 7)]);
    }

    #[test]
    fn negative_queue_length_does_not_stall_the_scan() {
        let c = collection(PollAlgorithmConfig::default());
        c.register(StubClient::new("broken", -20)).unwrap();
        c.register(StubClient::new("fine", 2)).unwrap();

        let grants = c.scan(4, Some(0));
        assert_eq!(ids(&grants), vec![("fine", 3), ("broken", 1)]);
        let broken = c.get("broken").unwrap();
        assert_eq!(broken.metrics().priority_calculated(), Some(0));
    }

    #[test]
    fn nothing_available_grants_nothing() {
        let c = collection(PollAlgorithmConfig::default());
        c.register(StubClient::new("a", 5)).unwrap();
        assert!(c.scan(0, Some(0)).is_empty());
        assert!(c.scan(-2, Some(0)).is_empty());
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let c = collection(PollAlgorithmConfig::default());
        c.register(StubClient::new("a", 5)).unwrap();
        let err = c.register(StubClient::new("a", 5)).unwrap_err();
        assert!(matches!(err, SchedulerError::DuplicateClient(id) if id == "a"));
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn remove_drops_the_client() {
        let c = collection(PollAlgorithmConfig::default());
        c.register(StubClient::new("a", 5)).unwrap();
        c.register(StubClient::new("b", 5)).unwrap();
        assert!(c.remove("a"));
        assert!(!c.remove("a"));
        assert_eq!(c.len(), 1);
        assert!(c.get("a").is_none());
    }

    #[test]
    fn one_poll_in_flight_per_client() {
        let c = collection(PollAlgorithmConfig::default());
        let a = c.register(StubClient::new("a", 5)).unwrap();
        assert!(a.try_begin_poll(10));
        assert!(!a.try_begin_poll(11));
        assert_eq!(a.metrics().last_poll_tick(), Some(10));
        a.end_poll();
        assert!(a.try_begin_poll(12));
    }

    #[test]
    fn scan_wait_is_bounded() {
        let c = collection(PollAlgorithmConfig::default());
        assert_eq!(c.next_scan_wait(), Duration::from_secs(1));
        let a = c.register(StubClient::new("a", 5)).unwrap();
        a.metrics().set_poll_time_reduce_ratio(Some(0.0));
        assert_eq!(c.next_scan_wait(), Duration::from_millis(100));
    }

    #[test]
    fn statistics_cover_every_client() {
        let c = collection(PollAlgorithmConfig::default());
        c.register(StubClient::new("a", 5)).unwrap();
        c.register(StubClient::new("b", 1)).unwrap();
        c.scan(4, Some(0));

        let stats = c.statistics();
        assert_eq!(stats.channel_id, "orders");
        assert_eq!(stats.scans, 1);
        assert_eq!(stats.clients.len(), 2);
        assert_eq!(stats.clients[0].metrics.priority_calculated, Some(5));
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["clients"][1]["id"], "b");
    }
}
