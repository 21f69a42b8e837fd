//! Poll scheduling core for prioritized listener clients.
//!
//! A [`ClientPriorityCollection`] owns the clients of one channel and decides,
//! scan by scan, which of them may poll and how many processing slots each
//! may claim. The decisions come from a swappable
//! [`ListenerClientPollAlgorithm`]; concurrency is capped per priority level
//! by the [`TaskSlotReservation`] bulkhead. The [`Scheduler`] ties the pieces
//! together into a running loop.

pub mod algorithm;
pub mod atomic;
pub mod bulkhead;
pub mod client;
pub mod clock;
pub mod collection;
pub mod error;
pub mod metrics;
pub mod partition;
pub mod runner;
pub mod types;

pub use algorithm::{ListenerClientPollAlgorithm, MultipleClientPollSlotAllocation, PollAlgorithmConfig};
pub use bulkhead::{BulkheadStatistics, LevelStatistics, TaskManagerPrioritySettings, TaskSlotReservation};
pub use client::{ListenerClient, Payload, PayloadHandler};
pub use collection::{ClientPriorityCollection, ClientPriorityHolder, CollectionStatistics, ScanBudget, SlotGrant};
pub use error::SchedulerError;
pub use metrics::{ClientMetrics, ClientMetricsSnapshot, RateLimiter};
pub use partition::PriorityPartitionConfig;
pub use runner::Scheduler;
pub use types::{BulkheadLevelConfig, SchedulerConfig, SchedulerStatistics};
