use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SchedulerError;
use crate::metrics::RateLimiter;
use crate::partition::PriorityPartitionConfig;

/// A unit of work received by a listener client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payload {
    pub id: Uuid,
    /// Id of the client that received the payload.
    pub client_id: String,
    pub channel_id: String,
    pub body: Vec<u8>,
    pub received_at: DateTime<Utc>,
}

impl Payload {
    pub fn new(client_id: impl Into<String>, channel_id: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            id: Uuid::new_v4(),
            client_id: client_id.into(),
            channel_id: channel_id.into(),
            body,
            received_at: Utc::now(),
        }
    }
}

/// A listener endpoint pulling payloads for one partition of a channel.
///
/// The scheduler never looks inside the transport: it only asks how deep the
/// backlog is and tells the client how many payloads it may fetch.
#[async_trait]
pub trait ListenerClient: Send + Sync {
    /// Unique client id.
    fn id(&self) -> &str;

    fn channel_id(&self) -> &str;

    fn partition(&self) -> &PriorityPartitionConfig;

    /// Current backlog reported by the underlying fabric, if known.
    fn queue_length(&self) -> Option<i64> {
        None
    }

    /// Throttle signal applied when the partition supports rate limiting.
    fn rate_limiter(&self) -> Option<Arc<dyn RateLimiter>> {
        None
    }

    /// Fetch at most `max` payloads. An empty result is a successful poll
    /// that found no work.
    async fn poll(&self, max: u32) -> Result<Vec<Payload>, SchedulerError>;
}

/// Processes admitted payloads on the worker side of the scheduler.
#[async_trait]
pub trait PayloadHandler: Send + Sync {
    async fn handle(&self, payload: Payload) -> Result<(), SchedulerError>;
}

/// Blanket implementation so `Arc<dyn PayloadHandler>` can be used directly.
#[async_trait]
impl<T: PayloadHandler + ?Sized> PayloadHandler for Arc<T> {
    async fn handle(&self, payload: Payload) -> Result<(), SchedulerError> {
        (**self).handle(payload).await
    }
}
