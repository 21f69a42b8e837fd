//! Drives a [`Negotiator`] over a real channel and runs the master jobs.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::action::{NegotiationMessage, WireNegotiation};
use crate::error::NegotiationError;
use crate::message::Message;
use crate::negotiator::{NegotiationStatistics, Negotiator};
use crate::state::MasterJobState;
use crate::traits::{EventPublisher, EventSubscriber};

/// Pause after a failed receive before trying again.
const RECV_RETRY_DELAY: Duration = Duration::from_millis(250);

// ── Master jobs ──────────────────────────────────────────────────────

/// A singleton job that must only run on the elected master.
#[async_trait]
pub trait MasterJob: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self) -> Result<(), NegotiationError>;
}

struct RegisteredJob {
    job: Arc<dyn MasterJob>,
    interval: Duration,
    last_started: Option<Instant>,
    running: Option<JoinHandle<()>>,
}

/// Table of master jobs and their intervals, built at startup.
#[derive(Default)]
pub struct MasterJobRegistry {
    jobs: Vec<RegisteredJob>,
}

impl MasterJobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, job: Arc<dyn MasterJob>, interval: Duration) -> Result<(), NegotiationError> {
        if self.jobs.iter().any(|j| j.job.name() == job.name()) {
            return Err(NegotiationError::Job {
                name: job.name().to_string(),
                reason: "already registered".into(),
            });
        }
        info!(job = job.name(), interval_ms = interval.as_millis() as u64, "master job registered");
        self.jobs.push(RegisteredJob {
            job,
            interval,
            last_started: None,
            running: None,
        });
        Ok(())
    }

    /// Registered job names with their intervals.
    pub fn schedule(&self) -> Vec<(String, Duration)> {
        self.jobs
            .iter()
            .map(|j| (j.job.name().to_string(), j.interval))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Names of the jobs currently executing.
    pub fn running(&self) -> HashSet<String> {
        self.jobs
            .iter()
            .filter(|j| j.running.as_ref().is_some_and(|h| !h.is_finished()))
            .map(|j| j.job.name().to_string())
            .collect()
    }

    /// Start every job whose interval has elapsed and whose previous run has
    /// finished. Returns how many were started.
    pub fn run_due(&mut self, now: Instant) -> usize {
        let mut started = 0;
        for entry in &mut self.jobs {
            if entry.running.as_ref().is_some_and(|h| !h.is_finished()) {
                continue;
            }
            let due = entry
                .last_started
                .map_or(true, |last| now.saturating_duration_since(last) >= entry.interval);
            if !due {
                continue;
            }

            entry.last_started = Some(now);
            let job = Arc::clone(&entry.job);
            entry.running = Some(tokio::spawn(async move {
                debug!(job = job.name(), "master job started");
                if let Err(err) = job.run().await {
                    warn!(job = job.name(), error = %err, "master job failed");
                }
            }));
            started += 1;
        }
        started
    }

    /// Abort running jobs and forget their schedule.
    pub fn stop_all(&mut self) {
        for entry in &mut self.jobs {
            if let Some(handle) = entry.running.take() {
                if !handle.is_finished() {
                    info!(job = entry.job.name(), "master job aborted");
                }
                handle.abort();
            }
            entry.last_started = None;
        }
    }
}

// ── Runner ───────────────────────────────────────────────────────────

/// Runs the negotiation protocol: ticks the state machine on an interval,
/// feeds it every message from the subscriber, publishes what it emits, and
/// keeps the master jobs running exactly while the instance is `Active`.
pub struct NegotiationRunner {
    negotiator: Mutex<Negotiator>,
    publisher: Arc<dyn EventPublisher>,
    subscriber: Arc<dyn EventSubscriber>,
    jobs: Mutex<MasterJobRegistry>,
    service_id: String,
    topic: String,
    tick_interval: Duration,
}

impl NegotiationRunner {
    pub fn new(
        negotiator: Negotiator,
        publisher: Arc<dyn EventPublisher>,
        subscriber: Arc<dyn EventSubscriber>,
    ) -> Self {
        let service_id = negotiator.service_id().to_string();
        let topic = negotiator.config().topic.clone();
        let tick_interval = negotiator.config().tick_interval();
        Self {
            negotiator: Mutex::new(negotiator),
            publisher,
            subscriber,
            jobs: Mutex::new(MasterJobRegistry::new()),
            service_id,
            topic,
            tick_interval,
        }
    }

    pub fn with_jobs(mut self, jobs: MasterJobRegistry) -> Self {
        self.jobs = Mutex::new(jobs);
        self
    }

    pub fn state(&self) -> MasterJobState {
        self.lock().state()
    }

    pub fn is_master(&self) -> bool {
        self.lock().is_master()
    }

    pub fn statistics(&self) -> NegotiationStatistics {
        self.lock().statistics(Utc::now())
    }

    /// Names of the master jobs currently executing.
    pub fn running_jobs(&self) -> HashSet<String> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner).running()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Negotiator> {
        self.negotiator.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Negotiate until `shutdown` turns true. Returns an error only when the
    /// channel itself is gone.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), NegotiationError> {
        self.subscriber.subscribe(&self.topic).await?;
        info!(service_id = %self.service_id, topic = %self.topic, "negotiation starting");

        let out = self.lock().start(Utc::now());
        self.publish_all(out).await;

        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let result = loop {
            tokio::select! {
                _ = interval.tick() => {
                    let out = self.lock().tick(Utc::now());
                    self.publish_all(out).await;
                }
                received = self.subscriber.recv() => match received {
                    Ok(message) => self.receive(message).await,
                    Err(NegotiationError::ChannelClosed) => break Err(NegotiationError::ChannelClosed),
                    Err(err) => {
                        warn!(service_id = %self.service_id, error = %err, "negotiation receive failed");
                        let out = self.lock().comms_failed(Utc::now());
                        self.publish_all(out).await;
                        tokio::time::sleep(RECV_RETRY_DELAY).await;
                    }
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break Ok(());
                    }
                }
            }
            self.sync_jobs();
        };

        let out = self.lock().stop(Utc::now());
        self.publish_all(out).await;
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner).stop_all();
        info!(service_id = %self.service_id, "negotiation stopped");
        result
    }

    async fn receive(&self, message: Message) {
        let now = Utc::now();
        if message.topic != self.topic {
            debug!(topic = %message.topic, "ignoring message on foreign topic");
            return;
        }
        self.lock().note_received(now);

        let decoded = message
            .decode::<WireNegotiation>()
            .map_err(NegotiationError::from)
            .and_then(NegotiationMessage::try_from);
        let msg = match decoded {
            Ok(msg) => msg,
            Err(err) => {
                warn!(sender = %message.sender, error = %err, "ignoring malformed negotiation message");
                return;
            }
        };

        let out = self.lock().handle(&msg, now);
        self.publish_all(out).await;
    }

    /// Publish in order. The first failure marks comms as lost and drops the
    /// rest; the next tick republishes whatever the state still requires.
    async fn publish_all(&self, messages: Vec<NegotiationMessage>) {
        for msg in messages {
            let action = msg.action;
            let published = match Message::new(&self.topic, &self.service_id, &WireNegotiation::from(&msg)) {
                Ok(message) => self.publisher.publish(message).await,
                Err(err) => Err(err.into()),
            };
            if let Err(err) = published {
                warn!(service_id = %self.service_id, %action, error = %err, "negotiation publish failed");
                // Not republished here, to avoid looping on a dead channel.
                let _ = self.lock().comms_failed(Utc::now());
                return;
            }
            debug!(service_id = %self.service_id, %action, "negotiation message sent");
        }
    }

    fn sync_jobs(&self) {
        let is_master = self.is_master();
        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        if is_master {
            jobs.run_due(Instant::now());
        } else {
            jobs.stop_all();
        }
    }
}
