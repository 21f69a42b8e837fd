//! Master-only jobs run by the node.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use switchyard_negotiation::{MasterJob, NegotiationError};
use switchyard_scheduler::Scheduler;

/// Logs a summary of the scheduler counters. Registered as a master job so
/// one line per cluster is written each interval.
pub struct StatsReportJob {
    scheduler: Arc<Scheduler>,
}

impl StatsReportJob {
    pub const NAME: &'static str = "stats-report";

    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self { scheduler }
    }
}

#[async_trait]
impl MasterJob for StatsReportJob {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn run(&self) -> Result<(), NegotiationError> {
        let stats = self.scheduler.statistics();
        info!(
            scans = stats.scans,
            grants = stats.grants,
            polls = stats.polls,
            processed = stats.payloads_processed,
            failed = stats.payloads_failed,
            evicted = stats.payloads_evicted,
            over_limit = stats.payloads_over_limit,
            active = stats.bulkhead.active,
            available = stats.bulkhead.available,
            "scheduler report"
        );
        Ok(())
    }
}
