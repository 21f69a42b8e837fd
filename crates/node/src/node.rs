//! Wires configuration, listener clients, the scheduler, the negotiation
//! runner and the stats server into one running node.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{info, warn};

use switchyard_negotiation::{
    MasterJobRegistry, NegotiationRunner, Negotiator, Transport, ZmqPublisher, ZmqSubscriber,
};
use switchyard_scheduler::{PayloadHandler, Scheduler};

use crate::config::{parse_endpoint_to_transport, NodeConfig};
use crate::error::NodeError;
use crate::jobs::StatsReportJob;
use crate::listener::ZmqListenerClient;
use crate::stats::{spawn_stats_server, NodeState};

pub struct Node {
    config: NodeConfig,
    state: NodeState,
}

impl Node {
    /// Bind every socket and register every client. Nothing runs until
    /// [`Node::run`].
    pub async fn build(config: NodeConfig, handler: Arc<dyn PayloadHandler>) -> Result<Self, NodeError> {
        config.validate()?;
        let scheduler = Arc::new(Scheduler::new(config.scheduler.clone(), handler)?);

        for client in &config.clients {
            let transport = parse_endpoint_to_transport(&client.endpoint)?;
            let listener = ZmqListenerClient::bind(
                &client.id,
                &client.channel,
                client.partition.clone(),
                &transport,
                client.buffer_limit,
            )
            .await?;
            scheduler.register_client(Arc::new(listener))?;
        }

        let negotiation = if config.negotiation.enabled {
            Some(Arc::new(Self::build_negotiation(&config, &scheduler).await?))
        } else {
            info!(service_id = %config.service_id, "negotiation disabled, node never runs master jobs");
            None
        };

        let state = NodeState {
            service_id: config.service_id.clone(),
            started_at: Utc::now(),
            scheduler,
            negotiation,
        };
        Ok(Self { config, state })
    }

    async fn build_negotiation(config: &NodeConfig, scheduler: &Arc<Scheduler>) -> Result<NegotiationRunner, NodeError> {
        let bind = parse_endpoint_to_transport(&config.cluster.bind)?;
        let peers = config
            .cluster
            .subscriptions()
            .iter()
            .map(|p| parse_endpoint_to_transport(p))
            .collect::<Result<Vec<Transport>, _>>()?;

        let publisher = Arc::new(ZmqPublisher::bind(&bind).await?);
        let subscriber = Arc::new(ZmqSubscriber::connect(&peers).await?);

        let mut jobs = MasterJobRegistry::new();
        if config.report_interval_secs > 0 {
            jobs.register(
                Arc::new(StatsReportJob::new(Arc::clone(scheduler))),
                Duration::from_secs(config.report_interval_secs),
            )?;
        }

        let service_id = config.service_id.clone();
        let negotiator = Negotiator::new(&config.service_id, config.negotiation.clone())
            .on_command_change(move |in_command| {
                if in_command {
                    info!(service_id = %service_id, "node took master command");
                } else {
                    warn!(service_id = %service_id, "node gave up master command");
                }
            });
        Ok(NegotiationRunner::new(negotiator, publisher, subscriber).with_jobs(jobs))
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// State shared with the stats endpoints.
    pub fn state(&self) -> &NodeState {
        &self.state
    }

    /// Run until `shutdown` turns true, then drain the scheduler and step
    /// down from the negotiation.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<(), NodeError> {
        info!(
            service_id = %self.config.service_id,
            clients = self.config.clients.len(),
            "node starting"
        );

        let stats_server = (self.config.stats_port > 0)
            .then(|| spawn_stats_server(self.config.stats_port, self.state.clone(), shutdown.clone()));

        let scheduler = Arc::clone(&self.state.scheduler);
        let scheduler_shutdown = shutdown.clone();
        let scheduling = async move { scheduler.run(scheduler_shutdown).await };

        let negotiating = async {
            match &self.state.negotiation {
                Some(runner) => runner.run(shutdown.clone()).await,
                None => Ok(()),
            }
        };

        let ((), negotiated) = tokio::join!(scheduling, negotiating);
        if let Some(handle) = stats_server {
            handle.await.ok();
        }
        info!(service_id = %self.config.service_id, "node stopped");
        negotiated.map_err(NodeError::from)
    }
}
