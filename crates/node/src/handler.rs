use async_trait::async_trait;
use tracing::info;

use switchyard_scheduler::{Payload, PayloadHandler, SchedulerError};

/// Default payload handler of the node binary: records each payload in the
/// log. Deployments embedding the scheduler provide their own handler.
#[derive(Debug, Default)]
pub struct LoggingHandler;

#[async_trait]
impl PayloadHandler for LoggingHandler {
    async fn handle(&self, payload: Payload) -> Result<(), SchedulerError> {
        info!(
            payload = %payload.id,
            client = %payload.client_id,
            channel = %payload.channel_id,
            bytes = payload.body.len(),
            "payload processed"
        );
        Ok(())
    }
}
