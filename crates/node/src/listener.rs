//! ZeroMQ PULL listener client.
//!
//! A background pump reads the socket into a bounded local buffer; the
//! scheduler sees the buffer depth as the queue length and drains it with
//! `poll`. When the buffer is full the pump stops reading and the producers'
//! PUSH sockets apply backpressure.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use zeromq::{PullSocket, Socket, SocketRecv};

use switchyard_negotiation::Transport;
use switchyard_scheduler::{ListenerClient, Payload, PriorityPartitionConfig, SchedulerError};

use crate::error::NodeError;

/// Pause of the pump while the buffer is full or after a receive error.
const PUMP_BACKOFF: Duration = Duration::from_millis(50);

pub struct ZmqListenerClient {
    id: String,
    channel_id: String,
    partition: PriorityPartitionConfig,
    buffer: Arc<Mutex<VecDeque<Payload>>>,
    pump: JoinHandle<()>,
}

impl ZmqListenerClient {
    /// Bind a PULL socket on `transport` and start pumping it.
    #[instrument(skip_all, fields(client = %id, endpoint = %transport))]
    pub async fn bind(
        id: &str,
        channel_id: &str,
        partition: PriorityPartitionConfig,
        transport: &Transport,
        buffer_limit: usize,
    ) -> Result<Self, NodeError> {
        transport
            .ensure_ipc_dir()
            .and_then(|_| transport.remove_stale_socket())?;

        let mut socket = PullSocket::new();
        let endpoint = transport.endpoint();
        info!(endpoint = %endpoint, "binding listener PULL socket");
        socket
            .bind(&endpoint)
            .await
            .map_err(|e| NodeError::Config(format!("client '{id}' cannot bind {endpoint}: {e}")))?;

        let buffer = Arc::new(Mutex::new(VecDeque::new()));
        let pump = tokio::spawn(pump(
            socket,
            Arc::clone(&buffer),
            id.to_string(),
            channel_id.to_string(),
            buffer_limit.max(1),
        ));

        Ok(Self {
            id: id.to_string(),
            channel_id: channel_id.to_string(),
            partition,
            buffer,
            pump,
        })
    }

    /// Payloads received but not yet polled.
    pub fn buffered(&self) -> usize {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Drop for ZmqListenerClient {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

async fn pump(
    mut socket: PullSocket,
    buffer: Arc<Mutex<VecDeque<Payload>>>,
    client_id: String,
    channel_id: String,
    buffer_limit: usize,
) {
    loop {
        let full = buffer.lock().unwrap_or_else(PoisonError::into_inner).len() >= buffer_limit;
        if full {
            tokio::time::sleep(PUMP_BACKOFF).await;
            continue;
        }

        let raw = match socket.recv().await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(client = %client_id, error = %e, "listener recv error");
                tokio::time::sleep(PUMP_BACKOFF).await;
                continue;
            }
        };
        let Some(body) = raw.get(0) else {
            debug!(client = %client_id, "dropping empty ZMQ message");
            continue;
        };

        let payload = Payload::new(client_id.as_str(), channel_id.as_str(), body.to_vec());
        buffer.lock().unwrap_or_else(PoisonError::into_inner).push_back(payload);
    }
}

#[async_trait]
impl ListenerClient for ZmqListenerClient {
    fn id(&self) -> &str {
        &self.id
    }

    fn channel_id(&self) -> &str {
        &self.channel_id
    }

    fn partition(&self) -> &PriorityPartitionConfig {
        &self.partition
    }

    fn queue_length(&self) -> Option<i64> {
        Some(self.buffered() as i64)
    }

    async fn poll(&self, max: u32) -> Result<Vec<Payload>, SchedulerError> {
        if self.pump.is_finished() {
            return Err(SchedulerError::Client(format!(
                "listener '{}' is no longer receiving",
                self.id
            )));
        }
        let mut buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        let take = buffer.len().min(max as usize);
        Ok(buffer.drain(..take).collect())
    }
}
