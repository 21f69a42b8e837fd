//! In-process negotiation channel built on `tokio::sync::broadcast`.
//!
//! Used when every instance lives in one process (tests, single-host
//! deployments) and as the reference behaviour for the ZeroMQ transport:
//! fan-out to every endpoint, the sender's own endpoint included.

use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use tokio::sync::{broadcast, Mutex};
use tracing::warn;

use crate::error::NegotiationError;
use crate::message::Message;
use crate::traits::{EventPublisher, EventSubscriber};

const DEFAULT_CAPACITY: usize = 1024;

/// Shared broadcast channel. Clone it to hand it around; create one
/// [`LocalEndpoint`] per instance.
#[derive(Debug, Clone)]
pub struct LocalBus {
    sender: broadcast::Sender<Message>,
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl LocalBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// A new endpoint receiving everything published from now on.
    pub fn endpoint(&self) -> LocalEndpoint {
        LocalEndpoint {
            sender: self.sender.clone(),
            receiver: Mutex::new(self.sender.subscribe()),
            prefixes: RwLock::new(Vec::new()),
        }
    }
}

/// One instance's connection to a [`LocalBus`].
#[derive(Debug)]
pub struct LocalEndpoint {
    sender: broadcast::Sender<Message>,
    receiver: Mutex<broadcast::Receiver<Message>>,
    /// Topic prefixes; nothing is delivered until one is subscribed.
    prefixes: RwLock<Vec<String>>,
}

#[async_trait]
impl EventPublisher for LocalEndpoint {
    async fn publish(&self, message: Message) -> Result<(), NegotiationError> {
        // No live receivers is not an error: nobody is listening yet.
        let _ = self.sender.send(message);
        Ok(())
    }
}

#[async_trait]
impl EventSubscriber for LocalEndpoint {
    async fn subscribe(&self, topic_prefix: &str) -> Result<(), NegotiationError> {
        self.prefixes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(topic_prefix.to_string());
        Ok(())
    }

    async fn recv(&self) -> Result<Message, NegotiationError> {
        let mut receiver = self.receiver.lock().await;
        loop {
            match receiver.recv().await {
                Ok(message) => {
                    let wanted = self
                        .prefixes
                        .read()
                        .unwrap_or_else(PoisonError::into_inner)
                        .iter()
                        .any(|p| message.topic.starts_with(p.as_str()));
                    if wanted {
                        return Ok(message);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "local bus receiver lagged, messages dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return Err(NegotiationError::ChannelClosed),
            }
        }
    }
}
