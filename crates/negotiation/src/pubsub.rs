use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};
use zeromq::prelude::*;
use zeromq::{PubSocket, SubSocket, ZmqMessage};

use crate::error::NegotiationError;
use crate::message::Message;
use crate::traits::{EventPublisher, EventSubscriber};
use crate::transport::Transport;

/// PUB side of the negotiation channel.
///
/// Each instance binds its own PUB socket; peers (and the instance itself)
/// connect SUB sockets to it. Frames are `[topic, envelope]`.
pub struct ZmqPublisher {
    socket: Mutex<PubSocket>,
}

impl ZmqPublisher {
    #[instrument(skip_all, fields(endpoint = %transport))]
    pub async fn bind(transport: &Transport) -> Result<Self, NegotiationError> {
        transport
            .ensure_ipc_dir()
            .and_then(|_| transport.remove_stale_socket())
            .map_err(|e| NegotiationError::Transport(e.to_string()))?;

        let mut socket = PubSocket::new();
        let endpoint = transport.endpoint();
        info!(endpoint = %endpoint, "binding negotiation PUB socket");
        socket.bind(&endpoint).await?;
        Ok(Self {
            socket: Mutex::new(socket),
        })
    }
}

#[async_trait]
impl EventPublisher for ZmqPublisher {
    async fn publish(&self, message: Message) -> Result<(), NegotiationError> {
        let topic = message.topic.clone();
        let envelope = message.to_bytes()?;

        let mut frames = ZmqMessage::from(topic.as_str());
        frames.push_back(envelope.into());

        let mut socket = self.socket.lock().await;
        socket.send(frames).await?;
        debug!(topic = %topic, "published negotiation message");
        Ok(())
    }
}

/// SUB side of the negotiation channel, connected to every peer's PUB socket.
pub struct ZmqSubscriber {
    socket: Mutex<SubSocket>,
}

impl ZmqSubscriber {
    #[instrument(skip_all, fields(peers = peers.len()))]
    pub async fn connect(peers: &[Transport]) -> Result<Self, NegotiationError> {
        let mut socket = SubSocket::new();
        for peer in peers {
            let endpoint = peer.endpoint();
            info!(endpoint = %endpoint, "connecting negotiation SUB socket");
            socket.connect(&endpoint).await?;
        }
        Ok(Self {
            socket: Mutex::new(socket),
        })
    }
}

#[async_trait]
impl EventSubscriber for ZmqSubscriber {
    async fn subscribe(&self, topic_prefix: &str) -> Result<(), NegotiationError> {
        let mut socket = self.socket.lock().await;
        socket.subscribe(topic_prefix).await?;
        info!(topic_prefix = %topic_prefix, "subscribed to negotiation topic");
        Ok(())
    }

    /// Expects `[topic, envelope]`; a single frame is taken as the envelope.
    async fn recv(&self) -> Result<Message, NegotiationError> {
        let mut socket = self.socket.lock().await;
        let zmq_msg = socket.recv().await?;

        let frames: Vec<_> = zmq_msg.iter().collect();
        let bytes = match frames.len() {
            0 => return Err(NegotiationError::Transport("empty ZMQ message".into())),
            1 => frames[0].as_ref(),
            _ => frames[1].as_ref(),
        };
        let message = Message::from_bytes(bytes)?;
        debug!(topic = %message.topic, sender = %message.sender, "received negotiation message");
        Ok(message)
    }
}
