use std::sync::Arc;

use async_trait::async_trait;

use crate::error::NegotiationError;
use crate::message::Message;

/// Broadcast side of the negotiation channel.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, message: Message) -> Result<(), NegotiationError>;
}

/// Blanket implementation so `Arc<dyn EventPublisher>` can be used directly.
#[async_trait]
impl<T: EventPublisher + ?Sized> EventPublisher for Arc<T> {
    async fn publish(&self, message: Message) -> Result<(), NegotiationError> {
        (**self).publish(message).await
    }
}

/// Receiving side of the negotiation channel.
///
/// Every instance subscribes to the channel it publishes on, so it also
/// receives its own messages.
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    /// Only deliver messages whose topic starts with `topic_prefix`.
    async fn subscribe(&self, topic_prefix: &str) -> Result<(), NegotiationError>;

    /// Wait for the next message.
    async fn recv(&self) -> Result<Message, NegotiationError>;
}

#[async_trait]
impl<T: EventSubscriber + ?Sized> EventSubscriber for Arc<T> {
    async fn subscribe(&self, topic_prefix: &str) -> Result<(), NegotiationError> {
        (**self).subscribe(topic_prefix).await
    }

    async fn recv(&self) -> Result<Message, NegotiationError> {
        (**self).recv().await
    }
}
