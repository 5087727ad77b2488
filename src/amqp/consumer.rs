//! Broker consumer for coordination messages
//!
//! Exactly one long-lived consumer runs per service instance and is shared
//! by all connections. Messages are acknowledged after processing; a failed
//! handler still acknowledges, so one bad message cannot wedge the queue.
//! The next `UPDATE` for the bucket retries the work.

use crate::amqp::messages::CoordinationMessage;
use crate::error::{MatchmakerError, Result};
use amqprs::{
    channel::{
        BasicAckArguments, BasicCancelArguments, BasicConsumeArguments, Channel,
        QueueDeclareArguments,
    },
    consumer::AsyncConsumer,
    BasicProperties, Deliver,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Trait implemented by whatever processes coordination messages
#[async_trait]
pub trait CoordinationHandler: Send + Sync {
    async fn handle(&self, message: CoordinationMessage) -> Result<()>;
}

/// Consumer over the shared coordination queue
pub struct CoordinationConsumer {
    handler: Arc<dyn CoordinationHandler>,
    channel: Channel,
    consumer_tag: String,
}

impl CoordinationConsumer {
    pub fn new(handler: Arc<dyn CoordinationHandler>, channel: Channel) -> Self {
        let consumer_tag = format!("matchmaker-consumer-{}", uuid::Uuid::new_v4());

        Self {
            handler,
            channel,
            consumer_tag,
        }
    }

    /// Start consuming messages with manual acknowledgment
    pub async fn start(&self, queue_name: &str) -> Result<()> {
        let declare = QueueDeclareArguments::durable_client_named(queue_name);
        self.channel.queue_declare(declare).await.map_err(|e| {
            MatchmakerError::AmqpConnectionFailed {
                message: format!("Failed to declare coordination queue: {}", e),
            }
        })?;

        let args = BasicConsumeArguments::new(queue_name, &self.consumer_tag)
            .manual_ack(true)
            .finish();

        self.channel
            .basic_consume(MessageConsumer::new(self.handler.clone()), args)
            .await
            .map_err(|e| MatchmakerError::AmqpConnectionFailed {
                message: format!("Failed to start consuming: {}", e),
            })?;

        info!("Started consuming coordination messages from '{}'", queue_name);
        Ok(())
    }

    /// Stop consuming messages
    pub async fn stop(&self) -> Result<()> {
        let args = BasicCancelArguments::new(&self.consumer_tag);

        self.channel.basic_cancel(args).await.map_err(|e| {
            MatchmakerError::AmqpConnectionFailed {
                message: format!("Failed to stop consuming: {}", e),
            }
        })?;

        info!("Stopped consuming coordination messages");
        Ok(())
    }
}

/// Internal consumer implementation
struct MessageConsumer {
    handler: Arc<dyn CoordinationHandler>,
}

impl MessageConsumer {
    fn new(handler: Arc<dyn CoordinationHandler>) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl AsyncConsumer for MessageConsumer {
    async fn consume(
        &mut self,
        channel: &Channel,
        deliver: Deliver,
        _basic_properties: BasicProperties,
        content: Vec<u8>,
    ) {
        let delivery_tag = deliver.delivery_tag();
        debug!(
            "Coordination message received - delivery_tag: {}, size: {} bytes",
            delivery_tag,
            content.len()
        );

        match CoordinationMessage::from_bytes(&content) {
            Ok(message) => {
                if let Err(e) = self.handler.handle(message).await {
                    // Losing one match cycle is recoverable; acknowledge
                    // anyway so the message does not poison the queue.
                    error!(
                        "Coordination handler failed - delivery_tag: {}, error: {}",
                        delivery_tag, e
                    );
                }
            }
            Err(e) => {
                error!(
                    "Discarding undecodable coordination message - delivery_tag: {}, error: {}",
                    delivery_tag, e
                );
            }
        }

        if let Err(e) = channel
            .basic_ack(BasicAckArguments::new(delivery_tag, false))
            .await
        {
            error!(
                "Failed to acknowledge message - delivery_tag: {}, error: {}",
                delivery_tag, e
            );
        }
    }
}
