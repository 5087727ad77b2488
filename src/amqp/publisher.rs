//! AMQP publisher for coordination messages

use crate::amqp::messages::{CoordinationMessage, MATCHMAKER_QUEUE};
use crate::error::{MatchmakerError, Result};
use amqprs::{
    channel::{BasicPublishArguments, Channel, QueueDeclareArguments},
    BasicProperties,
};
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Trait for publishing coordination messages to the shared queue
#[async_trait]
pub trait CoordinationPublisher: Send + Sync {
    async fn publish(&self, message: CoordinationMessage) -> Result<()>;
}

/// Configuration for message publishing
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 500,
        }
    }
}

/// AMQP-based publisher implementation
pub struct AmqpCoordinationPublisher {
    channel: Channel,
    config: PublisherConfig,
}

impl AmqpCoordinationPublisher {
    /// Create a new publisher and make sure the shared queue exists
    pub async fn new(channel: Channel, config: PublisherConfig) -> Result<Self> {
        let args = QueueDeclareArguments::durable_client_named(MATCHMAKER_QUEUE);
        channel.queue_declare(args).await.map_err(|e| {
            MatchmakerError::AmqpConnectionFailed {
                message: format!("Failed to declare coordination queue: {}", e),
            }
        })?;

        info!("Declared coordination queue '{}'", MATCHMAKER_QUEUE);
        Ok(Self { channel, config })
    }

    /// Single publish attempt to the default exchange
    async fn try_publish(&self, payload: Vec<u8>) -> Result<()> {
        let args = BasicPublishArguments::new("", MATCHMAKER_QUEUE);
        let mut properties = BasicProperties::default();
        properties.with_content_type("application/json");

        self.channel
            .basic_publish(properties, payload, args)
            .await
            .map_err(|e| MatchmakerError::AmqpConnectionFailed {
                message: format!("Failed to publish coordination message: {}", e),
            })?;

        Ok(())
    }
}

#[async_trait]
impl CoordinationPublisher for AmqpCoordinationPublisher {
    async fn publish(&self, message: CoordinationMessage) -> Result<()> {
        let payload = message.to_bytes()?;

        let mut retry_count = 0;
        let mut delay = Duration::from_millis(self.config.retry_delay_ms);

        loop {
            match self.try_publish(payload.clone()).await {
                Ok(_) => {
                    debug!("Published coordination message: {:?}", message);
                    return Ok(());
                }
                Err(e) => {
                    retry_count += 1;
                    if retry_count > self.config.max_retries {
                        error!(
                            "Failed to publish coordination message after {} retries: {}",
                            self.config.max_retries, e
                        );
                        return Err(e);
                    }

                    warn!(
                        "Publish attempt {} failed: {}. Retrying in {:?}",
                        retry_count, e, delay
                    );

                    sleep(delay).await;
                    delay = Duration::from_millis((delay.as_millis() as u64 * 2).min(5000));
                }
            }
        }
    }
}

/// Mock publisher for testing
#[derive(Debug, Default)]
pub struct MockCoordinationPublisher {
    published: std::sync::Mutex<Vec<CoordinationMessage>>,
}

impl MockCoordinationPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all published messages (for testing)
    pub fn published(&self) -> Vec<CoordinationMessage> {
        self.published
            .lock()
            .map(|messages| messages.clone())
            .unwrap_or_default()
    }

    /// Clear captured messages (for testing)
    pub fn clear(&self) {
        if let Ok(mut messages) = self.published.lock() {
            messages.clear();
        }
    }
}

#[async_trait]
impl CoordinationPublisher for MockCoordinationPublisher {
    async fn publish(&self, message: CoordinationMessage) -> Result<()> {
        if let Ok(mut messages) = self.published.lock() {
            messages.push(message);
        }
        Ok(())
    }
}
