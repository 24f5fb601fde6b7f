//! Kafka event channel.
//!
//! Events are published as JSON to one topic, keyed by order id so that
//! every event of an order lands on the same partition.

use std::time::Duration;

use async_trait::async_trait;
use domain::OrderEvent;
use rdkafka::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use tracing::{debug, info};

use crate::{ChannelError, EventChannel, ORDER_EVENTS_TOPIC, Result};

/// Configuration for the Kafka producer.
#[derive(Clone, Debug)]
pub struct KafkaEventChannelConfig {
    /// Kafka bootstrap servers (comma-separated).
    pub bootstrap_servers: String,
    /// Topic events are published to.
    pub topic: String,
    /// How long the producer waits for an acknowledgement.
    pub message_timeout: Duration,
}

impl KafkaEventChannelConfig {
    /// Creates a config for the default order events topic.
    pub fn new(bootstrap_servers: impl Into<String>) -> Self {
        Self {
            bootstrap_servers: bootstrap_servers.into(),
            topic: ORDER_EVENTS_TOPIC.to_string(),
            message_timeout: Duration::from_secs(5),
        }
    }

    /// Set the topic.
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    /// Set the acknowledgement timeout.
    pub fn with_message_timeout(mut self, timeout: Duration) -> Self {
        self.message_timeout = timeout;
        self
    }

    fn build_producer_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config.set("bootstrap.servers", &self.bootstrap_servers);
        config.set(
            "message.timeout.ms",
            self.message_timeout.as_millis().to_string(),
        );
        config.set("acks", "all");
        config.set("enable.idempotence", "true");
        config
    }
}

/// Kafka-backed event channel.
pub struct KafkaEventChannel {
    producer: FutureProducer,
    config: KafkaEventChannelConfig,
}

impl KafkaEventChannel {
    /// Creates the producer.
    pub fn new(config: KafkaEventChannelConfig) -> Result<Self> {
        let producer: FutureProducer = config.build_producer_config().create().map_err(|e| {
            ChannelError::Connection(format!("Failed to create Kafka producer: {}", e))
        })?;

        info!(
            bootstrap_servers = %config.bootstrap_servers,
            topic = %config.topic,
            "Connected to Kafka"
        );

        Ok(Self { producer, config })
    }
}

#[async_trait]
impl EventChannel for KafkaEventChannel {
    async fn publish(&self, key: &str, event: &OrderEvent) -> Result<()> {
        let payload = serde_json::to_string(event)?;
        let record = FutureRecord::to(&self.config.topic)
            .key(key)
            .payload(&payload);

        self.producer
            .send(record, self.config.message_timeout)
            .await
            .map_err(|(e, _)| ChannelError::Publish(format!("Failed to publish: {}", e)))?;

        debug!(
            topic = %self.config.topic,
            key = %key,
            event_type = %event.event_type,
            "Published order event to Kafka"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = KafkaEventChannelConfig::new("localhost:9092");
        assert_eq!(config.topic, "order-events");

        let producer = config.build_producer_config();
        assert_eq!(producer.get("acks"), Some("all"));
        assert_eq!(producer.get("enable.idempotence"), Some("true"));
        assert_eq!(producer.get("message.timeout.ms"), Some("5000"));
    }

    #[test]
    fn test_config_overrides() {
        let config = KafkaEventChannelConfig::new("broker:9092")
            .with_topic("orders.v2")
            .with_message_timeout(Duration::from_millis(750));
        assert_eq!(config.topic, "orders.v2");
        assert_eq!(
            config.build_producer_config().get("message.timeout.ms"),
            Some("750")
        );
    }
}
