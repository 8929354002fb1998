use async_trait::async_trait;
use futures::FutureExt;
use rdkafka::{
    consumer::{Consumer, StreamConsumer},
    error::KafkaError,
    types::RDKafkaErrorCode,
    ClientConfig,
};
use std::time::Duration;
use tracing::{info, warn};

use super::{connectivity::check_connectivity, ConsumerRuntimeError};
use crate::{
    configuration::KafkaSettings, domain::entities::message_envelope::MessageEnvelope,
    processors::message_processor::ConsumerBinding,
};

/// A subscription to one stream, as one member of a consumer group
#[async_trait]
pub trait MessageSource: Send {
    /// Waits up to `timeout` for messages and returns at most `max_records` of them,
    /// in delivery order. An empty batch means nothing arrived in time.
    async fn poll_batch(
        &mut self,
        timeout: Duration,
        max_records: usize,
    ) -> Result<Vec<MessageEnvelope>, ConsumerRuntimeError>;

    /// Leaves the consumer group. Called once, on every exit path of a worker.
    fn close(&mut self);
}

/// Connects the consumer runtime to the brokers
#[async_trait]
pub trait MessageSourceFactory: Send + Sync {
    async fn check_connectivity(&self) -> bool;

    fn subscribe(
        &self,
        binding: &ConsumerBinding,
    ) -> Result<Box<dyn MessageSource>, ConsumerRuntimeError>;
}

/// Builds the configuration of a consumer for the given consumer group.
///
/// Offsets are committed automatically at a fixed interval: delivery is at-least-once.
pub fn consumer_client_config(settings: &KafkaSettings, group_id: &str) -> ClientConfig {
    let mut client_config = ClientConfig::new();
    client_config
        .set("bootstrap.servers", settings.bootstrap_servers())
        .set("group.id", group_id)
        .set("auto.offset.reset", &settings.auto_offset_reset)
        .set("enable.auto.commit", "true")
        .set(
            "auto.commit.interval.ms",
            settings.auto_commit_interval_ms.to_string(),
        )
        .set(
            "max.poll.interval.ms",
            settings.max_poll_interval_ms.to_string(),
        )
        .set("session.timeout.ms", settings.session_timeout_ms.to_string())
        .set(
            "heartbeat.interval.ms",
            settings.heartbeat_interval_ms.to_string(),
        )
        .set("enable.partition.eof", "false");
    client_config
}

/// Consumes a stream through a Kafka `StreamConsumer`
pub struct KafkaMessageSource {
    consumer: StreamConsumer,
    stream: String,
}

impl KafkaMessageSource {
    #[tracing::instrument(name = "Subscribing to stream", skip(client_config))]
    pub fn try_new(client_config: &ClientConfig, stream: &str) -> Result<Self, KafkaError> {
        let consumer: StreamConsumer = client_config.create()?;
        consumer.subscribe(&[stream])?;
        info!("Subscribed to {}", stream);

        Ok(Self {
            consumer,
            stream: stream.to_string(),
        })
    }
}

/// Only fatal errors stop a worker, the others are expected to clear up by themselves
fn poll_error(error: KafkaError) -> ConsumerRuntimeError {
    if error.rdkafka_error_code() == Some(RDKafkaErrorCode::Fatal) {
        ConsumerRuntimeError::FatalPoll(error)
    } else {
        ConsumerRuntimeError::Poll(error)
    }
}

#[async_trait]
impl MessageSource for KafkaMessageSource {
    async fn poll_batch(
        &mut self,
        timeout: Duration,
        max_records: usize,
    ) -> Result<Vec<MessageEnvelope>, ConsumerRuntimeError> {
        let first = match tokio::time::timeout(timeout, self.consumer.recv()).await {
            Err(_elapsed) => return Ok(Vec::new()),
            Ok(Err(error)) => return Err(poll_error(error)),
            Ok(Ok(message)) => MessageEnvelope::from_message(&message),
        };

        // Drains what is already buffered without waiting again
        let mut batch = vec![first];
        while batch.len() < max_records {
            match self.consumer.recv().now_or_never() {
                Some(Ok(message)) => batch.push(MessageEnvelope::from_message(&message)),
                Some(Err(error)) => {
                    warn!(?error, "Failed to receive a buffered message");
                    break;
                }
                None => break,
            }
        }

        Ok(batch)
    }

    fn close(&mut self) {
        self.consumer.unsubscribe();
        info!("Unsubscribed from {}", self.stream);
    }
}

/// Creates one `KafkaMessageSource` per processor
pub struct KafkaMessageSourceFactory {
    settings: KafkaSettings,
}

impl KafkaMessageSourceFactory {
    pub fn new(settings: KafkaSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl MessageSourceFactory for KafkaMessageSourceFactory {
    async fn check_connectivity(&self) -> bool {
        check_connectivity(
            &self.settings.bootstrap_servers(),
            self.settings.preflight_timeout(),
        )
        .await
    }

    fn subscribe(
        &self,
        binding: &ConsumerBinding,
    ) -> Result<Box<dyn MessageSource>, ConsumerRuntimeError> {
        let client_config = consumer_client_config(&self.settings, binding.group_id());
        let source = KafkaMessageSource::try_new(&client_config, binding.stream_name()).map_err(
            |source| ConsumerRuntimeError::Subscription {
                stream: binding.stream_name().to_string(),
                source,
            },
        )?;

        Ok(Box::new(source))
    }
}
