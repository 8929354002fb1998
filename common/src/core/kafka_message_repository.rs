use std::time::Duration;

use rdkafka::{
    admin::{AdminClient, AdminOptions, NewTopic, TopicReplication},
    client::DefaultClientContext,
    error::KafkaError,
    producer::{FutureProducer, FutureRecord, Producer},
    types::RDKafkaErrorCode,
    ClientConfig,
};
use serde::Serialize;
use tracing::{error, info, warn};
use typed_builder::TypedBuilder;

use crate::helper::error_chain_fmt;

/// Connection and timing options of a `KafkaMessageRepository`
#[derive(Debug, Clone, TypedBuilder)]
pub struct KafkaMessageRepositoryOptions {
    /// Comma separated `host:port` list of the brokers
    #[builder(setter(into))]
    pub bootstrap_servers: String,
    #[builder(default = Duration::from_millis(30_000))]
    pub request_timeout: Duration,
    #[builder(default = Duration::from_millis(30_000))]
    pub metadata_max_age: Duration,
    /// Upper bound of a stream provisioning request
    #[builder(default = Duration::from_millis(10_000))]
    pub provisioning_timeout: Duration,
    /// Upper bound to flush the records still queued after a `publish`
    #[builder(default = Duration::from_millis(30_000))]
    pub flush_timeout: Duration,
}

/// What happened to a stream during `ensure_stream`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamProvisioning {
    Created,
    AlreadyExisted,
    /// Provisioning failed and was logged: publishing can still be attempted
    Failed(String),
}

/// Message repository implemented with Kafka
///
/// Provisions streams (topics) and publishes JSON records onto them.
/// Publishing is fire-and-forget: a record that cannot be enqueued is logged and skipped,
/// deliveries are not tracked and nothing is retried.
pub struct KafkaMessageRepository {
    producer: FutureProducer,
    admin_client: AdminClient<DefaultClientContext>,
    options: KafkaMessageRepositoryOptions,
}

impl KafkaMessageRepository {
    /// Builds the producer and admin clients.
    ///
    /// No connection is opened here: librdkafka connects lazily on the first request.
    #[tracing::instrument(name = "Building the Kafka message repository")]
    pub fn try_new(
        options: KafkaMessageRepositoryOptions,
    ) -> Result<Self, KafkaMessageRepositoryError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &options.bootstrap_servers)
            .set(
                "request.timeout.ms",
                options.request_timeout.as_millis().to_string(),
            )
            .set(
                "metadata.max.age.ms",
                options.metadata_max_age.as_millis().to_string(),
            )
            .create()?;

        let admin_client: AdminClient<DefaultClientContext> = ClientConfig::new()
            .set("bootstrap.servers", &options.bootstrap_servers)
            .create()?;

        Ok(Self {
            producer,
            admin_client,
            options,
        })
    }

    /// Ensures a stream exists, creating it if needed.
    ///
    /// Idempotent: an existing stream is logged and left untouched.
    /// A provisioning failure never fails the caller, it is only logged and reported.
    #[tracing::instrument(name = "Ensuring stream exists", skip(self))]
    pub async fn ensure_stream(
        &self,
        stream: &str,
        partitions: i32,
        replication: i32,
    ) -> StreamProvisioning {
        let new_topic = NewTopic::new(stream, partitions, TopicReplication::Fixed(replication));
        let admin_options = AdminOptions::new()
            .request_timeout(Some(self.options.provisioning_timeout))
            .operation_timeout(Some(self.options.provisioning_timeout));

        let results = match self
            .admin_client
            .create_topics(&[new_topic], &admin_options)
            .await
        {
            Ok(results) => results,
            Err(error) => {
                warn!(?error, "Failed to provision stream {}", stream);
                return StreamProvisioning::Failed(error.to_string());
            }
        };

        match results.into_iter().next() {
            Some(Ok(name)) => {
                info!("Stream {} created", name);
                StreamProvisioning::Created
            }
            Some(Err((name, RDKafkaErrorCode::TopicAlreadyExists))) => {
                info!("Stream {} already exists", name);
                StreamProvisioning::AlreadyExisted
            }
            Some(Err((name, code))) => {
                warn!(?code, "Failed to create stream {}", name);
                StreamProvisioning::Failed(code.to_string())
            }
            None => {
                warn!("No provisioning result returned for stream {}", stream);
                StreamProvisioning::Failed("no result returned by the broker".to_string())
            }
        }
    }

    /// Provisions the stream, then publishes the records on it.
    ///
    /// Records are published even when provisioning failed.
    /// Returns the number of records handed over to the producer.
    #[tracing::instrument(name = "Provisioning stream and publishing records", skip(self, records))]
    pub async fn provision_and_publish<R: Serialize>(
        &self,
        stream: &str,
        partitions: i32,
        replication: i32,
        records: &[R],
    ) -> usize {
        self.ensure_stream(stream, partitions, replication).await;
        self.publish(stream, records).await
    }

    /// Publishes each record as a UTF-8 JSON message on the given stream.
    ///
    /// A record that fails to serialize or to be enqueued is logged and skipped,
    /// the rest of the batch is still sent.
    /// Returns the number of records handed over to the producer.
    #[tracing::instrument(name = "Publishing records", skip(self, records), fields(nb_records = records.len()))]
    pub async fn publish<R: Serialize>(&self, stream: &str, records: &[R]) -> usize {
        let mut nb_enqueued = 0;

        for (index, record) in records.iter().enumerate() {
            let payload = match encode_record(record) {
                Ok(payload) => payload,
                Err(error) => {
                    error!(?error, "Failed to serialize record {} for stream {}", index, stream);
                    continue;
                }
            };

            // The delivery future is dropped: deliveries are not tracked
            match self
                .producer
                .send_result(FutureRecord::<(), Vec<u8>>::to(stream).payload(&payload))
            {
                Ok(_delivery) => nb_enqueued += 1,
                Err((error, _record)) => {
                    error!(?error, "Failed to send record {} to stream {}", index, stream);
                }
            }
        }

        // Flushing blocks until the queue is drained or the timeout expires
        let producer = self.producer.clone();
        let flush_timeout = self.options.flush_timeout;
        match tokio::task::spawn_blocking(move || producer.flush(flush_timeout)).await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => error!(?error, "Failed to flush records sent to stream {}", stream),
            Err(error) => error!(?error, "Flushing records sent to stream {} aborted", stream),
        }

        info!("{} of {} records sent to {}", nb_enqueued, records.len(), stream);
        nb_enqueued
    }
}

/// Serializes a record to its wire format: UTF-8 JSON, `null` for an absent record
pub fn encode_record<R: Serialize + ?Sized>(record: &R) -> Result<Vec<u8>, KafkaMessageRepositoryError> {
    Ok(serde_json::to_vec(record)?)
}

#[derive(thiserror::Error)]
pub enum KafkaMessageRepositoryError {
    #[error(transparent)]
    KafkaError(#[from] KafkaError),
    #[error("Error while serializing record: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl std::fmt::Debug for KafkaMessageRepositoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
