pub mod connectivity;
pub mod message_source;
pub mod worker;

use common::helper::error_chain_fmt;
use futures::future::join_all;
use rdkafka::error::KafkaError;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument};

use crate::processors::message_processor::MessageProcessor;
use message_source::MessageSourceFactory;
use worker::{run_worker, PollSettings, WorkerReport};

/// Runs one worker per registered processor
pub struct ConsumerRuntime {
    source_factory: Arc<dyn MessageSourceFactory>,
    processors: Vec<Arc<dyn MessageProcessor>>,
    poll_settings: PollSettings,
}

impl ConsumerRuntime {
    pub fn new(source_factory: Arc<dyn MessageSourceFactory>, poll_settings: PollSettings) -> Self {
        Self {
            source_factory,
            processors: Vec::new(),
            poll_settings,
        }
    }

    pub fn register(&mut self, processor: Arc<dyn MessageProcessor>) {
        self.processors.push(processor);
    }

    /// Checks the brokers can be reached, then runs every worker until they all stop.
    ///
    /// Nothing is subscribed to when the brokers are unreachable.
    /// Workers are stopped through the cancellation token.
    #[tracing::instrument(name = "Running consumer runtime", skip(self, cancellation_token))]
    pub async fn run(
        self,
        cancellation_token: CancellationToken,
    ) -> Result<Vec<Result<WorkerReport, ConsumerRuntimeError>>, ConsumerRuntimeError> {
        let Self {
            source_factory,
            processors,
            poll_settings,
        } = self;

        if !source_factory.check_connectivity().await {
            error!("Brokers unreachable, no consumer started");
            return Err(ConsumerRuntimeError::Connectivity);
        }

        let workers = processors.into_iter().map(|processor| {
            let source_factory = source_factory.clone();
            let cancellation_token = cancellation_token.clone();
            let span = info_span!(
                "Consumer worker",
                stream = processor.stream_name(),
                group_id = processor.group_id(),
            );

            tokio::spawn(
                async move {
                    let source = source_factory.subscribe(processor.binding())?;
                    run_worker(source, processor, poll_settings, cancellation_token).await
                }
                .instrument(span),
            )
        });

        let results: Vec<Result<WorkerReport, ConsumerRuntimeError>> = join_all(workers)
            .await
            .into_iter()
            .map(|joined| {
                joined.unwrap_or_else(|e| Err(ConsumerRuntimeError::WorkerAborted(e.to_string())))
            })
            .collect();

        info!(?results, "All consumer workers stopped");
        Ok(results)
    }
}

#[derive(thiserror::Error)]
pub enum ConsumerRuntimeError {
    #[error("Brokers are unreachable")]
    Connectivity,
    #[error("Failed to subscribe to stream {stream}")]
    Subscription {
        stream: String,
        #[source]
        source: KafkaError,
    },
    #[error("Failed to poll messages")]
    Poll(#[source] KafkaError),
    #[error("Fatal error while polling messages")]
    FatalPoll(#[source] KafkaError),
    #[error("Consumer worker stopped abruptly: {0}")]
    WorkerAborted(String),
}

impl std::fmt::Debug for ConsumerRuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
