use futures::FutureExt;
use std::{panic::AssertUnwindSafe, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use super::{message_source::MessageSource, ConsumerRuntimeError};
use crate::processors::message_processor::MessageProcessor;

#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub poll_timeout: Duration,
    pub max_records: usize,
}

/// What a worker went through before stopping
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub stream: String,
    pub nb_handled: u64,
    pub nb_failed: u64,
}

/// Polls the source and hands every message to the processor until cancelled
/// or until a fatal poll error.
///
/// A failing message is logged and counted, the next ones are still handled.
/// The source is closed whatever the outcome.
pub async fn run_worker(
    mut source: Box<dyn MessageSource>,
    processor: Arc<dyn MessageProcessor>,
    poll_settings: PollSettings,
    cancellation_token: CancellationToken,
) -> Result<WorkerReport, ConsumerRuntimeError> {
    let outcome = poll_loop(
        source.as_mut(),
        processor.as_ref(),
        poll_settings,
        &cancellation_token,
    )
    .await;

    source.close();
    outcome
}

async fn poll_loop(
    source: &mut dyn MessageSource,
    processor: &dyn MessageProcessor,
    poll_settings: PollSettings,
    cancellation_token: &CancellationToken,
) -> Result<WorkerReport, ConsumerRuntimeError> {
    let mut report = WorkerReport {
        stream: processor.stream_name().to_string(),
        ..Default::default()
    };

    info!("Starting poll loop on {}", processor.stream_name());
    loop {
        // Only the wait for messages is interrupted, never a message being handled
        let polled = tokio::select! {
            biased;
            _ = cancellation_token.cancelled() => {
                info!("Cancellation requested, leaving the poll loop");
                return Ok(report);
            }
            polled = source.poll_batch(poll_settings.poll_timeout, poll_settings.max_records) => polled,
        };

        let batch = match polled {
            Ok(batch) => batch,
            Err(error @ ConsumerRuntimeError::FatalPoll(_)) => {
                error!(?error, "Fatal error while polling, stopping the worker");
                return Err(error);
            }
            Err(error) => {
                warn!(?error, "Failed to poll messages");
                continue;
            }
        };

        for message in batch {
            let span = info_span!(
                "Handling consumed message",
                stream = %message.stream,
                partition = message.partition,
                offset = message.offset,
                message_id = %uuid::Uuid::new_v4(),
            );

            let outcome = AssertUnwindSafe(processor.handle_message(&message))
                .catch_unwind()
                .instrument(span)
                .await;

            match outcome {
                Ok(true) => report.nb_handled += 1,
                Ok(false) => {
                    warn!(offset = message.offset, "Message not processed, skipping it");
                    report.nb_failed += 1;
                }
                Err(_panic) => {
                    error!(offset = message.offset, "Processor panicked, skipping the message");
                    report.nb_failed += 1;
                }
            }
        }
    }
}
