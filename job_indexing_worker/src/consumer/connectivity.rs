use rdkafka::{consumer::BaseConsumer, consumer::Consumer, ClientConfig};
use std::time::Duration;
use tracing::{error, info};

/// Checks that the brokers can be reached by listing their streams.
///
/// The connection only lives for the duration of the check.
#[tracing::instrument(name = "Checking broker connectivity")]
pub async fn check_connectivity(bootstrap_servers: &str, timeout: Duration) -> bool {
    let consumer: BaseConsumer = match ClientConfig::new()
        .set("bootstrap.servers", bootstrap_servers)
        .set("socket.timeout.ms", timeout.as_millis().to_string())
        .create()
    {
        Ok(consumer) => consumer,
        Err(error) => {
            error!(?error, "Failed to create the connectivity check client");
            return false;
        }
    };

    // Metadata requests block the calling thread
    let metadata = tokio::task::spawn_blocking(move || consumer.fetch_metadata(None, timeout)).await;

    match metadata {
        Ok(Ok(metadata)) => {
            let streams: Vec<&str> = metadata.topics().iter().map(|topic| topic.name()).collect();
            info!(?streams, "Broker reachable at {}", bootstrap_servers);
            true
        }
        Ok(Err(error)) => {
            error!(?error, "Broker unreachable at {}", bootstrap_servers);
            false
        }
        Err(error) => {
            error!(?error, "Connectivity check did not complete");
            false
        }
    }
}
