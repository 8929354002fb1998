use clap::Parser;
use common::telemetry::{get_tracing_subscriber, init_tracing_subscriber};
use job_indexing_worker::{
    cli::{keyword_map, Cli, Command},
    configuration::{get_configuration, Settings},
    startup::{build_message_repository, build_storage_engine, Application, ApplicationError},
};
use serde_json::Value as JsonValue;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), ApplicationError> {
    let tracing_subscriber = get_tracing_subscriber(
        "job_indexing_worker".into(),
        "info".into(),
        std::io::stdout,
    );
    if let Err(error) = init_tracing_subscriber(tracing_subscriber) {
        eprintln!("Failed to initialize tracing: {:?}", error);
    }

    let cli = Cli::parse();

    // Panics if the configuration can't be read
    let configuration = get_configuration().expect("Failed to read configuration.");

    let outcome = match cli.command.unwrap_or(Command::Consume) {
        Command::Consume => consume(configuration).await,
        Command::Publish { stream, file } => publish(configuration, &stream, &file).await,
        Command::Search {
            collection,
            query,
            limit,
            filters,
        } => {
            let storage_engine = build_storage_engine(&configuration.qdrant, &configuration.embeddings)?;
            let filter = storage_engine.build_filter(&keyword_map(filters));
            let filter = (!filter.is_empty()).then_some(filter);

            storage_engine
                .search(&collection, &query, limit, filter.as_ref())
                .await
                .map_err(ApplicationError::from)
                .and_then(|jobs| {
                    for job in jobs {
                        println!("{}", serde_json::to_string(&job)?);
                    }
                    Ok(())
                })
        }
        Command::Lookup {
            collection,
            filters,
            limit,
        } => {
            let storage_engine = build_storage_engine(&configuration.qdrant, &configuration.embeddings)?;

            storage_engine
                .scroll_one(&collection, &keyword_map(filters), limit)
                .await
                .map_err(ApplicationError::from)
                .map(|text| {
                    if let Some(text) = text {
                        println!("{}", JsonValue::String(text));
                    }
                })
        }
    };

    if let Err(error) = &outcome {
        error!(?error, "Job indexing worker failed");
    }
    outcome
}

async fn consume(configuration: Settings) -> Result<(), ApplicationError> {
    let cancellation_token = CancellationToken::new();
    let shutdown = stop_signal()?;
    let signal_token = cancellation_token.clone();
    tokio::spawn(async move {
        shutdown.await;
        signal_token.cancel();
    });

    let application = Application::build(configuration).await?;
    application.run_until_stopped(cancellation_token).await?;

    Ok(())
}

/// Listens for the stop signals, the returned future resolves on the first one received
fn stop_signal() -> Result<impl std::future::Future<Output = ()>, ApplicationError> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        Ok(async move {
            tokio::select! {
                _ = sigterm.recv() => info!("Received SIGTERM, stopping the consumers"),
                _ = sigint.recv() => info!("Received SIGINT, stopping the consumers"),
            }
        })
    }

    #[cfg(not(unix))]
    {
        Ok(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received Ctrl+C, stopping the consumers"),
                Err(error) => error!(?error, "Failed to listen for Ctrl+C"),
            }
        })
    }
}

async fn publish(
    configuration: Settings,
    stream: &str,
    file: &std::path::Path,
) -> Result<(), ApplicationError> {
    let records: Vec<Option<JsonValue>> = serde_json::from_str(&std::fs::read_to_string(file)?)?;

    let message_repository = build_message_repository(&configuration.kafka)?;
    let nb_sent = message_repository
        .provision_and_publish(
            stream,
            configuration.kafka.default_partitions,
            configuration.kafka.default_replication,
            &records,
        )
        .await;

    println!("{}", serde_json::json!({"stream": stream, "nb_sent": nb_sent}));
    Ok(())
}
