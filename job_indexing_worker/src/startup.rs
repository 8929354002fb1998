use common::core::kafka_message_repository::{
    KafkaMessageRepository, KafkaMessageRepositoryError, KafkaMessageRepositoryOptions,
};
use qdrant_client::Qdrant;
use secrecy::ExposeSecret;
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{
    configuration::{
        EmbeddingsProvider, EmbeddingsSettings, FeatureExtractionSettings, KafkaSettings,
        QdrantSettings, Settings,
    },
    consumer::{
        message_source::KafkaMessageSourceFactory,
        worker::{PollSettings, WorkerReport},
        ConsumerRuntime, ConsumerRuntimeError,
    },
    domain::services::{
        embeddings::{EmbeddingsService, EmbeddingsServiceError},
        feature_extractor::{FeatureExtractor, FeatureExtractorError},
        hashing_embeddings::HashingEmbeddingsService,
        huggingface_embeddings::HuggingFaceEmbeddingsService,
        ollama_feature_extractor::OllamaFeatureExtractor,
        storage_engine::{HybridStorageEngine, JobPointRepositoryError},
    },
    processors::registry::registered_processors,
    repositories::job_point_qdrant_repository::JobPointQdrantRepository,
};

/// Holds the consumer runtime, ready to be run
pub struct Application {
    consumer_runtime: ConsumerRuntime,
}

impl Application {
    #[tracing::instrument(name = "Building worker application", skip(settings))]
    pub async fn build(settings: Settings) -> Result<Self, ApplicationError> {
        settings
            .kafka
            .validate_timers()
            .map_err(ApplicationError::ConfigurationError)?;

        let storage_engine = Arc::new(build_storage_engine(
            &settings.qdrant,
            &settings.embeddings,
        )?);
        let feature_extractor = build_feature_extractor(&settings.feature_extraction)?;

        let mut consumer_runtime = ConsumerRuntime::new(
            Arc::new(KafkaMessageSourceFactory::new(settings.kafka.clone())),
            PollSettings {
                poll_timeout: settings.kafka.poll_timeout(),
                max_records: settings.kafka.max_poll_records,
            },
        );

        for processor in registered_processors(
            &settings.kafka.group_id_prefix,
            feature_extractor,
            storage_engine,
        ) {
            info!(
                stream = processor.stream_name(),
                group_id = processor.group_id(),
                "Registering processor"
            );
            consumer_runtime.register(processor);
        }

        Ok(Self { consumer_runtime })
    }

    /// Runs the application until stopped
    ///
    /// Cancelling the token stops every worker after its current iteration.
    pub async fn run_until_stopped(
        self,
        cancellation_token: CancellationToken,
    ) -> Result<Vec<Result<WorkerReport, ConsumerRuntimeError>>, ApplicationError> {
        let worker_results = self.consumer_runtime.run(cancellation_token).await?;

        info!(
            "Application stopped with the following results: {:?}",
            worker_results
        );

        info!("👋 Bye!");
        Ok(worker_results)
    }
}

/// Set up a client to Qdrant
pub fn get_qdrant_client(config: &QdrantSettings) -> Result<Qdrant, ApplicationError> {
    let mut qdrant_config = Qdrant::from_url(&config.get_grpc_base_url())
        .timeout(Duration::from_millis(config.request_timeout_ms));
    if let Some(api_key) = &config.api_key {
        qdrant_config = qdrant_config.api_key(api_key.expose_secret().to_string());
    }

    qdrant_config
        .build()
        .map_err(|e| ApplicationError::QdrantError(e.to_string()))
}

pub fn build_embeddings_service(
    config: &EmbeddingsSettings,
    dense_size: u64,
) -> Result<Arc<dyn EmbeddingsService>, ApplicationError> {
    let embeddings_service: Arc<dyn EmbeddingsService> = match config.provider {
        EmbeddingsProvider::Http => Arc::new(HuggingFaceEmbeddingsService::try_new(
            &config.dense_url,
            &config.sparse_url,
            Duration::from_millis(config.request_timeout_ms),
        )?),
        EmbeddingsProvider::Hashing => Arc::new(HashingEmbeddingsService::new(dense_size as usize)),
    };

    Ok(embeddings_service)
}

pub fn build_feature_extractor(
    config: &FeatureExtractionSettings,
) -> Result<Arc<dyn FeatureExtractor>, ApplicationError> {
    Ok(Arc::new(OllamaFeatureExtractor::try_new(
        &config.url,
        &config.model,
        Duration::from_millis(config.request_timeout_ms),
    )?))
}

/// Wires the Qdrant repository and the embeddings service into a storage engine
pub fn build_storage_engine(
    qdrant_config: &QdrantSettings,
    embeddings_config: &EmbeddingsSettings,
) -> Result<HybridStorageEngine, ApplicationError> {
    let store = Arc::new(JobPointQdrantRepository::new(get_qdrant_client(
        qdrant_config,
    )?));
    let embeddings = build_embeddings_service(embeddings_config, qdrant_config.dense_vector_size)?;

    Ok(HybridStorageEngine::new(
        store,
        embeddings,
        qdrant_config.filter_groups(),
        &qdrant_config.text_field,
        qdrant_config.dense_vector_size,
    ))
}

pub fn build_message_repository(
    config: &KafkaSettings,
) -> Result<KafkaMessageRepository, ApplicationError> {
    let options = KafkaMessageRepositoryOptions::builder()
        .bootstrap_servers(config.bootstrap_servers())
        .request_timeout(Duration::from_millis(config.request_timeout_ms))
        .metadata_max_age(Duration::from_millis(config.metadata_max_age_ms))
        .build();

    Ok(KafkaMessageRepository::try_new(options)?)
}

#[derive(thiserror::Error, Debug)]
pub enum ApplicationError {
    #[error("Invalid configuration: {0}")]
    ConfigurationError(String),
    #[error("Error from Qdrant: {0}")]
    QdrantError(String),
    #[error(transparent)]
    EmbeddingsServiceError(#[from] EmbeddingsServiceError),
    #[error(transparent)]
    FeatureExtractorError(#[from] FeatureExtractorError),
    #[error(transparent)]
    KafkaMessageRepositoryError(#[from] KafkaMessageRepositoryError),
    #[error(transparent)]
    ConsumerRuntimeError(#[from] ConsumerRuntimeError),
    #[error(transparent)]
    JobPointRepositoryError(#[from] JobPointRepositoryError),
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    #[error("Invalid JSON records: {0}")]
    JsonError(#[from] serde_json::Error),
}
