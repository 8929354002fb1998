use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::message_processor::{ConsumerBinding, MessageProcessor};
use crate::domain::{
    entities::{
        job_record::{merge_enrichment, text_field, JobRecord},
        message_envelope::MessageEnvelope,
    },
    services::{feature_extractor::FeatureExtractor, storage_engine::HybridStorageEngine},
};

/// Field from which the identity of a job is derived
pub const JOB_URL_FIELD: &str = "url";

/// Enriches parsed jobs with extracted features and indexes them
///
/// Jobs are stored in the collection named after the consumed stream.
pub struct FeatureExtractionProcessor {
    binding: ConsumerBinding,
    text_field: String,
    feature_extractor: Arc<dyn FeatureExtractor>,
    storage_engine: Arc<HybridStorageEngine>,
}

impl FeatureExtractionProcessor {
    pub fn new(
        binding: ConsumerBinding,
        text_field: &str,
        feature_extractor: Arc<dyn FeatureExtractor>,
        storage_engine: Arc<HybridStorageEngine>,
    ) -> Self {
        Self {
            binding,
            text_field: text_field.to_string(),
            feature_extractor,
            storage_engine,
        }
    }

    /// Same stream and url, same point: a redelivered job replaces its previous version
    fn point_id(&self, record: &JobRecord) -> Option<Uuid> {
        text_field(record, JOB_URL_FIELD).map(|url| job_point_id(self.stream_name(), url))
    }
}

/// Deterministic point id of the job published at `url` on `stream`
pub fn job_point_id(stream: &str, url: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, format!("{}/{}", stream, url).as_bytes())
}

#[async_trait]
impl MessageProcessor for FeatureExtractionProcessor {
    fn binding(&self) -> &ConsumerBinding {
        &self.binding
    }

    #[tracing::instrument(name = "Extracting features and indexing job", skip(self, message))]
    async fn handle_message(&self, message: &MessageEnvelope) -> bool {
        let record = match message.try_decoding() {
            Ok(Some(record)) => record,
            Ok(None) => {
                info!("Null job received, nothing to index");
                return true;
            }
            Err(error) => {
                error!(?error, "Failed to decode job");
                return false;
            }
        };

        let Some(text) = text_field(&record, &self.text_field) else {
            warn!("Job has no {} to extract features from", self.text_field);
            return false;
        };

        let attributes = match self.feature_extractor.extract(text).await {
            Ok(attributes) => attributes,
            Err(error) => {
                error!(?error, "Failed to extract job features");
                return false;
            }
        };
        debug!(nb_attributes = attributes.len(), "Extracted job features");

        let enriched = merge_enrichment(record, attributes);
        if enriched.is_empty() {
            return true;
        }

        let ids = self.point_id(&enriched).map(|id| vec![id]);
        match self
            .storage_engine
            .upload(vec![enriched], &self.text_field, self.stream_name(), ids)
            .await
        {
            Ok(ids) => {
                info!(?ids, "Indexed enriched job");
                true
            }
            Err(error) => {
                error!(?error, "Failed to index enriched job");
                false
            }
        }
    }
}
