use async_trait::async_trait;
use common::helper::error_chain_fmt;

use crate::domain::entities::job_record::JobRecord;

/// Extracts structured attributes (skills, seniority, employment type...) from a job description.
///
/// May return an empty map. The given text is never altered.
#[async_trait]
pub trait FeatureExtractor: Send + Sync {
    async fn extract(&self, text: &str) -> Result<JobRecord, FeatureExtractorError>;
}

#[derive(thiserror::Error)]
pub enum FeatureExtractorError {
    #[error("Feature extraction request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Feature extraction returned unusable data: {0}")]
    UnusableResponse(String),
}

impl std::fmt::Debug for FeatureExtractorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
