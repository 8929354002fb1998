use async_trait::async_trait;
use common::helper::error_chain_fmt;

use crate::domain::entities::job_point::{DenseVector, SparseVector};

/// Encodes texts into the two vector spaces of a job collection.
///
/// Both encodings must be deterministic for identical input.
#[async_trait]
pub trait EmbeddingsService: Send + Sync {
    async fn encode_dense(&self, text: &str) -> Result<DenseVector, EmbeddingsServiceError>;

    async fn encode_sparse(&self, text: &str) -> Result<SparseVector, EmbeddingsServiceError>;
}

#[derive(thiserror::Error)]
pub enum EmbeddingsServiceError {
    #[error("Embeddings request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Embeddings service returned no vector for the given text")]
    EmptyResponse,
}

impl std::fmt::Debug for EmbeddingsServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
