use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::embeddings::{EmbeddingsService, EmbeddingsServiceError};
use crate::domain::entities::job_point::{DenseVector, SparseVector};

/// Service to generate embeddings through HuggingFace text-embeddings-inference servers.
///
/// Dense and sparse vectors usually come from two different models,
/// hence two base urls: `POST {dense_url}/embed` and `POST {sparse_url}/embed_sparse`.
pub struct HuggingFaceEmbeddingsService {
    http_client: reqwest::Client,
    dense_url: String,
    sparse_url: String,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    inputs: &'a str,
}

#[derive(Deserialize)]
struct SparseValue {
    index: u32,
    value: f32,
}

impl HuggingFaceEmbeddingsService {
    pub fn try_new(
        dense_url: &str,
        sparse_url: &str,
        timeout: Duration,
    ) -> Result<Self, EmbeddingsServiceError> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http_client,
            dense_url: dense_url.trim_end_matches('/').to_string(),
            sparse_url: sparse_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl EmbeddingsService for HuggingFaceEmbeddingsService {
    #[tracing::instrument(name = "Generate dense embeddings", skip(self, text))]
    async fn encode_dense(&self, text: &str) -> Result<DenseVector, EmbeddingsServiceError> {
        let embeddings: Vec<DenseVector> = self
            .http_client
            .post(format!("{}/embed", self.dense_url))
            .json(&EmbedRequest { inputs: text })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let vector = embeddings
            .into_iter()
            .next()
            .ok_or(EmbeddingsServiceError::EmptyResponse)?;
        debug!(dimension = vector.len(), "Generated dense embeddings");

        Ok(vector)
    }

    #[tracing::instrument(name = "Generate sparse embeddings", skip(self, text))]
    async fn encode_sparse(&self, text: &str) -> Result<SparseVector, EmbeddingsServiceError> {
        let embeddings: Vec<Vec<SparseValue>> = self
            .http_client
            .post(format!("{}/embed_sparse", self.sparse_url))
            .json(&EmbedRequest { inputs: text })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let mut values = embeddings
            .into_iter()
            .next()
            .ok_or(EmbeddingsServiceError::EmptyResponse)?;
        values.sort_by_key(|value| value.index);
        values.dedup_by_key(|value| value.index);
        debug!(nb_terms = values.len(), "Generated sparse embeddings");

        Ok(SparseVector {
            indices: values.iter().map(|value| value.index).collect(),
            values: values.iter().map(|value| value.value).collect(),
        })
    }
}
