use async_trait::async_trait;
use std::collections::BTreeMap;

use super::{
    embeddings::{EmbeddingsService, EmbeddingsServiceError},
    helpers::{fnv1a_32, tokenize},
};
use crate::domain::entities::job_point::{DenseVector, SparseVector};

/// In-process embeddings computed by feature hashing of the text tokens.
///
/// - dense: each token adds ±1 to the dimension its hash falls in, then the vector is L2 normalized
/// - sparse: the term frequency of each token, keyed by the token hash
///
/// No model is involved: similar texts are close only as far as they share words.
pub struct HashingEmbeddingsService {
    dimension: usize,
}

impl HashingEmbeddingsService {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    pub fn dense(&self, text: &str) -> DenseVector {
        let mut vector = vec![0f32; self.dimension];

        for token in tokenize(text) {
            let hash = fnv1a_32(&token);
            let position = hash as usize % self.dimension;
            // The highest bit picks the sign so colliding tokens tend to cancel out
            let sign = if hash >> 31 == 0 { 1.0 } else { -1.0 };
            vector[position] += sign;
        }

        let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|value| *value /= norm);
        }

        vector
    }

    pub fn sparse(&self, text: &str) -> SparseVector {
        let mut frequencies: BTreeMap<u32, f32> = BTreeMap::new();
        for token in tokenize(text) {
            *frequencies.entry(fnv1a_32(&token)).or_default() += 1.0;
        }

        let (indices, values) = frequencies.into_iter().unzip();
        SparseVector { indices, values }
    }
}

#[async_trait]
impl EmbeddingsService for HashingEmbeddingsService {
    async fn encode_dense(&self, text: &str) -> Result<DenseVector, EmbeddingsServiceError> {
        Ok(self.dense(text))
    }

    async fn encode_sparse(&self, text: &str) -> Result<SparseVector, EmbeddingsServiceError> {
        Ok(self.sparse(text))
    }
}
