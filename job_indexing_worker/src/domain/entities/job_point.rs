use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::job_record::JobRecord;

/// Name of the dense vector space of a job collection (part of the stored schema)
pub const DENSE_VECTOR_NAME: &str = "dense";
/// Name of the sparse vector space of a job collection (part of the stored schema)
pub const SPARSE_VECTOR_NAME: &str = "sparse";

pub type DenseVector = Vec<f32>;

/// Term-weight vector: only the non-zero dimensions are kept, `indices` sorted and unique
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

impl SparseVector {
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// (index, weight) pairs
    pub fn pairs(&self) -> Vec<(u32, f32)> {
        self.indices
            .iter()
            .copied()
            .zip(self.values.iter().copied())
            .collect()
    }
}

/// The persisted unit of a job collection
#[derive(Debug, Clone)]
pub struct JobPoint {
    pub id: Uuid,
    pub dense: DenseVector,
    pub sparse: SparseVector,
    /// The whole enriched record, encoded field included
    pub payload: JobRecord,
}

/// A job returned by a query, with the score it was ranked by
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredJob {
    pub id: String,
    pub score: f32,
    pub payload: JobRecord,
}

/// Which vector space a query ranks candidates in
#[derive(Debug, Clone)]
pub enum VectorQuery {
    Dense(DenseVector),
    Sparse(SparseVector),
}

/// Shape of a job collection: its two vector spaces and its payload indexes
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionLayout {
    pub dense_size: u64,
    /// Fields indexed for exact matches
    pub keyword_index_fields: Vec<String>,
    /// Fields indexed for full-text matches
    pub text_index_fields: Vec<String>,
}
