use async_trait::async_trait;
use common::helper::error_chain_fmt;

use crate::domain::entities::{
    job_filter::JobFilter,
    job_point::{CollectionLayout, JobPoint, ScoredJob, VectorQuery},
    job_record::JobRecord,
};

/// Vector store holding job collections
///
/// Each call is a single request against one collection.
/// Upserts on the same collection are serialized by the store itself.
#[async_trait]
pub trait JobVectorStore: Send + Sync {
    async fn collection_exists(&self, collection: &str) -> Result<bool, JobVectorStoreError>;

    /// Creates the collection and its payload indexes.
    /// Creating a collection that already exists is not an error.
    async fn create_collection(
        &self,
        collection: &str,
        layout: &CollectionLayout,
    ) -> Result<(), JobVectorStoreError>;

    /// Creates the payload indexes of the layout, existing ones are left as they are
    async fn create_payload_indexes(
        &self,
        collection: &str,
        layout: &CollectionLayout,
    ) -> Result<(), JobVectorStoreError>;

    /// Writes all points in one request, replacing points with the same id
    async fn upsert(&self, collection: &str, points: Vec<JobPoint>)
        -> Result<(), JobVectorStoreError>;

    /// Ranks up to `limit` points in the vector space of the query, best first
    async fn query(
        &self,
        collection: &str,
        query: &VectorQuery,
        limit: u64,
        filter: Option<&JobFilter>,
    ) -> Result<Vec<ScoredJob>, JobVectorStoreError>;

    /// Unranked scan of up to `limit` payloads matching the filter
    async fn scroll(
        &self,
        collection: &str,
        filter: &JobFilter,
        limit: u32,
    ) -> Result<Vec<JobRecord>, JobVectorStoreError>;
}

#[derive(thiserror::Error)]
pub enum JobVectorStoreError {
    #[error("Error from the vector store: {0}")]
    StoreError(String),
    #[error("Invalid job payload: {0}")]
    PayloadError(String),
}

impl std::fmt::Debug for JobVectorStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
