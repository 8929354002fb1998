use common::helper::error_chain_fmt;
use serde_json::Value as JsonValue;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};
use uuid::Uuid;

use super::embeddings::{EmbeddingsService, EmbeddingsServiceError};
use super::fusion::fuse_rankings;
use crate::domain::entities::{
    job_filter::{FilterGroups, JobFilter},
    job_point::{CollectionLayout, JobPoint, ScoredJob, VectorQuery},
    job_record::{text_field, JobRecord},
};
use crate::ports::job_vector_store::{JobVectorStore, JobVectorStoreError};

/// Hybrid retrieval over job collections
///
/// Jobs are written with a dense and a sparse embedding of their text field.
/// Ranked queries search both vector spaces and fuse the two rankings.
pub struct HybridStorageEngine {
    store: Arc<dyn JobVectorStore>,
    embeddings: Arc<dyn EmbeddingsService>,
    filter_groups: FilterGroups,
    /// Field returned by `scroll_one`
    text_field: String,
    dense_size: u64,
    /// Collections whose payload indexes were ensured by this engine
    indexed_collections: Mutex<HashSet<String>>,
}

impl HybridStorageEngine {
    pub fn new(
        store: Arc<dyn JobVectorStore>,
        embeddings: Arc<dyn EmbeddingsService>,
        filter_groups: FilterGroups,
        text_field: &str,
        dense_size: u64,
    ) -> Self {
        Self {
            store,
            embeddings,
            filter_groups,
            text_field: text_field.to_string(),
            dense_size,
            indexed_collections: Mutex::new(HashSet::new()),
        }
    }

    /// Must keys are matched exactly, should keys as full text
    pub fn layout(&self) -> CollectionLayout {
        CollectionLayout {
            dense_size: self.dense_size,
            keyword_index_fields: self.filter_groups.must_keys.clone(),
            text_index_fields: self.filter_groups.should_keys.clone(),
        }
    }

    /// Creates the collection if it does not exist yet. Safe to call before every write.
    ///
    /// The payload indexes of a collection found existing are ensured once per engine,
    /// in case an earlier creation stopped before them.
    #[tracing::instrument(name = "Ensuring collection exists", skip(self))]
    pub async fn ensure_collection(&self, collection: &str) -> Result<(), JobPointRepositoryError> {
        if self.store.collection_exists(collection).await? {
            debug!("Collection {} already exists", collection);
            if !self.is_indexed(collection) {
                self.store
                    .create_payload_indexes(collection, &self.layout())
                    .await?;
                self.mark_indexed(collection);
            }
            return Ok(());
        }

        self.store.create_collection(collection, &self.layout()).await?;
        self.mark_indexed(collection);
        info!("Collection {} created", collection);
        Ok(())
    }

    fn is_indexed(&self, collection: &str) -> bool {
        self.indexed_collections
            .lock()
            .map(|indexed| indexed.contains(collection))
            .unwrap_or(false)
    }

    fn mark_indexed(&self, collection: &str) {
        if let Ok(mut indexed) = self.indexed_collections.lock() {
            indexed.insert(collection.to_string());
        }
    }

    /// Embeds and upserts the records in a single batch.
    ///
    /// `ids` are used as point ids when there is one per record, otherwise fresh ids are generated.
    /// The whole record, `text_field` included, is stored as the payload.
    /// Any failure fails the whole batch. Returns the ids of the written points.
    #[tracing::instrument(
        name = "Uploading jobs",
        skip(self, records, ids),
        fields(nb_records = records.len())
    )]
    pub async fn upload(
        &self,
        records: Vec<JobRecord>,
        text_field_name: &str,
        collection: &str,
        ids: Option<Vec<Uuid>>,
    ) -> Result<Vec<Uuid>, JobPointRepositoryError> {
        self.ensure_collection(collection).await?;
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let ids = match ids {
            Some(ids) if ids.len() == records.len() => ids,
            Some(ids) => {
                debug!(
                    nb_ids = ids.len(),
                    "Ids do not match the records, generating new ones"
                );
                records.iter().map(|_| Uuid::new_v4()).collect()
            }
            None => records.iter().map(|_| Uuid::new_v4()).collect(),
        };

        let mut points = Vec::with_capacity(records.len());
        for (index, (record, id)) in records.into_iter().zip(ids.iter()).enumerate() {
            let text = text_field(&record, text_field_name).ok_or_else(|| {
                JobPointRepositoryError::MissingTextField {
                    field: text_field_name.to_string(),
                    index,
                }
            })?;

            let dense = self.embeddings.encode_dense(text).await?;
            let sparse = self.embeddings.encode_sparse(text).await?;

            points.push(JobPoint {
                id: *id,
                dense,
                sparse,
                payload: record,
            });
        }

        self.store.upsert(collection, points).await?;
        info!("Uploaded {} jobs to {}", ids.len(), collection);

        Ok(ids)
    }

    /// Ranks jobs against the query text by fusing their dense and sparse rankings.
    ///
    /// Both rankings are restricted to the jobs matching `filter` when one is given.
    #[tracing::instrument(name = "Searching jobs", skip(self, filter))]
    pub async fn search(
        &self,
        collection: &str,
        query_text: &str,
        limit: u64,
        filter: Option<&JobFilter>,
    ) -> Result<Vec<ScoredJob>, JobPointRepositoryError> {
        let dense = self.embeddings.encode_dense(query_text).await?;
        let sparse = self.embeddings.encode_sparse(query_text).await?;

        let mut rankings = vec![
            self.store
                .query(collection, &VectorQuery::Dense(dense), limit, filter)
                .await?,
        ];
        // A query without any known term cannot rank anything in the sparse space
        if !sparse.is_empty() {
            rankings.push(
                self.store
                    .query(collection, &VectorQuery::Sparse(sparse), limit, filter)
                    .await?,
            );
        }

        let jobs = fuse_rankings(&rankings, limit as usize);
        debug!(nb_jobs = jobs.len(), "Fused rankings");
        Ok(jobs)
    }

    /// Builds a filter with this deployment's must and should keys
    pub fn build_filter(&self, keyword_map: &HashMap<String, JsonValue>) -> JobFilter {
        JobFilter::build(&self.filter_groups, keyword_map)
    }

    /// Returns the text field of the first job matching the keyword map, without ranking
    #[tracing::instrument(name = "Looking up a job", skip(self))]
    pub async fn scroll_one(
        &self,
        collection: &str,
        keyword_map: &HashMap<String, JsonValue>,
        limit: u32,
    ) -> Result<Option<String>, JobPointRepositoryError> {
        let filter = self.build_filter(keyword_map);
        let payloads = self.store.scroll(collection, &filter, limit).await?;

        Ok(payloads
            .first()
            .and_then(|payload| text_field(payload, &self.text_field))
            .map(str::to_string))
    }
}

#[derive(thiserror::Error)]
pub enum JobPointRepositoryError {
    #[error(transparent)]
    StoreError(#[from] JobVectorStoreError),
    #[error(transparent)]
    EmbeddingsError(#[from] EmbeddingsServiceError),
    #[error("Record {index} has no text in its {field} field")]
    MissingTextField { field: String, index: usize },
}

impl std::fmt::Debug for JobPointRepositoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
