use std::collections::HashMap;

use async_trait::async_trait;
use qdrant_client::{
    qdrant::{
        condition::ConditionOneOf, point_id::PointIdOptions, r#match::MatchValue, value::Kind,
        vectors::VectorsOptions, Condition, CreateCollectionBuilder,
        CreateFieldIndexCollectionBuilder, Distance, FieldCondition, FieldType, Filter, HasIdCondition, Match,
        Modifier, NamedVectors, PointId, PointStruct, QueryPointsBuilder, ScrollPointsBuilder,
        SparseVectorParamsBuilder, SparseVectorsConfigBuilder, UpsertPointsBuilder, Value,
        Vector, VectorParamsBuilder, Vectors, VectorsConfigBuilder,
    },
    Payload, Qdrant,
};
use serde_json::Value as JsonValue;
use tracing::{debug, info};

use crate::domain::entities::{
    job_filter::{ExactValue, JobFilter},
    job_point::{
        CollectionLayout, JobPoint, ScoredJob, VectorQuery, DENSE_VECTOR_NAME, SPARSE_VECTOR_NAME,
    },
    job_record::JobRecord,
};
use crate::ports::job_vector_store::{JobVectorStore, JobVectorStoreError};

/// Repository for job points persisted in Qdrant
pub struct JobPointQdrantRepository {
    client: Qdrant,
}

impl JobPointQdrantRepository {
    pub fn new(client: Qdrant) -> Self {
        Self { client }
    }
}

#[async_trait]
impl JobVectorStore for JobPointQdrantRepository {
    #[tracing::instrument(name = "Checking Qdrant collection existence", skip(self))]
    async fn collection_exists(&self, collection: &str) -> Result<bool, JobVectorStoreError> {
        self.client
            .collection_exists(collection)
            .await
            .map_err(|e| JobVectorStoreError::StoreError(e.to_string()))
    }

    /// Creates the collection with its dense and sparse vector spaces, then its payload indexes
    #[tracing::instrument(name = "Creating Qdrant collection", skip(self))]
    async fn create_collection(
        &self,
        collection: &str,
        layout: &CollectionLayout,
    ) -> Result<(), JobVectorStoreError> {
        let mut vectors_config = VectorsConfigBuilder::default();
        vectors_config.add_named_vector_params(
            DENSE_VECTOR_NAME,
            VectorParamsBuilder::new(layout.dense_size, Distance::Cosine).build(),
        );

        let mut sparse_vectors_config = SparseVectorsConfigBuilder::default();
        sparse_vectors_config.add_named_vector_params(
            SPARSE_VECTOR_NAME,
            SparseVectorParamsBuilder::default().modifier(Modifier::Idf),
        );

        match self
            .client
            .create_collection(
                CreateCollectionBuilder::new(collection)
                    .vectors_config(vectors_config)
                    .sparse_vectors_config(sparse_vectors_config),
            )
            .await
        {
            Ok(_) => info!("Created collection {}", collection),
            Err(error) => {
                // Another worker may have created it in between, maybe without its indexes yet
                if !error.to_string().contains("already exists") {
                    return Err(JobVectorStoreError::StoreError(error.to_string()));
                }
                debug!("Collection {} already exists", collection);
            }
        };

        self.create_payload_indexes(collection, layout).await
    }

    #[tracing::instrument(name = "Creating Qdrant payload indexes", skip(self))]
    async fn create_payload_indexes(
        &self,
        collection: &str,
        layout: &CollectionLayout,
    ) -> Result<(), JobVectorStoreError> {
        let indexes = layout
            .keyword_index_fields
            .iter()
            .map(|field| (field, FieldType::Keyword))
            .chain(
                layout
                    .text_index_fields
                    .iter()
                    .map(|field| (field, FieldType::Text)),
            );

        for (field, field_type) in indexes {
            self.client
                .create_field_index(CreateFieldIndexCollectionBuilder::new(
                    collection, field, field_type,
                ))
                .await
                .map_err(|e| JobVectorStoreError::StoreError(e.to_string()))?;
            debug!(?field_type, "Created payload index on {}", field);
        }

        Ok(())
    }

    #[tracing::instrument(
        name = "Saving job points to Qdrant",
        skip(self, points),
        fields(nb_points = points.len())
    )]
    async fn upsert(
        &self,
        collection: &str,
        points: Vec<JobPoint>,
    ) -> Result<(), JobVectorStoreError> {
        let points = points
            .into_iter()
            .map(PointStruct::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, points).wait(true))
            .await
            .map_err(|e| JobVectorStoreError::StoreError(e.to_string()))?;

        info!("Saved job points");
        Ok(())
    }

    #[tracing::instrument(name = "Querying job points from Qdrant", skip(self, query, filter))]
    async fn query(
        &self,
        collection: &str,
        query: &VectorQuery,
        limit: u64,
        filter: Option<&JobFilter>,
    ) -> Result<Vec<ScoredJob>, JobVectorStoreError> {
        let builder = match query {
            VectorQuery::Dense(vector) => QueryPointsBuilder::new(collection)
                .query(vector.clone())
                .using(DENSE_VECTOR_NAME),
            VectorQuery::Sparse(vector) => QueryPointsBuilder::new(collection)
                .query(vector.pairs())
                .using(SPARSE_VECTOR_NAME),
        };
        let mut builder = builder.limit(limit).with_payload(true);
        if let Some(filter) = filter {
            builder = builder.filter(to_qdrant_filter(filter));
        }

        let response = self
            .client
            .query(builder)
            .await
            .map_err(|e| JobVectorStoreError::StoreError(e.to_string()))?;

        Ok(response
            .result
            .into_iter()
            .map(|point| ScoredJob {
                id: point_id_to_string(point.id),
                score: point.score,
                payload: payload_to_record(point.payload),
            })
            .collect())
    }

    #[tracing::instrument(name = "Scrolling job points from Qdrant", skip(self))]
    async fn scroll(
        &self,
        collection: &str,
        filter: &JobFilter,
        limit: u32,
    ) -> Result<Vec<JobRecord>, JobVectorStoreError> {
        let response = self
            .client
            .scroll(
                ScrollPointsBuilder::new(collection)
                    .filter(to_qdrant_filter(filter))
                    .limit(limit)
                    .with_payload(true)
                    .with_vectors(false),
            )
            .await
            .map_err(|e| JobVectorStoreError::StoreError(e.to_string()))?;

        Ok(response
            .result
            .into_iter()
            .map(|point| payload_to_record(point.payload))
            .collect())
    }
}

impl TryFrom<JobPoint> for PointStruct {
    type Error = JobVectorStoreError;

    fn try_from(job_point: JobPoint) -> Result<Self, Self::Error> {
        let payload = Payload::try_from(JsonValue::Object(job_point.payload))
            .map_err(|e| JobVectorStoreError::PayloadError(e.to_string()))?;

        let vectors = Vectors {
            vectors_options: Some(VectorsOptions::Vectors(NamedVectors {
                vectors: HashMap::from([
                    (DENSE_VECTOR_NAME.to_string(), Vector::from(job_point.dense)),
                    (
                        SPARSE_VECTOR_NAME.to_string(),
                        Vector::from(job_point.sparse.pairs()),
                    ),
                ]),
            })),
        };

        Ok(PointStruct::new(job_point.id.to_string(), vectors, payload))
    }
}

/// Translates a job filter into Qdrant `must` and `should` clauses
pub fn to_qdrant_filter(filter: &JobFilter) -> Filter {
    let must = filter
        .must
        .iter()
        .map(|(key, value)| {
            let match_value = match value {
                ExactValue::Keyword(keyword) => MatchValue::Keyword(keyword.clone()),
                ExactValue::Integer(integer) => MatchValue::Integer(*integer),
                ExactValue::Boolean(boolean) => MatchValue::Boolean(*boolean),
                ExactValue::Unmatchable(_) => return no_point_condition(),
            };
            field_condition(key, match_value)
        })
        .collect();

    let should = filter
        .should
        .iter()
        .map(|(key, text)| field_condition(key, MatchValue::Text(text.clone())))
        .collect();

    Filter {
        must,
        should,
        ..Default::default()
    }
}

fn field_condition(key: &str, match_value: MatchValue) -> Condition {
    Condition {
        condition_one_of: Some(ConditionOneOf::Field(FieldCondition {
            key: key.to_string(),
            r#match: Some(Match {
                match_value: Some(match_value),
            }),
            ..Default::default()
        })),
    }
}

/// Holds for no point: membership in an empty id set
fn no_point_condition() -> Condition {
    Condition {
        condition_one_of: Some(ConditionOneOf::HasId(HasIdCondition { has_id: Vec::new() })),
    }
}

fn point_id_to_string(point_id: Option<PointId>) -> String {
    match point_id.and_then(|id| id.point_id_options) {
        Some(PointIdOptions::Uuid(uuid)) => uuid,
        Some(PointIdOptions::Num(num)) => num.to_string(),
        None => String::new(),
    }
}

fn payload_to_record(payload: HashMap<String, Value>) -> JobRecord {
    payload
        .into_iter()
        .map(|(key, value)| (key, value_to_json(value)))
        .collect()
}

/// Converts a Qdrant payload value back to JSON
pub fn value_to_json(value: Value) -> JsonValue {
    match value.kind {
        None | Some(Kind::NullValue(_)) => JsonValue::Null,
        Some(Kind::BoolValue(boolean)) => JsonValue::Bool(boolean),
        Some(Kind::IntegerValue(integer)) => JsonValue::from(integer),
        Some(Kind::DoubleValue(double)) => serde_json::Number::from_f64(double)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        Some(Kind::StringValue(text)) => JsonValue::String(text),
        Some(Kind::ListValue(list)) => {
            JsonValue::Array(list.values.into_iter().map(value_to_json).collect())
        }
        Some(Kind::StructValue(structure)) => JsonValue::Object(
            structure
                .fields
                .into_iter()
                .map(|(key, value)| (key, value_to_json(value)))
                .collect(),
        ),
    }
}
