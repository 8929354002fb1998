use async_trait::async_trait;
use common::telemetry::{get_tracing_subscriber, init_tracing_subscriber};
use job_indexing_worker::{
    consumer::{
        message_source::{MessageSource, MessageSourceFactory},
        ConsumerRuntimeError,
    },
    domain::{
        entities::{
            job_filter::{FilterGroups, JobFilter},
            job_point::{CollectionLayout, JobPoint, ScoredJob, SparseVector, VectorQuery},
            job_record::JobRecord,
            message_envelope::MessageEnvelope,
        },
        services::{
            feature_extractor::{FeatureExtractor, FeatureExtractorError},
            hashing_embeddings::HashingEmbeddingsService,
            storage_engine::HybridStorageEngine,
        },
    },
    ports::job_vector_store::{JobVectorStore, JobVectorStoreError},
    processors::message_processor::{ConsumerBinding, MessageProcessor},
};
use once_cell::sync::Lazy;
use serde_json::Value as JsonValue;
use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tokio_util::sync::CancellationToken;

// Ensures that the `tracing` stack is only initialized once using `once_cell`
static TRACING: Lazy<()> = Lazy::new(|| {
    let default_filter_level = "info".to_string();
    let subscriber_name = "test".to_string();

    // The sink is part of the type returned by `get_tracing_subscriber`,
    // hence the 2 branches: one with `stdout`, one with `sink`.
    if std::env::var("TEST_LOG").is_ok() {
        let subscriber =
            get_tracing_subscriber(subscriber_name, default_filter_level, std::io::stdout);
        init_tracing_subscriber(subscriber).expect("Failed to init tracing");
    } else {
        let subscriber =
            get_tracing_subscriber(subscriber_name, default_filter_level, std::io::sink);
        init_tracing_subscriber(subscriber).expect("Failed to init tracing");
    };
});

/// Initializes the tracing system for the integration tests
pub fn init_test() {
    Lazy::force(&TRACING);
}

pub const DENSE_SIZE: u64 = 64;

pub fn as_record(value: JsonValue) -> JobRecord {
    value.as_object().cloned().expect("Not a JSON object")
}

pub fn an_envelope(stream: &str, offset: i64, payload: &str) -> MessageEnvelope {
    MessageEnvelope {
        stream: stream.to_string(),
        partition: 0,
        offset,
        payload: Some(payload.as_bytes().to_vec()),
    }
}

/// A storage engine over an in-memory store, with hashing embeddings
pub fn a_storage_engine(store: Arc<InMemoryJobStore>) -> HybridStorageEngine {
    HybridStorageEngine::new(
        store,
        Arc::new(HashingEmbeddingsService::new(DENSE_SIZE as usize)),
        FilterGroups::default(),
        "description",
        DENSE_SIZE,
    )
}

/// Vector store keeping job collections in memory
///
/// Dense rankings use cosine similarity, sparse rankings the dot product of the shared terms.
#[derive(Default)]
pub struct InMemoryJobStore {
    collections: Mutex<HashMap<String, (CollectionLayout, Vec<JobPoint>)>>,
    nb_collections_created: AtomicUsize,
    nb_index_creations: AtomicUsize,
    fail_upserts: AtomicBool,
}

impl InMemoryJobStore {
    pub fn nb_collections_created(&self) -> usize {
        self.nb_collections_created.load(Ordering::SeqCst)
    }

    pub fn layout(&self, collection: &str) -> Option<CollectionLayout> {
        self.collections
            .lock()
            .unwrap()
            .get(collection)
            .map(|(layout, _)| layout.clone())
    }

    pub fn points(&self, collection: &str) -> Vec<JobPoint> {
        self.collections
            .lock()
            .unwrap()
            .get(collection)
            .map(|(_, points)| points.clone())
            .unwrap_or_default()
    }

    pub fn nb_index_creations(&self) -> usize {
        self.nb_index_creations.load(Ordering::SeqCst)
    }

    pub fn fail_upserts(&self) {
        self.fail_upserts.store(true, Ordering::SeqCst);
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norms = a.iter().map(|x| x * x).sum::<f32>().sqrt() * b.iter().map(|y| y * y).sum::<f32>().sqrt();
    if norms == 0.0 {
        0.0
    } else {
        dot / norms
    }
}

fn sparse_dot(a: &SparseVector, b: &SparseVector) -> f32 {
    a.pairs()
        .iter()
        .filter_map(|(index, value)| {
            b.indices
                .iter()
                .position(|other| other == index)
                .map(|position| value * b.values[position])
        })
        .sum()
}

#[async_trait]
impl JobVectorStore for InMemoryJobStore {
    async fn collection_exists(&self, collection: &str) -> Result<bool, JobVectorStoreError> {
        Ok(self.collections.lock().unwrap().contains_key(collection))
    }

    async fn create_collection(
        &self,
        collection: &str,
        layout: &CollectionLayout,
    ) -> Result<(), JobVectorStoreError> {
        let mut collections = self.collections.lock().unwrap();
        if !collections.contains_key(collection) {
            collections.insert(collection.to_string(), (layout.clone(), Vec::new()));
            self.nb_collections_created.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn create_payload_indexes(
        &self,
        collection: &str,
        layout: &CollectionLayout,
    ) -> Result<(), JobVectorStoreError> {
        let mut collections = self.collections.lock().unwrap();
        let (stored_layout, _) = collections
            .get_mut(collection)
            .ok_or_else(|| JobVectorStoreError::StoreError(format!("No collection {}", collection)))?;

        for field in &layout.keyword_index_fields {
            if !stored_layout.keyword_index_fields.contains(field) {
                stored_layout.keyword_index_fields.push(field.clone());
            }
        }
        for field in &layout.text_index_fields {
            if !stored_layout.text_index_fields.contains(field) {
                stored_layout.text_index_fields.push(field.clone());
            }
        }
        self.nb_index_creations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn upsert(
        &self,
        collection: &str,
        points: Vec<JobPoint>,
    ) -> Result<(), JobVectorStoreError> {
        if self.fail_upserts.load(Ordering::SeqCst) {
            return Err(JobVectorStoreError::StoreError("store unavailable".to_string()));
        }

        let mut collections = self.collections.lock().unwrap();
        let (_, stored) = collections
            .get_mut(collection)
            .ok_or_else(|| JobVectorStoreError::StoreError(format!("No collection {}", collection)))?;

        for point in points {
            stored.retain(|existing| existing.id != point.id);
            stored.push(point);
        }
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        query: &VectorQuery,
        limit: u64,
        filter: Option<&JobFilter>,
    ) -> Result<Vec<ScoredJob>, JobVectorStoreError> {
        let mut scored: Vec<ScoredJob> = self
            .points(collection)
            .into_iter()
            .filter(|point| filter.map(|f| f.matches(&point.payload)).unwrap_or(true))
            .filter_map(|point| {
                let score = match query {
                    VectorQuery::Dense(vector) => cosine(vector, &point.dense),
                    VectorQuery::Sparse(vector) => {
                        let score = sparse_dot(vector, &point.sparse);
                        // Jobs sharing no term are not candidates of a sparse query
                        if score == 0.0 {
                            return None;
                        }
                        score
                    }
                };
                Some(ScoredJob {
                    id: point.id.to_string(),
                    score,
                    payload: point.payload,
                })
            })
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(limit as usize);
        Ok(scored)
    }

    async fn scroll(
        &self,
        collection: &str,
        filter: &JobFilter,
        limit: u32,
    ) -> Result<Vec<JobRecord>, JobVectorStoreError> {
        Ok(self
            .points(collection)
            .into_iter()
            .filter(|point| filter.matches(&point.payload))
            .take(limit as usize)
            .map(|point| point.payload)
            .collect())
    }
}

/// Feature extractor answering the same attributes to every job
pub struct FakeFeatureExtractor {
    attributes: Option<JobRecord>,
    nb_calls: AtomicUsize,
}

impl FakeFeatureExtractor {
    pub fn returning(attributes: JsonValue) -> Self {
        Self {
            attributes: Some(as_record(attributes)),
            nb_calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            attributes: None,
            nb_calls: AtomicUsize::new(0),
        }
    }

    pub fn nb_calls(&self) -> usize {
        self.nb_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeatureExtractor for FakeFeatureExtractor {
    async fn extract(&self, _text: &str) -> Result<JobRecord, FeatureExtractorError> {
        self.nb_calls.fetch_add(1, Ordering::SeqCst);
        self.attributes
            .clone()
            .ok_or_else(|| FeatureExtractorError::UnusableResponse("model unavailable".to_string()))
    }
}

/// Processor recording the offsets it handled
///
/// Fails on a `"fail"` payload and panics on a `"panic"` payload.
pub struct RecordingProcessor {
    binding: ConsumerBinding,
    handled: Mutex<Vec<i64>>,
}

impl RecordingProcessor {
    pub fn new(stream: &str) -> Self {
        Self {
            binding: ConsumerBinding::new(stream, format!("test_{}", stream)),
            handled: Mutex::new(Vec::new()),
        }
    }

    pub fn handled(&self) -> Vec<i64> {
        self.handled.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageProcessor for RecordingProcessor {
    fn binding(&self) -> &ConsumerBinding {
        &self.binding
    }

    async fn handle_message(&self, message: &MessageEnvelope) -> bool {
        match message.payload.as_deref() {
            Some(b"\"panic\"") => panic!("Processor blew up on offset {}", message.offset),
            Some(b"\"fail\"") => false,
            _ => {
                self.handled.lock().unwrap().push(message.offset);
                true
            }
        }
    }
}

pub type ScriptedPoll = Result<Vec<MessageEnvelope>, ConsumerRuntimeError>;

/// Message source replaying scripted polls
///
/// Once the script is over it cancels `when_exhausted` if given, then keeps returning empty batches.
pub struct ScriptedMessageSource {
    polls: VecDeque<ScriptedPoll>,
    when_exhausted: Option<CancellationToken>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl MessageSource for ScriptedMessageSource {
    async fn poll_batch(
        &mut self,
        timeout: Duration,
        _max_records: usize,
    ) -> Result<Vec<MessageEnvelope>, ConsumerRuntimeError> {
        match self.polls.pop_front() {
            Some(poll) => poll,
            None => {
                if let Some(token) = &self.when_exhausted {
                    token.cancel();
                }
                tokio::time::sleep(timeout).await;
                Ok(Vec::new())
            }
        }
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Hands out scripted sources, one per stream, and counts the subscriptions
pub struct ScriptedSourceFactory {
    reachable: bool,
    scripts: Mutex<HashMap<String, VecDeque<ScriptedPoll>>>,
    when_exhausted: Option<CancellationToken>,
    nb_subscriptions: AtomicUsize,
    closed: Mutex<HashMap<String, Arc<AtomicBool>>>,
}

impl ScriptedSourceFactory {
    pub fn new(reachable: bool, when_exhausted: Option<CancellationToken>) -> Self {
        Self {
            reachable,
            scripts: Mutex::new(HashMap::new()),
            when_exhausted,
            nb_subscriptions: AtomicUsize::new(0),
            closed: Mutex::new(HashMap::new()),
        }
    }

    pub fn script(self, stream: &str, polls: Vec<ScriptedPoll>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(stream.to_string(), polls.into());
        self
    }

    pub fn nb_subscriptions(&self) -> usize {
        self.nb_subscriptions.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self, stream: &str) -> bool {
        self.closed
            .lock()
            .unwrap()
            .get(stream)
            .map(|closed| closed.load(Ordering::SeqCst))
            .unwrap_or(false)
    }
}

#[async_trait]
impl MessageSourceFactory for ScriptedSourceFactory {
    async fn check_connectivity(&self) -> bool {
        self.reachable
    }

    fn subscribe(
        &self,
        binding: &ConsumerBinding,
    ) -> Result<Box<dyn MessageSource>, ConsumerRuntimeError> {
        self.nb_subscriptions.fetch_add(1, Ordering::SeqCst);

        let closed = Arc::new(AtomicBool::new(false));
        self.closed
            .lock()
            .unwrap()
            .insert(binding.stream_name().to_string(), closed.clone());

        let polls = self
            .scripts
            .lock()
            .unwrap()
            .remove(binding.stream_name())
            .unwrap_or_default();

        Ok(Box::new(ScriptedMessageSource {
            polls,
            when_exhausted: self.when_exhausted.clone(),
            closed,
        }))
    }
}
