use claims::{assert_err, assert_none, assert_ok, assert_some_eq};
use job_indexing_worker::{
    domain::{
        entities::job_point::{CollectionLayout, VectorQuery},
        services::{
            embeddings::EmbeddingsService, fusion::fuse_rankings,
            hashing_embeddings::HashingEmbeddingsService,
        },
    },
    ports::job_vector_store::JobVectorStore,
};
use serde_json::{json, Value as JsonValue};
use std::{collections::HashMap, sync::Arc};
use uuid::Uuid;

use crate::helpers::{a_storage_engine, as_record, init_test, InMemoryJobStore, DENSE_SIZE};

const COLLECTION: &str = "parsed_job.topic";

fn keyword_map(value: JsonValue) -> HashMap<String, JsonValue> {
    serde_json::from_value(value).unwrap()
}

fn a_corpus() -> Vec<serde_json::Map<String, JsonValue>> {
    vec![
        as_record(json!({
            "url": "https://jobs.example.com/1",
            "job_position": "Backend Engineer",
            "suburb": "Sydney",
            "description": "Java backend engineer building payment APIs in Sydney",
        })),
        as_record(json!({
            "url": "https://jobs.example.com/2",
            "job_position": "Registered Nurse",
            "suburb": "Perth",
            "description": "Registered nurse for night shifts in Perth hospital",
        })),
        as_record(json!({
            "url": "https://jobs.example.com/3",
            "job_position": "Data Scientist",
            "suburb": "Melbourne",
            "description": "Data scientist working on machine learning models in Melbourne",
        })),
    ]
}

#[tokio::test]
async fn a_collection_is_created_once_with_both_vector_spaces_and_its_payload_indexes() {
    init_test();
    let store = Arc::new(InMemoryJobStore::default());
    let storage_engine = a_storage_engine(store.clone());

    assert_ok!(storage_engine.ensure_collection(COLLECTION).await);
    assert_ok!(storage_engine.ensure_collection(COLLECTION).await);

    assert_eq!(store.nb_collections_created(), 1);
    assert_eq!(store.nb_index_creations(), 0);
    let layout = store.layout(COLLECTION).unwrap();
    assert_eq!(layout.dense_size, DENSE_SIZE);
    assert_eq!(layout.keyword_index_fields, vec!["url", "id"]);
    assert_eq!(layout.text_index_fields, vec!["job_position", "suburb"]);
}

#[tokio::test]
async fn the_indexes_of_a_collection_created_without_them_are_added_once() {
    init_test();
    let store = Arc::new(InMemoryJobStore::default());
    let storage_engine = a_storage_engine(store.clone());
    let unindexed = CollectionLayout {
        dense_size: DENSE_SIZE,
        keyword_index_fields: vec![],
        text_index_fields: vec![],
    };
    assert_ok!(store.create_collection(COLLECTION, &unindexed).await);

    assert_ok!(storage_engine.ensure_collection(COLLECTION).await);
    assert_ok!(storage_engine.ensure_collection(COLLECTION).await);

    assert_eq!(store.nb_collections_created(), 1);
    assert_eq!(store.nb_index_creations(), 1);
    let layout = store.layout(COLLECTION).unwrap();
    assert_eq!(layout.keyword_index_fields, vec!["url", "id"]);
    assert_eq!(layout.text_index_fields, vec!["job_position", "suburb"]);
}

#[tokio::test]
async fn uploaded_jobs_keep_their_whole_payload_and_the_given_ids() {
    init_test();
    let store = Arc::new(InMemoryJobStore::default());
    let storage_engine = a_storage_engine(store.clone());
    let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();

    let uploaded = assert_ok!(
        storage_engine
            .upload(a_corpus(), "description", COLLECTION, Some(ids.clone()))
            .await
    );

    assert_eq!(uploaded, ids);
    let points = store.points(COLLECTION);
    assert_eq!(points.len(), 3);
    assert_eq!(points[0].id, ids[0]);
    assert_eq!(points[0].payload, a_corpus()[0]);
    assert_eq!(points[0].dense.len(), DENSE_SIZE as usize);
    assert!(!points[0].sparse.is_empty());
}

#[tokio::test]
async fn ids_not_matching_the_records_are_replaced_by_fresh_ones() {
    init_test();
    let store = Arc::new(InMemoryJobStore::default());
    let storage_engine = a_storage_engine(store.clone());
    let too_few_ids = vec![Uuid::new_v4()];

    let uploaded = assert_ok!(
        storage_engine
            .upload(a_corpus(), "description", COLLECTION, Some(too_few_ids.clone()))
            .await
    );

    assert_eq!(uploaded.len(), 3);
    assert!(!uploaded.contains(&too_few_ids[0]));

    // Without ids, uploading the same jobs again duplicates them
    assert_ok!(
        storage_engine
            .upload(a_corpus(), "description", COLLECTION, None)
            .await
    );
    assert_eq!(store.points(COLLECTION).len(), 6);
}

#[tokio::test]
async fn a_job_without_text_fails_the_whole_batch() {
    init_test();
    let store = Arc::new(InMemoryJobStore::default());
    let storage_engine = a_storage_engine(store.clone());
    let mut records = a_corpus();
    records[1].remove("description");

    assert_err!(
        storage_engine
            .upload(records, "description", COLLECTION, None)
            .await
    );

    assert!(store.points(COLLECTION).is_empty());
}

#[tokio::test]
async fn a_job_is_found_first_when_querying_its_own_description() {
    init_test();
    let store = Arc::new(InMemoryJobStore::default());
    let storage_engine = a_storage_engine(store.clone());
    let ids = assert_ok!(
        storage_engine
            .upload(a_corpus(), "description", COLLECTION, None)
            .await
    );

    for (record, id) in a_corpus().iter().zip(ids) {
        let description = record["description"].as_str().unwrap();

        let jobs = assert_ok!(storage_engine.search(COLLECTION, description, 1, None).await);

        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, id.to_string());
        assert_eq!(&jobs[0].payload, record);
    }
}

#[tokio::test]
async fn search_fuses_the_dense_and_sparse_rankings() {
    init_test();
    let store = Arc::new(InMemoryJobStore::default());
    let storage_engine = a_storage_engine(store.clone());
    assert_ok!(
        storage_engine
            .upload(a_corpus(), "description", COLLECTION, None)
            .await
    );
    let query = "engineer in Sydney";
    let limit = 2;

    let embeddings = HashingEmbeddingsService::new(DENSE_SIZE as usize);
    let dense = assert_ok!(
        store
            .query(
                COLLECTION,
                &VectorQuery::Dense(assert_ok!(embeddings.encode_dense(query).await)),
                limit,
                None
            )
            .await
    );
    let sparse = assert_ok!(
        store
            .query(
                COLLECTION,
                &VectorQuery::Sparse(assert_ok!(embeddings.encode_sparse(query).await)),
                limit,
                None
            )
            .await
    );
    let expected = fuse_rankings(&[dense, sparse], limit as usize);

    let jobs = assert_ok!(storage_engine.search(COLLECTION, query, limit, None).await);

    assert!(!jobs.is_empty());
    assert_eq!(jobs, expected);
}

#[tokio::test]
async fn a_filter_restricts_both_rankings() {
    init_test();
    let store = Arc::new(InMemoryJobStore::default());
    let storage_engine = a_storage_engine(store.clone());
    assert_ok!(
        storage_engine
            .upload(a_corpus(), "description", COLLECTION, None)
            .await
    );
    let filter = storage_engine.build_filter(&keyword_map(json!({"suburb": "perth"})));

    let jobs = assert_ok!(
        storage_engine
            .search(COLLECTION, "Java backend engineer", 10, Some(&filter))
            .await
    );

    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].payload["url"], json!("https://jobs.example.com/2"));
}

#[tokio::test]
async fn an_exact_url_lookup_returns_the_job_description_or_nothing() {
    init_test();
    let store = Arc::new(InMemoryJobStore::default());
    let storage_engine = a_storage_engine(store.clone());
    assert_ok!(
        storage_engine
            .upload(a_corpus(), "description", COLLECTION, None)
            .await
    );

    let found = assert_ok!(
        storage_engine
            .scroll_one(
                COLLECTION,
                &keyword_map(json!({"url": "https://jobs.example.com/1"})),
                1
            )
            .await
    );
    let not_found = assert_ok!(
        storage_engine
            .scroll_one(
                COLLECTION,
                &keyword_map(json!({"url": "https://jobs.example.com/1/"})),
                1
            )
            .await
    );

    assert_some_eq!(
        found,
        "Java backend engineer building payment APIs in Sydney".to_string()
    );
    assert_none!(not_found);
}

#[tokio::test]
async fn a_lookup_on_a_value_without_exact_form_finds_nothing() {
    init_test();
    let store = Arc::new(InMemoryJobStore::default());
    let storage_engine = a_storage_engine(store.clone());
    let mut records = a_corpus();
    records[0].insert("id".to_string(), json!(7));
    assert_ok!(
        storage_engine
            .upload(records, "description", COLLECTION, None)
            .await
    );

    for keyword_map_value in [
        json!({"url": ["https://jobs.example.com/1"]}),
        json!({"id": 1.5}),
        json!({"url": {"href": "https://jobs.example.com/1"}}),
    ] {
        let found = assert_ok!(
            storage_engine
                .scroll_one(COLLECTION, &keyword_map(keyword_map_value), 1)
                .await
        );

        assert_none!(found);
    }

    let found = assert_ok!(
        storage_engine
            .scroll_one(COLLECTION, &keyword_map(json!({"id": 7.0})), 1)
            .await
    );
    assert_some_eq!(
        found,
        "Java backend engineer building payment APIs in Sydney".to_string()
    );
}
