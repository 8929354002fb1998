use common::constants::streams::{
    JOB_DESCRIPTION_FIELD, PARSED_JOB_FEATURE_EXTRACTOR, PARSED_JOB_STREAM,
};
use std::sync::Arc;

use super::{
    feature_extraction_processor::FeatureExtractionProcessor,
    message_processor::{ConsumerBinding, MessageProcessor},
};
use crate::domain::services::{
    feature_extractor::FeatureExtractor, storage_engine::HybridStorageEngine,
};

/// Consumer group id of a consumer in a deployment: `{group_id_prefix}_{consumer_id}`
pub fn group_id(group_id_prefix: &str, consumer_id: &str) -> String {
    format!("{}_{}", group_id_prefix, consumer_id)
}

/// Every processor run by the worker
pub fn registered_processors(
    group_id_prefix: &str,
    feature_extractor: Arc<dyn FeatureExtractor>,
    storage_engine: Arc<HybridStorageEngine>,
) -> Vec<Arc<dyn MessageProcessor>> {
    vec![Arc::new(FeatureExtractionProcessor::new(
        ConsumerBinding::new(
            PARSED_JOB_STREAM,
            group_id(group_id_prefix, PARSED_JOB_FEATURE_EXTRACTOR),
        ),
        JOB_DESCRIPTION_FIELD,
        feature_extractor,
        storage_engine,
    ))]
}
