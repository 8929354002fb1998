pub mod embeddings;
pub mod extraction_cleaning;
pub mod feature_extractor;
pub mod fusion;
pub mod hashing_embeddings;
pub mod helpers;
pub mod huggingface_embeddings;
pub mod ollama_feature_extractor;
pub mod storage_engine;
