pub mod feature_extraction_processor;
pub mod message_processor;
pub mod registry;
