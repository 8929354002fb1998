pub mod kafka_message_repository;
