pub mod job_point_qdrant_repository;
