pub mod job_vector_store;
