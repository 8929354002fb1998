pub mod job_filter;
pub mod job_point;
pub mod job_record;
pub mod message_envelope;
