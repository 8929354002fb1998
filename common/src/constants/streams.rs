//! Names shared by the services publishing to and consuming from the job streams.

/// Stream on which the scrapers publish parsed job postings
pub const PARSED_JOB_STREAM: &str = "parsed_job.topic";

/// Consumer identity of the feature extractor reading `PARSED_JOB_STREAM`
pub const PARSED_JOB_FEATURE_EXTRACTOR: &str = "parsed_job.feature_extractor.consumer";

/// Field of a job posting holding its long-form text
pub const JOB_DESCRIPTION_FIELD: &str = "description";
