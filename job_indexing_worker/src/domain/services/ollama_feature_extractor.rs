use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

use super::extraction_cleaning::{clean_extracted_data, extract_json_from_response};
use super::feature_extractor::{FeatureExtractor, FeatureExtractorError};
use crate::domain::entities::job_record::JobRecord;

const SYSTEM_PROMPT: &str = "You extract the requirements of job postings. \
Answer with a single JSON object with the keys required_skills, preferred_skills, \
experience_level, education, technologies, soft_skills, salary_range and employment_type. \
Use lists of exact skill names for skills, education and technologies, \
and null for anything the posting does not mention.";

/// Feature extraction through a language model served by Ollama
pub struct OllamaFeatureExtractor {
    http_client: reqwest::Client,
    url: String,
    model: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    system: &'a str,
    prompt: String,
    stream: bool,
    format: &'a str,
    options: serde_json::Value,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaFeatureExtractor {
    pub fn try_new(url: &str, model: &str, timeout: Duration) -> Result<Self, FeatureExtractorError> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http_client,
            url: url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl FeatureExtractor for OllamaFeatureExtractor {
    /// Asks the model for the attributes of the given job description.
    ///
    /// An answer that holds no JSON object gives an empty map:
    /// the job is still worth indexing without its attributes.
    #[tracing::instrument(name = "Extracting job features", skip(self, text), fields(model = %self.model))]
    async fn extract(&self, text: &str) -> Result<JobRecord, FeatureExtractorError> {
        let request = GenerateRequest {
            model: &self.model,
            system: SYSTEM_PROMPT,
            prompt: format!("Job description:\n{}", text),
            stream: false,
            format: "json",
            options: json!({ "temperature": 0 }),
        };

        let generated: GenerateResponse = self
            .http_client
            .post(format!("{}/api/generate", self.url))
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        match extract_json_from_response(&generated.response) {
            Some(attributes) => {
                debug!(nb_attributes = attributes.len(), "Extracted job features");
                Ok(clean_extracted_data(attributes))
            }
            None => {
                warn!(response = %generated.response, "No JSON object in the model answer");
                Ok(JobRecord::new())
            }
        }
    }
}
