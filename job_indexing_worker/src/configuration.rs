use secrecy::Secret;
use serde::Deserialize;
use serde_aux::field_attributes::deserialize_number_from_string;
use std::time::Duration;

use crate::domain::entities::job_filter::FilterGroups;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub kafka: KafkaSettings,
    pub qdrant: QdrantSettings,
    pub embeddings: EmbeddingsSettings,
    pub feature_extraction: FeatureExtractionSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaSettings {
    pub bootstrap_host: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub bootstrap_port: u16,
    pub group_id_prefix: String,
    pub auto_offset_reset: String,

    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_poll_records: usize,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub poll_timeout_ms: u64,
    /// Allowance between two polls: must cover the slowest message handling
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_poll_interval_ms: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub session_timeout_ms: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub heartbeat_interval_ms: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub auto_commit_interval_ms: u64,

    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub request_timeout_ms: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub metadata_max_age_ms: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub preflight_timeout_ms: u64,

    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub default_partitions: i32,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub default_replication: i32,
}

impl KafkaSettings {
    pub fn bootstrap_servers(&self) -> String {
        format!("{}:{}", self.bootstrap_host, self.bootstrap_port)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn preflight_timeout(&self) -> Duration {
        Duration::from_millis(self.preflight_timeout_ms)
    }

    /// The broker evicts a consumer whose heartbeats stop for a session timeout,
    /// or that does not poll within the max poll interval.
    /// Heartbeats must be more frequent than the session timeout, itself shorter than the interval.
    pub fn validate_timers(&self) -> Result<(), String> {
        if self.heartbeat_interval_ms >= self.session_timeout_ms {
            return Err(format!(
                "heartbeat_interval_ms ({}) must be lower than session_timeout_ms ({})",
                self.heartbeat_interval_ms, self.session_timeout_ms
            ));
        }
        if self.session_timeout_ms > self.max_poll_interval_ms {
            return Err(format!(
                "session_timeout_ms ({}) must not exceed max_poll_interval_ms ({})",
                self.session_timeout_ms, self.max_poll_interval_ms
            ));
        }
        if self.max_poll_records == 0 {
            return Err("max_poll_records must be at least 1".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct QdrantSettings {
    pub host: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub grpc_port: u16,
    pub api_key: Option<Secret<String>>,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub dense_vector_size: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub request_timeout_ms: u64,
    /// Field embedded at write time and returned by lookups
    pub text_field: String,
    /// Keys filtered on with exact matches
    pub must_keys: Vec<String>,
    /// Keys filtered on with full-text matches
    pub should_keys: Vec<String>,
}

impl QdrantSettings {
    pub fn filter_groups(&self) -> FilterGroups {
        FilterGroups {
            must_keys: self.must_keys.clone(),
            should_keys: self.should_keys.clone(),
        }
    }

    pub fn get_grpc_base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.grpc_port)
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingsProvider {
    /// A text-embeddings-inference server
    Http,
    /// In-process feature hashing
    Hashing,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingsSettings {
    pub provider: EmbeddingsProvider,
    pub dense_url: String,
    pub sparse_url: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeatureExtractionSettings {
    pub url: String,
    pub model: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub request_timeout_ms: u64,
}

/// Extracts app settings from configuration files and env variables
///
/// `base.yml` should contain shared settings for all environments.
/// A specific env file should be created for each environment: `develop.yml`,`local.yml` and `production.yml`
/// The environment is set with the env var `APP_ENVIRONMENT`.
/// If `APP_ENVIRONMENT` is not set, `develop.yml` is the default.
///
/// Settings are also taken from environment variables: with a prefix of APP and '__' as separator
/// For ex: `APP_KAFKA__BOOTSTRAP_PORT=9093` would set `Settings.kafka.bootstrap_port`
pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let base_path = std::env::current_dir()
        .map_err(|e| config::ConfigError::Message(format!("No current directory: {}", e)))?;
    let configuration_directory = base_path.join("configuration");

    // Detects the running environment.
    // Default to `develop` if unspecified.
    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "develop".into())
        .try_into()
        .map_err(config::ConfigError::Message)?;
    let environment_filename = format!("{}.yml", environment.as_str());

    let settings = config::Config::builder()
        .add_source(config::File::from(configuration_directory.join("base.yml")))
        .add_source(config::File::from(
            configuration_directory.join(environment_filename),
        ))
        .add_source(environment_source())
        .build()?;

    settings.try_deserialize::<Settings>()
}

/// Settings from environment variables: with a prefix of APP and '__' as separator.
/// The filter keys are comma separated lists: `APP_QDRANT__MUST_KEYS=url,id`
fn environment_source() -> config::Environment {
    config::Environment::with_prefix("APP")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("qdrant.must_keys")
        .with_list_parse_key("qdrant.should_keys")
}

/// The possible runtime environment for our application.
pub enum Environment {
    Develop,
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Develop => "develop",
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "develop" => Ok(Self::Develop),
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `develop`, `local` or `production`.",
                other
            )),
        }
    }
}
