use clap::{Parser, Subcommand};
use serde_json::Value as JsonValue;
use std::{collections::HashMap, path::PathBuf};

/// Enriches and indexes job postings consumed from Kafka, and queries the indexed jobs
#[derive(Debug, Parser)]
#[command(name = "job_indexing_worker", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Runs the consumers until interrupted (default)
    Consume,
    /// Provisions a stream and publishes the records of a JSON array file on it
    Publish {
        #[arg(long)]
        stream: String,
        #[arg(long)]
        file: PathBuf,
    },
    /// Ranks the jobs of a collection against a query
    Search {
        #[arg(long)]
        collection: String,
        #[arg(long)]
        query: String,
        #[arg(long, default_value_t = 10)]
        limit: u64,
        /// `key=value` condition, repeatable
        #[arg(long = "filter", value_parser = parse_key_value)]
        filters: Vec<(String, JsonValue)>,
    },
    /// Prints the text of the first job matching the conditions
    Lookup {
        #[arg(long)]
        collection: String,
        /// `key=value` condition, repeatable
        #[arg(long = "filter", value_parser = parse_key_value, required = true)]
        filters: Vec<(String, JsonValue)>,
        #[arg(long, default_value_t = 1)]
        limit: u32,
    },
}

/// Parses a `key=value` pair. Values that are valid JSON (numbers, booleans...) keep their type,
/// anything else is a string.
pub fn parse_key_value(pair: &str) -> Result<(String, JsonValue), String> {
    let (key, value) = pair
        .split_once('=')
        .ok_or_else(|| format!("Expected key=value, got {}", pair))?;
    if key.is_empty() {
        return Err(format!("Missing key in {}", pair));
    }

    let value = serde_json::from_str(value).unwrap_or_else(|_| JsonValue::String(value.to_string()));
    Ok((key.to_string(), value))
}

pub fn keyword_map(filters: Vec<(String, JsonValue)>) -> HashMap<String, JsonValue> {
    filters.into_iter().collect()
}
