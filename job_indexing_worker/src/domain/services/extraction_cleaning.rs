use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value as JsonValue;

use crate::domain::entities::job_record::JobRecord;

pub const TECHNOLOGIES_FIELD: &str = "technologies";
pub const ALL_TECHNOLOGIES_FIELD: &str = "all_technologies";

/// Common abbreviations, as they look once title-cased
const TECHNOLOGY_ALIASES: [(&str, &str); 5] = [
    ("Ml", "Machine Learning"),
    ("Ai", "Artificial Intelligence"),
    ("Js", "JavaScript"),
    ("Css", "CSS"),
    ("Html", "HTML"),
];

static JSON_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?i)json\s*").unwrap());

/// Reads a JSON object out of a language model answer.
///
/// Handles answers wrapped in code fences, prefixed with a `json` tag,
/// or missing their outer braces. Returns `None` when nothing usable is found.
pub fn extract_json_from_response(response: &str) -> Option<JobRecord> {
    let stripped = response.replace('`', "");
    let stripped = JSON_TAG.replace(stripped.trim(), "");
    let body = stripped.trim();
    if body.is_empty() {
        return None;
    }

    if let Ok(JsonValue::Object(record)) = serde_json::from_str(body) {
        return Some(record);
    }

    // Newlines inside string values are invalid JSON
    let flattened = body.replace(['\n', '\r'], " ");
    let candidate = if flattened.starts_with('{') && flattened.ends_with('}') {
        flattened
    } else {
        format!("{{{}}}", flattened.trim_end_matches(','))
    };

    match serde_json::from_str(&candidate) {
        Ok(JsonValue::Object(record)) => Some(record),
        _ => None,
    }
}

/// Normalises the attributes returned by the extraction model.
///
/// - list items are trimmed, title-cased and de-duplicated, empty items dropped
/// - string scalars are trimmed, empty values become `null`
/// - `all_technologies` lists the `technologies` with abbreviations expanded, sorted
pub fn clean_extracted_data(data: JobRecord) -> JobRecord {
    let mut cleaned: JobRecord = data
        .into_iter()
        .map(|(key, value)| (key, clean_value(value)))
        .collect();

    let mut all_technologies: Vec<String> = cleaned
        .get(TECHNOLOGIES_FIELD)
        .and_then(JsonValue::as_array)
        .map(|technologies| {
            technologies
                .iter()
                .filter_map(JsonValue::as_str)
                .map(expand_alias)
                .collect()
        })
        .unwrap_or_default();
    all_technologies.sort();
    all_technologies.dedup();

    cleaned.insert(
        ALL_TECHNOLOGIES_FIELD.to_string(),
        JsonValue::from(all_technologies),
    );
    cleaned
}

fn clean_value(value: JsonValue) -> JsonValue {
    match value {
        JsonValue::Array(items) => {
            let mut cleaned_items: Vec<JsonValue> = Vec::with_capacity(items.len());
            for item in items {
                let item = match item {
                    JsonValue::String(text) if text.trim().is_empty() => continue,
                    JsonValue::String(text) => JsonValue::String(title_case(text.trim())),
                    JsonValue::Null => continue,
                    other => other,
                };
                if !cleaned_items.contains(&item) {
                    cleaned_items.push(item);
                }
            }
            JsonValue::Array(cleaned_items)
        }
        JsonValue::String(text) if text.trim().is_empty() => JsonValue::Null,
        JsonValue::String(text) => JsonValue::String(text.trim().to_string()),
        other => other,
    }
}

fn expand_alias(technology: &str) -> String {
    TECHNOLOGY_ALIASES
        .iter()
        .find(|(alias, _)| *alias == technology)
        .map(|(_, expanded)| expanded.to_string())
        .unwrap_or_else(|| technology.to_string())
}

/// Upper-cases the first letter of every run of letters and lower-cases the others.
///
/// "problem-solving" becomes "Problem-Solving", "AWS" becomes "Aws".
fn title_case(text: &str) -> String {
    let mut titled = String::with_capacity(text.len());
    let mut previous_is_letter = false;

    for c in text.chars() {
        if c.is_alphabetic() {
            if previous_is_letter {
                titled.extend(c.to_lowercase());
            } else {
                titled.extend(c.to_uppercase());
            }
            previous_is_letter = true;
        } else {
            titled.push(c);
            previous_is_letter = false;
        }
    }

    titled
}
