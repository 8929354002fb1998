use serde_json::Value as JsonValue;
use std::collections::HashMap;
use tracing::{debug, warn};

use super::job_record::JobRecord;

/// Static assignment of filterable keys to the `must` or `should` group.
///
/// Keys in neither group cannot be filtered on and are silently dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterGroups {
    /// Keys matched exactly, all conditions must hold
    pub must_keys: Vec<String>,
    /// Keys matched as text, at least one condition must hold when any is given
    pub should_keys: Vec<String>,
}

impl Default for FilterGroups {
    fn default() -> Self {
        Self {
            must_keys: vec!["url".to_string(), "id".to_string()],
            should_keys: vec!["job_position".to_string(), "suburb".to_string()],
        }
    }
}

/// Value of an exact-match condition
#[derive(Debug, Clone, PartialEq)]
pub enum ExactValue {
    Keyword(String),
    Integer(i64),
    Boolean(bool),
    /// A value no payload field can equal (fractional numbers, lists, objects)
    Unmatchable(String),
}

impl ExactValue {
    fn from_json(value: &JsonValue) -> Self {
        match value {
            JsonValue::String(keyword) => Self::Keyword(keyword.clone()),
            JsonValue::Bool(boolean) => Self::Boolean(*boolean),
            JsonValue::Number(number) => match (number.as_i64(), number.as_f64()) {
                (Some(integer), _) => Self::Integer(integer),
                (None, Some(float))
                    if float.fract() == 0.0
                        && float >= i64::MIN as f64
                        && float < i64::MAX as f64 =>
                {
                    Self::Integer(float as i64)
                }
                _ => Self::Unmatchable(value.to_string()),
            },
            other => Self::Unmatchable(other.to_string()),
        }
    }

    fn matches(&self, value: &JsonValue) -> bool {
        match (self, value) {
            (Self::Unmatchable(_), _) => false,
            (Self::Keyword(expected), JsonValue::String(actual)) => expected == actual,
            (Self::Integer(expected), JsonValue::Number(actual)) => {
                actual.as_i64() == Some(*expected)
            }
            (Self::Boolean(expected), JsonValue::Bool(actual)) => expected == actual,
            // A list field matches when any of its elements does
            (_, JsonValue::Array(values)) => values.iter().any(|value| self.matches(value)),
            _ => false,
        }
    }
}

/// Boolean predicate over job payloads: `AND(must) AND (should is empty OR OR(should))`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobFilter {
    pub must: Vec<(String, ExactValue)>,
    pub should: Vec<(String, String)>,
}

impl JobFilter {
    /// Builds a filter from a keyword map, following the pre-declared key groups.
    ///
    /// Null values and keys outside both groups are dropped.
    /// A must-group value without an exact form (fractional numbers, lists, objects)
    /// makes the filter match nothing.
    pub fn build(groups: &FilterGroups, keyword_map: &HashMap<String, JsonValue>) -> Self {
        let mut filter = Self::default();

        // Sorted for a deterministic condition order
        let mut keys: Vec<&String> = keyword_map.keys().collect();
        keys.sort();

        for key in keys {
            let value = &keyword_map[key];
            if value.is_null() {
                continue;
            }

            if groups.must_keys.contains(key) {
                let exact_value = ExactValue::from_json(value);
                if let ExactValue::Unmatchable(_) = exact_value {
                    warn!(?value, "Cannot match {} exactly, no job will match", key);
                }
                filter.must.push((key.clone(), exact_value));
            } else if groups.should_keys.contains(key) {
                let text = match value {
                    JsonValue::String(text) => text.clone(),
                    other => other.to_string(),
                };
                filter.should.push((key.clone(), text));
            } else {
                debug!("{} is not a filterable key, dropping it", key);
            }
        }

        filter
    }

    pub fn is_empty(&self) -> bool {
        self.must.is_empty() && self.should.is_empty()
    }

    /// Evaluates the filter against a payload.
    ///
    /// Text conditions hold when the query is a case-insensitive substring of the field,
    /// or when every query token appears among the field tokens.
    pub fn matches(&self, payload: &JobRecord) -> bool {
        let must_hold = self.must.iter().all(|(key, expected)| {
            payload
                .get(key)
                .map(|value| expected.matches(value))
                .unwrap_or(false)
        });

        let should_hold = self.should.is_empty()
            || self.should.iter().any(|(key, text)| {
                payload
                    .get(key)
                    .map(|value| text_matches(value, text))
                    .unwrap_or(false)
            });

        must_hold && should_hold
    }
}

fn text_matches(value: &JsonValue, query: &str) -> bool {
    match value {
        JsonValue::String(field) => {
            let field = field.to_lowercase();
            let query = query.to_lowercase();
            if field.contains(&query) {
                return true;
            }

            let field_tokens: Vec<&str> = field.split(|c: char| !c.is_alphanumeric()).collect();
            let mut query_tokens = query
                .split(|c: char| !c.is_alphanumeric())
                .filter(|token| !token.is_empty())
                .peekable();

            query_tokens.peek().is_some()
                && query_tokens.all(|token| field_tokens.contains(&token))
        }
        JsonValue::Array(values) => values.iter().any(|value| text_matches(value, query)),
        _ => false,
    }
}
