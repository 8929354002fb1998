use serde_json::{Map, Value as JsonValue};

/// A flat job posting: field name to scalar or list of scalars
///
/// Enriched records share the same representation.
pub type JobRecord = Map<String, JsonValue>;

/// Merges the attributes returned by the feature extraction into the record.
///
/// On a key collision the enrichment wins over the original field.
pub fn merge_enrichment(mut record: JobRecord, attributes: JobRecord) -> JobRecord {
    record.extend(attributes);
    record
}

/// Returns the text held by `field`, if it is a string
pub fn text_field<'a>(record: &'a JobRecord, field: &str) -> Option<&'a str> {
    record.get(field).and_then(JsonValue::as_str)
}
