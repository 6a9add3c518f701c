//! Comparison key and canonical body derivation.
//!
//! Both functions are total: missing attributes resolve to an empty string
//! (or an empty JSON object for metadata bodies) instead of failing.

use mdcompare_common::{Record, RecordKind};
use serde_json::Value;

/// Derive the comparison key of a record.
///
/// Developer-named types use `DeveloperName` then `FullName`; every other
/// type uses `Name`.
pub fn record_key(record: &Record, kind: &RecordKind) -> String {
    let key = match kind {
        RecordKind::CustomField | RecordKind::CustomObject => record
            .str_field("DeveloperName")
            .or_else(|| record.str_field("FullName")),
        RecordKind::ApexClass | RecordKind::ApexTrigger | RecordKind::Other(_) => {
            record.str_field("Name")
        }
    };
    key.unwrap_or_default().to_string()
}

/// Derive the normalized string compared across orgs
pub fn canonical_body(record: &Record, kind: &RecordKind) -> String {
    match kind {
        RecordKind::CustomField | RecordKind::CustomObject => match record.field("Metadata") {
            Some(metadata) => pretty_json(metadata),
            None => pretty_json(&Value::Object(Default::default())),
        },
        RecordKind::ApexClass | RecordKind::ApexTrigger => record
            .field("Body")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        RecordKind::Other(_) => pretty_json(record.as_value()),
    }
}

fn pretty_json(value: &Value) -> String {
    // Serializing a `Value` cannot fail: keys are always strings.
    serde_json::to_string_pretty(value).unwrap_or_default()
}
