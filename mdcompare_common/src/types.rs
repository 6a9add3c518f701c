use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Marker used in a [`LineDiff`] for a line that is empty or absent on one side
pub const EMPTY_LINE_MARKER: &str = "(empty)";

/// A configuration record as returned by the remote org.
///
/// The attribute bag is kept as raw JSON; accessors treat missing, null and
/// empty-string attributes the same way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Value);

impl Record {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// Remote identifier (`Id` attribute), empty when absent
    pub fn id(&self) -> &str {
        self.str_field("Id").unwrap_or("")
    }

    /// Attribute value, `None` when missing or null
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.0.get(name).filter(|value| !value.is_null())
    }

    /// Non-empty string attribute
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.0
            .get(name)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
    }
}

impl From<Value> for Record {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Remote record type.
///
/// Known types get dedicated naming and body rules; everything else falls
/// into [`RecordKind::Other`] and is compared as a whole record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RecordKind {
    CustomField,
    CustomObject,
    ApexClass,
    ApexTrigger,
    Other(String),
}

impl RecordKind {
    pub fn parse(name: &str) -> Self {
        match name {
            "CustomField" => RecordKind::CustomField,
            "CustomObject" => RecordKind::CustomObject,
            "ApexClass" => RecordKind::ApexClass,
            "ApexTrigger" => RecordKind::ApexTrigger,
            other => RecordKind::Other(other.to_string()),
        }
    }

    /// Type name as used by the remote API
    pub fn as_str(&self) -> &str {
        match self {
            RecordKind::CustomField => "CustomField",
            RecordKind::CustomObject => "CustomObject",
            RecordKind::ApexClass => "ApexClass",
            RecordKind::ApexTrigger => "ApexTrigger",
            RecordKind::Other(name) => name,
        }
    }
}

impl FromStr for RecordKind {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<String> for RecordKind {
    fn from(name: String) -> Self {
        Self::parse(&name)
    }
}

impl From<RecordKind> for String {
    fn from(kind: RecordKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One differing line between two canonical bodies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineDiff {
    /// 1-based line number
    pub line: usize,
    pub source: String,
    pub target: String,
}

impl LineDiff {
    /// Build a diff entry, substituting [`EMPTY_LINE_MARKER`] for empty or missing lines
    pub fn new(line: usize, source: Option<&str>, target: Option<&str>) -> Self {
        Self {
            line,
            source: render_line(source),
            target: render_line(target),
        }
    }
}

fn render_line(line: Option<&str>) -> String {
    match line {
        Some(text) if !text.is_empty() => text.to_string(),
        _ => EMPTY_LINE_MARKER.to_string(),
    }
}

/// A record placed in the `unchanged`, `added` or `removed` bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordEntry {
    pub id: String,
    pub name: String,
    pub kind: RecordKind,
    pub record: Record,
}

/// A record present on both sides with differing canonical bodies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangedRecord {
    /// Identifier of the source-side record
    pub id: String,
    pub name: String,
    pub kind: RecordKind,
    pub source: Record,
    pub target: Record,
    pub differences: Vec<LineDiff>,
}

/// Four-way classification of two record collections
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompareResult {
    pub unchanged: Vec<RecordEntry>,
    pub added: Vec<RecordEntry>,
    pub removed: Vec<RecordEntry>,
    pub changed: Vec<ChangedRecord>,
}

impl CompareResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append every bucket of `other` to the matching bucket of `self`
    pub fn merge(&mut self, other: CompareResult) {
        self.unchanged.extend(other.unchanged);
        self.added.extend(other.added);
        self.removed.extend(other.removed);
        self.changed.extend(other.changed);
    }

    pub fn summary(&self) -> CompareSummary {
        CompareSummary {
            total: self.unchanged.len() + self.added.len() + self.removed.len() + self.changed.len(),
            unchanged: self.unchanged.len(),
            added: self.added.len(),
            removed: self.removed.len(),
            changed: self.changed.len(),
        }
    }

    /// True when nothing was added, removed or changed
    pub fn is_identical(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// Bucket counts of a [`CompareResult`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompareSummary {
    pub total: usize,
    pub unchanged: usize,
    pub added: usize,
    pub removed: usize,
    pub changed: usize,
}

/// Line diff strategy used for changed records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffAlgorithm {
    /// Index-by-index comparison, no realignment after insertions
    #[default]
    Positional,
    /// Myers alignment of the two line sequences
    Aligned,
}

/// A named org the CLI can connect to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgProfile {
    /// Profile name
    pub name: String,
    /// Instance base URL, e.g. `https://example.my.salesforce.com`
    pub instance_url: String,
    /// Environment variable holding the access token
    #[serde(default)]
    pub token_env: Option<String>,
}

fn default_api_version() -> String {
    "v57.0".to_string()
}

fn default_batch_size() -> usize {
    25
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_metadata_types() -> Vec<String> {
    [
        "ApexClass",
        "ApexTrigger",
        "CustomObject",
        "Layout",
        "Profile",
        "PermissionSet",
    ]
    .iter()
    .map(|name| name.to_string())
    .collect()
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// REST API version segment, e.g. `v57.0`
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Sub-requests per composite call (capped at 25)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Types offered by `types` and used when `compare` gets no `--type`
    #[serde(default = "default_metadata_types")]
    pub metadata_types: Vec<String>,

    #[serde(default)]
    pub diff_algorithm: DiffAlgorithm,

    /// Enable portable mode (config alongside binary)
    #[serde(default)]
    pub portable_mode: bool,

    /// Saved org profiles
    #[serde(default)]
    pub orgs: Vec<OrgProfile>,
}

impl AppConfig {
    pub fn find_org(&self, name: &str) -> Option<&OrgProfile> {
        self.orgs.iter().find(|org| org.name == name)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_version: default_api_version(),
            batch_size: default_batch_size(),
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            metadata_types: default_metadata_types(),
            diff_algorithm: DiffAlgorithm::default(),
            portable_mode: false,
            orgs: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(name: &str) -> RecordEntry {
        RecordEntry {
            id: format!("id-{name}"),
            name: name.to_string(),
            kind: RecordKind::ApexClass,
            record: Record::new(json!({ "Name": name })),
        }
    }

    #[test]
    fn test_record_accessors() {
        let record = Record::new(json!({
            "Id": "01p000000000001",
            "Name": "",
            "Body": null,
        }));
        assert_eq!(record.id(), "01p000000000001");
        assert_eq!(record.str_field("Name"), None);
        assert!(record.field("Body").is_none());
        assert!(record.field("Missing").is_none());

        let bare = Record::new(json!("not an object"));
        assert_eq!(bare.id(), "");
    }

    #[test]
    fn test_record_kind_roundtrip_names() {
        assert_eq!(RecordKind::parse("ApexClass"), RecordKind::ApexClass);
        assert_eq!(RecordKind::parse("CustomField"), RecordKind::CustomField);
        assert_eq!(
            RecordKind::parse("Layout"),
            RecordKind::Other("Layout".to_string())
        );
        assert_eq!(RecordKind::Other("Layout".into()).as_str(), "Layout");
        assert_eq!("CustomObject".parse::<RecordKind>().unwrap(), RecordKind::CustomObject);
        assert_eq!(serde_json::to_string(&RecordKind::ApexTrigger).unwrap(), "\"ApexTrigger\"");
    }

    #[test]
    fn test_line_diff_marker() {
        let diff = LineDiff::new(3, None, Some("c"));
        assert_eq!(diff.source, EMPTY_LINE_MARKER);
        assert_eq!(diff.target, "c");

        let diff = LineDiff::new(1, Some(""), Some("x"));
        assert_eq!(diff.source, EMPTY_LINE_MARKER);
    }

    #[test]
    fn test_compare_result_merge_and_summary() {
        let mut first = CompareResult::new();
        first.unchanged.push(entry("A"));
        first.added.push(entry("B"));

        let mut second = CompareResult::new();
        second.removed.push(entry("C"));
        second.added.push(entry("D"));

        first.merge(second);

        let summary = first.summary();
        assert_eq!(summary.total, 4);
        assert_eq!(summary.unchanged, 1);
        assert_eq!(summary.added, 2);
        assert_eq!(summary.removed, 1);
        assert_eq!(summary.changed, 0);
        assert_eq!(first.added[1].name, "D");
        assert!(!first.is_identical());
    }

    #[test]
    fn test_app_config_defaults_from_empty_toml() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.api_version, "v57.0");
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.diff_algorithm, DiffAlgorithm::Positional);
        assert_eq!(config.metadata_types.len(), 6);
        assert!(config.orgs.is_empty());
    }

    #[test]
    fn test_app_config_orgs() {
        let config: AppConfig = toml::from_str(
            r#"
diff_algorithm = "aligned"

[[orgs]]
name = "prod"
instance_url = "https://prod.example.com"
token_env = "PROD_TOKEN"
"#,
        )
        .unwrap();
        assert_eq!(config.diff_algorithm, DiffAlgorithm::Aligned);
        let org = config.find_org("prod").unwrap();
        assert_eq!(org.instance_url, "https://prod.example.com");
        assert_eq!(org.token_env.as_deref(), Some("PROD_TOKEN"));
        assert!(config.find_org("sandbox").is_none());
    }
}
