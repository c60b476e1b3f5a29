//! Artifact Model
//!
//! Value types for the structural units extracted from source files.
//!
//! ## Design
//!
//! - `CodeArtifact` carries the shared base fields; the variant payload lives in `ArtifactKind`
//!   (a closed sum type: file, class, function).
//! - Identity is the full field tuple. `canonical_key()` renders every field, metadata included,
//!   into one string that is used for deduplication and as the final sort tie-breaker.
//! - Metadata that cannot be rendered deterministically (non-finite floats) is an integrity
//!   error, reported as `ScrError::Fingerprinting`.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{Result, ScrError};

// =============================================================================
// Risk Signals
// =============================================================================

/// Coarse heuristic tag for a category of potentially dangerous code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskSignal {
    ExternalDependency,
    FileOperations,
    NetworkAccess,
    ProcessExecution,
    CryptographicOperations,
    Deserialization,
    DynamicCodeExecution,
    Reflection,
    UnsafeMemoryOperations,
    ConfigurationAccess,
}

impl RiskSignal {
    pub const ALL: [RiskSignal; 10] = [
        Self::ExternalDependency,
        Self::FileOperations,
        Self::NetworkAccess,
        Self::ProcessExecution,
        Self::CryptographicOperations,
        Self::Deserialization,
        Self::DynamicCodeExecution,
        Self::Reflection,
        Self::UnsafeMemoryOperations,
        Self::ConfigurationAccess,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExternalDependency => "external_dependency",
            Self::FileOperations => "file_operations",
            Self::NetworkAccess => "network_access",
            Self::ProcessExecution => "process_execution",
            Self::CryptographicOperations => "cryptographic_operations",
            Self::Deserialization => "deserialization",
            Self::DynamicCodeExecution => "dynamic_code_execution",
            Self::Reflection => "reflection",
            Self::UnsafeMemoryOperations => "unsafe_memory_operations",
            Self::ConfigurationAccess => "configuration_access",
        }
    }
}

// Signals order by their string value so sorted renderings match the wire format.
impl Ord for RiskSignal {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl PartialOrd for RiskSignal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for RiskSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Artifact Type
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactType {
    File,
    Class,
    Function,
}

impl ArtifactType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Class => "class",
            Self::Function => "function",
        }
    }
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Metadata
// =============================================================================

/// Opaque metadata value attached to an artifact
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<MetadataValue>),
    Map(BTreeMap<String, MetadataValue>),
}

impl MetadataValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Render into a stable textual form. Maps are key-sorted, lists keep their order.
    fn write_canonical(&self, out: &mut String) -> Result<()> {
        match self {
            Self::Null => out.push_str("null"),
            Self::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Self::Int(i) => out.push_str(&i.to_string()),
            Self::Float(f) => {
                if !f.is_finite() {
                    return Err(ScrError::fingerprinting(format!(
                        "metadata float {} has no deterministic representation",
                        f
                    )));
                }
                out.push_str(&format!("{:?}", f));
            }
            Self::Text(s) => out.push_str(&serde_json::to_string(s)?),
            Self::List(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    item.write_canonical(out)?;
                }
                out.push(']');
            }
            Self::Map(map) => write_canonical_map(map, out)?,
        }
        Ok(())
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for MetadataValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for MetadataValue {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<bool> for MetadataValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

pub type Metadata = BTreeMap<String, MetadataValue>;

fn write_canonical_map(map: &Metadata, out: &mut String) -> Result<()> {
    out.push('{');
    for (i, (key, value)) in map.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&serde_json::to_string(key)?);
        out.push(':');
        value.write_canonical(out)?;
    }
    out.push('}');
    Ok(())
}

/// Render metadata into its canonical, comparable form.
pub fn canonical_metadata(metadata: &Metadata) -> Result<String> {
    let mut out = String::new();
    write_canonical_map(metadata, &mut out)?;
    Ok(out)
}

/// Metadata key linking a method to its enclosing class
pub const CLASS_METADATA_KEY: &str = "class";

// =============================================================================
// Artifact Variants
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDetails {
    pub language: String,
    pub line_count: u32,
    pub byte_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ClassDetails {
    pub methods: BTreeSet<String>,
    pub base_classes: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct FunctionDetails {
    pub parameters: BTreeSet<String>,
    pub return_type: Option<String>,
    pub is_async: bool,
    pub decorators: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ArtifactKind {
    File(FileDetails),
    Class(ClassDetails),
    Function(FunctionDetails),
}

// =============================================================================
// Code Artifact
// =============================================================================

/// One structural unit (file, class or function) with location and risk tags.
///
/// `path` is the repository-relative POSIX path of the containing file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CodeArtifact {
    pub artifact_type: ArtifactType,
    pub name: String,
    pub path: String,
    pub start_line: u32,
    pub end_line: u32,
    pub risk_signals: BTreeSet<RiskSignal>,
    pub metadata: Metadata,
    #[serde(flatten)]
    pub kind: ArtifactKind,
}

impl CodeArtifact {
    fn new(
        kind: ArtifactKind,
        path: impl Into<String>,
        name: impl Into<String>,
        start_line: u32,
        end_line: u32,
    ) -> Result<Self> {
        let artifact_type = match kind {
            ArtifactKind::File(_) => ArtifactType::File,
            ArtifactKind::Class(_) => ArtifactType::Class,
            ArtifactKind::Function(_) => ArtifactType::Function,
        };
        let artifact = Self {
            artifact_type,
            name: name.into(),
            path: path.into(),
            start_line,
            end_line,
            risk_signals: BTreeSet::new(),
            metadata: Metadata::new(),
            kind,
        };
        artifact.validate()?;
        Ok(artifact)
    }

    pub fn file(
        path: impl Into<String>,
        start_line: u32,
        end_line: u32,
        details: FileDetails,
    ) -> Result<Self> {
        let path = path.into();
        Self::new(
            ArtifactKind::File(details),
            path.clone(),
            path,
            start_line,
            end_line,
        )
    }

    pub fn class(
        path: impl Into<String>,
        name: impl Into<String>,
        start_line: u32,
        end_line: u32,
        details: ClassDetails,
    ) -> Result<Self> {
        Self::new(
            ArtifactKind::Class(details),
            path,
            name,
            start_line,
            end_line,
        )
    }

    pub fn function(
        path: impl Into<String>,
        name: impl Into<String>,
        start_line: u32,
        end_line: u32,
        details: FunctionDetails,
    ) -> Result<Self> {
        Self::new(
            ArtifactKind::Function(details),
            path,
            name,
            start_line,
            end_line,
        )
    }

    pub fn with_risk_signals(mut self, signals: impl IntoIterator<Item = RiskSignal>) -> Self {
        self.risk_signals.extend(signals);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.start_line < 1 {
            return Err(ScrError::validation("start_line must be >= 1"));
        }
        if self.end_line < self.start_line {
            return Err(ScrError::validation(format!(
                "end_line ({}) must be >= start_line ({}) for {}",
                self.end_line, self.start_line, self.name
            )));
        }
        if self.name.is_empty() {
            return Err(ScrError::validation("artifact name cannot be empty"));
        }
        Ok(())
    }

    /// Stable identifier used as dependency-graph key
    pub fn id(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.path, self.artifact_type, self.name, self.start_line
        )
    }

    pub fn has_signal(&self, signal: RiskSignal) -> bool {
        self.risk_signals.contains(&signal)
    }

    pub fn as_file(&self) -> Option<&FileDetails> {
        match &self.kind {
            ArtifactKind::File(details) => Some(details),
            _ => None,
        }
    }

    pub fn as_class(&self) -> Option<&ClassDetails> {
        match &self.kind {
            ArtifactKind::Class(details) => Some(details),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&FunctionDetails> {
        match &self.kind {
            ArtifactKind::Function(details) => Some(details),
            _ => None,
        }
    }

    /// Enclosing class recorded during extraction, if any
    pub fn enclosing_class(&self) -> Option<&str> {
        self.metadata
            .get(CLASS_METADATA_KEY)
            .and_then(MetadataValue::as_str)
    }

    /// Sorted comma-joined signal values, empty when untagged
    pub fn signals_joined(&self) -> String {
        self.risk_signals
            .iter()
            .map(RiskSignal::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Full-field canonical rendering used for equality-based deduplication.
    pub fn canonical_key(&self) -> Result<String> {
        let mut key = format!(
            "{}\u{1f}{}\u{1f}{}\u{1f}{}\u{1f}{}\u{1f}{}\u{1f}{}",
            self.path,
            self.start_line,
            self.name,
            self.artifact_type,
            self.end_line,
            self.signals_joined(),
            canonical_metadata(&self.metadata)?
        );
        let payload = match &self.kind {
            ArtifactKind::File(d) => format!("{}|{}|{}", d.language, d.line_count, d.byte_size),
            ArtifactKind::Class(d) => format!(
                "{}|{}",
                join_set(&d.methods),
                join_set(&d.base_classes)
            ),
            ArtifactKind::Function(d) => format!(
                "{}|{}|{}|{}",
                join_set(&d.parameters),
                d.return_type.as_deref().unwrap_or(""),
                d.is_async,
                join_set(&d.decorators)
            ),
        };
        key.push('\u{1f}');
        key.push_str(&payload);
        Ok(key)
    }

    /// Line used in the fingerprint hash input:
    /// `{type}:{path}:{name}:{start}:{end}[:{sorted signals}]`
    pub fn hash_line(&self) -> String {
        let mut line = format!(
            "{}:{}:{}:{}:{}",
            self.artifact_type, self.path, self.name, self.start_line, self.end_line
        );
        if !self.risk_signals.is_empty() {
            line.push(':');
            line.push_str(&self.signals_joined());
        }
        line
    }
}

fn join_set(set: &BTreeSet<String>) -> String {
    set.iter().map(String::as_str).collect::<Vec<_>>().join(",")
}

/// Order used for hashing and output: `(path, start_line, name)`, then the full key.
pub fn compare_artifacts(a: &(String, CodeArtifact), b: &(String, CodeArtifact)) -> Ordering {
    a.1.path
        .cmp(&b.1.path)
        .then(a.1.start_line.cmp(&b.1.start_line))
        .then_with(|| a.1.name.cmp(&b.1.name))
        .then_with(|| a.0.cmp(&b.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_function() -> CodeArtifact {
        CodeArtifact::function(
            "pkg/app.py",
            "handler",
            10,
            24,
            FunctionDetails {
                parameters: ["self", "request"].iter().map(|s| s.to_string()).collect(),
                return_type: Some("Response".to_string()),
                is_async: true,
                decorators: BTreeSet::new(),
            },
        )
        .unwrap()
    }

    #[test]
    fn test_risk_signal_order_follows_value() {
        let signals: BTreeSet<RiskSignal> = RiskSignal::ALL.into_iter().collect();
        let values: Vec<&str> = signals.iter().map(RiskSignal::as_str).collect();
        let mut sorted = values.clone();
        sorted.sort();
        assert_eq!(values, sorted);
        assert_eq!(values[0], "configuration_access");
    }

    #[test]
    fn test_risk_signal_serde_matches_as_str() {
        for signal in RiskSignal::ALL {
            let json = serde_json::to_string(&signal).unwrap();
            assert_eq!(json, format!("\"{}\"", signal.as_str()));
        }
    }

    #[test]
    fn test_artifact_validation() {
        let bad_start = CodeArtifact::class("a.py", "A", 0, 3, ClassDetails::default());
        assert!(bad_start.is_err());

        let inverted = CodeArtifact::class("a.py", "A", 5, 3, ClassDetails::default());
        assert!(inverted.is_err());

        let empty_name = CodeArtifact::class("a.py", "", 1, 3, ClassDetails::default());
        assert!(empty_name.is_err());
    }

    #[test]
    fn test_artifact_id() {
        let artifact = sample_function();
        assert_eq!(artifact.id(), "pkg/app.py:function:handler:10");
        assert_eq!(artifact.artifact_type, ArtifactType::Function);
    }

    #[test]
    fn test_file_artifact_name_is_path() {
        let file = CodeArtifact::file(
            "pkg/app.py",
            1,
            3,
            FileDetails {
                language: "python".to_string(),
                line_count: 3,
                byte_size: 42,
            },
        )
        .unwrap();
        assert_eq!(file.name, "pkg/app.py");
        assert_eq!(file.id(), "pkg/app.py:file:pkg/app.py:1");
    }

    #[test]
    fn test_hash_line_with_sorted_signals() {
        let artifact = sample_function()
            .with_risk_signals([RiskSignal::NetworkAccess, RiskSignal::Deserialization]);
        assert_eq!(
            artifact.hash_line(),
            "function:pkg/app.py:handler:10:24:deserialization,network_access"
        );
        assert_eq!(
            sample_function().hash_line(),
            "function:pkg/app.py:handler:10:24"
        );
    }

    #[test]
    fn test_canonical_key_distinguishes_metadata() {
        let plain = sample_function();
        let tagged = sample_function().with_metadata(CLASS_METADATA_KEY, "Service");
        assert_ne!(plain.canonical_key().unwrap(), tagged.canonical_key().unwrap());
        assert_eq!(tagged.enclosing_class(), Some("Service"));
        assert_eq!(
            tagged.canonical_key().unwrap(),
            sample_function()
                .with_metadata(CLASS_METADATA_KEY, "Service")
                .canonical_key()
                .unwrap()
        );
    }

    #[test]
    fn test_canonical_metadata_sorts_nested_maps() {
        let mut inner_a = BTreeMap::new();
        inner_a.insert("z".to_string(), MetadataValue::Int(1));
        inner_a.insert("a".to_string(), MetadataValue::Bool(true));
        let mut metadata = Metadata::new();
        metadata.insert("nested".to_string(), MetadataValue::Map(inner_a));
        metadata.insert(
            "list".to_string(),
            MetadataValue::List(vec![MetadataValue::Text("b".into()), MetadataValue::Null]),
        );

        assert_eq!(
            canonical_metadata(&metadata).unwrap(),
            r#"{"list":["b",null],"nested":{"a":true,"z":1}}"#
        );
    }

    #[test]
    fn test_non_finite_metadata_is_integrity_error() {
        let artifact = sample_function().with_metadata("weight", f64::NAN);
        let err = artifact.canonical_key().unwrap_err();
        assert!(matches!(err, ScrError::Fingerprinting(_)));
    }

    #[test]
    fn test_serialized_artifact_has_flat_variant_fields() {
        let value = serde_json::to_value(sample_function()).unwrap();
        assert_eq!(value["artifact_type"], "function");
        assert_eq!(value["is_async"], true);
        assert_eq!(value["parameters"], serde_json::json!(["request", "self"]));
        assert_eq!(value["return_type"], "Response");
    }
}
