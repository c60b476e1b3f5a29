//! Repository Fingerprinter
//!
//! Walks a repository, extracts artifacts from every supported file and condenses them into a
//! `RepositoryFingerprint`.
//!
//! ## Pipeline
//!
//! 1. Scan: deterministic traversal via `FileScanner`
//! 2. Extract: one `SourceExtractor` pass per file, strictly sequential
//! 3. Deduplicate: artifacts collapse by canonical key
//! 4. Graph + hash: `DependencyGraph::build` and SHA-256 over the sorted canonical lines
//!
//! ## Failure Policy
//!
//! Unreadable, undecodable, oversized or syntactically broken files are recorded in
//! `status_metadata.failed_files` and drive the status to `PARTIAL`. Only validation errors
//! (bad root) and integrity errors (non-canonical metadata) are returned as `Err`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::artifact::{
    ArtifactType, CodeArtifact, Metadata, RiskSignal, compare_artifacts,
};
use super::graph::DependencyGraph;
use crate::analyzer::parser::{Extraction, Language, SourceExtractor, create_extractor};
use crate::analyzer::scanner::{FileScanner, ScannedFile};
use crate::config::FingerprintConfig;
use crate::constants::schema::SCHEMA_VERSION;
use crate::types::{Result, ScrError};

// =============================================================================
// Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FingerprintStatus {
    /// Reserved: no extraction mode currently runs without intentional skips
    CompleteNoSkips,
    CompleteWithSkips,
    Partial,
    Failed,
}

impl FingerprintStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CompleteNoSkips => "COMPLETE_NO_SKIPS",
            Self::CompleteWithSkips => "COMPLETE_WITH_SKIPS",
            Self::Partial => "PARTIAL",
            Self::Failed => "FAILED",
        }
    }

    /// Only complete fingerprints have a reproducible hash
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::CompleteNoSkips | Self::CompleteWithSkips)
    }
}

impl fmt::Display for FingerprintStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Repository Fingerprint
// =============================================================================

/// Deterministic structural summary of a repository.
#[derive(Debug, Clone, PartialEq)]
pub struct RepositoryFingerprint {
    pub repository_path: PathBuf,
    pub fingerprint_hash: String,
    pub total_files: usize,
    pub total_classes: usize,
    pub total_functions: usize,
    pub total_lines: u64,
    pub languages: BTreeMap<String, usize>,
    /// Deduplicated, sorted by `(path, start_line, name)` then canonical key
    pub artifacts: Vec<CodeArtifact>,
    pub dependency_graph: DependencyGraph,
    pub risk_signals: BTreeMap<RiskSignal, usize>,
    pub status: FingerprintStatus,
    /// Repository-relative POSIX paths, sorted
    pub failed_files: Vec<String>,
    pub metadata: Metadata,
}

impl RepositoryFingerprint {
    /// Assemble a fingerprint from raw extractor output.
    ///
    /// All aggregates are counted from the deduplicated artifact set.
    pub fn assemble(
        repository_path: impl Into<PathBuf>,
        artifacts: impl IntoIterator<Item = CodeArtifact>,
        mut failed_files: Vec<String>,
    ) -> Result<Self> {
        let mut unique: BTreeMap<String, CodeArtifact> = BTreeMap::new();
        for artifact in artifacts {
            unique.insert(artifact.canonical_key()?, artifact);
        }
        let mut keyed: Vec<(String, CodeArtifact)> = unique.into_iter().collect();
        keyed.sort_by(compare_artifacts);
        let artifacts: Vec<CodeArtifact> = keyed.into_iter().map(|(_, a)| a).collect();

        let dependency_graph = DependencyGraph::build(&artifacts);
        let fingerprint_hash = compute_fingerprint_hash(&artifacts, &dependency_graph);

        let mut languages: BTreeMap<String, usize> = BTreeMap::new();
        let mut risk_signals: BTreeMap<RiskSignal, usize> = BTreeMap::new();
        let (mut total_files, mut total_classes, mut total_functions) = (0, 0, 0);
        let mut total_lines = 0u64;

        for artifact in &artifacts {
            match artifact.artifact_type {
                ArtifactType::File => total_files += 1,
                ArtifactType::Class => total_classes += 1,
                ArtifactType::Function => total_functions += 1,
            }
            if let Some(file) = artifact.as_file() {
                *languages.entry(file.language.clone()).or_default() += 1;
                total_lines += u64::from(file.line_count);
            }
            for signal in &artifact.risk_signals {
                *risk_signals.entry(*signal).or_default() += 1;
            }
        }

        failed_files.sort();
        failed_files.dedup();
        let status = if failed_files.is_empty() {
            FingerprintStatus::CompleteWithSkips
        } else {
            FingerprintStatus::Partial
        };

        Ok(Self {
            repository_path: repository_path.into(),
            fingerprint_hash,
            total_files,
            total_classes,
            total_functions,
            total_lines,
            languages,
            artifacts,
            dependency_graph,
            risk_signals,
            status,
            failed_files,
            metadata: Metadata::new(),
        })
    }

    pub fn files(&self) -> impl Iterator<Item = &CodeArtifact> {
        self.of_type(ArtifactType::File)
    }

    pub fn classes(&self) -> impl Iterator<Item = &CodeArtifact> {
        self.of_type(ArtifactType::Class)
    }

    pub fn functions(&self) -> impl Iterator<Item = &CodeArtifact> {
        self.of_type(ArtifactType::Function)
    }

    fn of_type(&self, ty: ArtifactType) -> impl Iterator<Item = &CodeArtifact> {
        self.artifacts.iter().filter(move |a| a.artifact_type == ty)
    }

    /// Serializable output record (schema version 1)
    pub fn to_record(&self) -> FingerprintRecord<'_> {
        let complete = self.status.is_complete();
        let status_metadata = (!self.failed_files.is_empty()).then(|| StatusMetadata {
            failed_files: &self.failed_files,
            failed_file_count: self.failed_files.len(),
        });
        FingerprintRecord {
            schema_version: SCHEMA_VERSION,
            repository_path: self.repository_path.display().to_string(),
            fingerprint_hash: &self.fingerprint_hash,
            fingerprint_status: self.status,
            total_files: self.total_files,
            total_classes: self.total_classes,
            total_functions: self.total_functions,
            total_lines: self.total_lines,
            languages: &self.languages,
            artifacts: &self.artifacts,
            dependency_graph: &self.dependency_graph,
            risk_signals: &self.risk_signals,
            metadata: &self.metadata,
            proof_obligations: FingerprintObligations {
                requires_status_check: true,
                invalid_if_ignored: true,
                deterministic_only_if_complete: complete,
                hash_invalid_if_partial: !complete,
                contract_violation_if_status_ignored: true,
            },
            status_metadata,
        }
    }
}

/// Top-level fields of a serialized fingerprint
pub const FINGERPRINT_RECORD_FIELDS: &[&str] = &[
    "schema_version",
    "repository_path",
    "fingerprint_hash",
    "fingerprint_status",
    "total_files",
    "total_classes",
    "total_functions",
    "total_lines",
    "languages",
    "artifacts",
    "dependency_graph",
    "risk_signals",
    "metadata",
    "proof_obligations",
    "status_metadata",
];

#[derive(Debug, Serialize)]
pub struct FingerprintRecord<'a> {
    pub schema_version: u32,
    pub repository_path: String,
    pub fingerprint_hash: &'a str,
    pub fingerprint_status: FingerprintStatus,
    pub total_files: usize,
    pub total_classes: usize,
    pub total_functions: usize,
    pub total_lines: u64,
    pub languages: &'a BTreeMap<String, usize>,
    pub artifacts: &'a [CodeArtifact],
    pub dependency_graph: &'a DependencyGraph,
    pub risk_signals: &'a BTreeMap<RiskSignal, usize>,
    pub metadata: &'a Metadata,
    pub proof_obligations: FingerprintObligations,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_metadata: Option<StatusMetadata<'a>>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct FingerprintObligations {
    pub requires_status_check: bool,
    pub invalid_if_ignored: bool,
    pub deterministic_only_if_complete: bool,
    pub hash_invalid_if_partial: bool,
    pub contract_violation_if_status_ignored: bool,
}

#[derive(Debug, Serialize)]
pub struct StatusMetadata<'a> {
    pub failed_files: &'a [String],
    pub failed_file_count: usize,
}

/// SHA-256 over the artifact hash lines followed by the `source->target` edge lines.
///
/// `artifacts` must already be in canonical order.
pub fn compute_fingerprint_hash(artifacts: &[CodeArtifact], graph: &DependencyGraph) -> String {
    let lines: Vec<String> = artifacts
        .iter()
        .map(CodeArtifact::hash_line)
        .chain(
            graph
                .edge_pairs()
                .map(|(source, target)| format!("{}->{}", source, target)),
        )
        .collect();

    let mut hasher = Sha256::new();
    hasher.update(lines.join("\n").as_bytes());
    format!("{:x}", hasher.finalize())
}

// =============================================================================
// Fingerprinter
// =============================================================================

pub struct Fingerprinter {
    scanner: FileScanner,
    extractor: Box<dyn SourceExtractor>,
}

impl Fingerprinter {
    /// Fails with `ScrError::Fingerprinting` when `root` is missing or not a directory.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        Ok(Self {
            scanner: FileScanner::new(root)?,
            extractor: create_extractor(Language::Python)?,
        })
    }

    pub fn from_config<P: AsRef<Path>>(root: P, config: &FingerprintConfig) -> Result<Self> {
        Self::new(root)?
            .with_exclude(&config.exclude)
            .map(|f| f.with_max_file_size(config.max_file_size))
    }

    pub fn with_exclude(mut self, patterns: &[String]) -> Result<Self> {
        self.scanner = self.scanner.with_exclude(patterns)?;
        Ok(self)
    }

    pub fn with_max_file_size(mut self, size: u64) -> Self {
        self.scanner = self.scanner.with_max_file_size(size);
        self
    }

    pub fn root(&self) -> &Path {
        self.scanner.root()
    }

    pub fn fingerprint(&self) -> Result<RepositoryFingerprint> {
        info!("Fingerprint: scanning {}", self.root().display());
        let files = self.scanner.scan()?;
        debug!("Fingerprint: {} candidate files", files.len());

        let mut artifacts = Vec::new();
        let mut failed_files = Vec::new();

        for file in &files {
            match self.process_file(file) {
                Ok(extraction) => {
                    if extraction.had_syntax_error {
                        warn!("Fingerprint: syntax error in {}", file.relative);
                        failed_files.push(file.relative.clone());
                    }
                    artifacts.extend(extraction.artifacts);
                }
                Err(e) if e.is_partial_data() => {
                    warn!("Fingerprint: failed to process {}: {}", file.relative, e);
                    failed_files.push(file.relative.clone());
                }
                Err(e) => return Err(e),
            }
        }

        let fingerprint = RepositoryFingerprint::assemble(self.root(), artifacts, failed_files)?;
        info!(
            "Fingerprint: {} files, {} classes, {} functions ({})",
            fingerprint.total_files,
            fingerprint.total_classes,
            fingerprint.total_functions,
            fingerprint.status
        );
        Ok(fingerprint)
    }

    fn process_file(&self, file: &ScannedFile) -> Result<Extraction> {
        let max = self.scanner.max_file_size();
        if file.size > max {
            return Err(ScrError::parse(
                &file.relative,
                format!("file exceeds maximum size ({} > {} bytes)", file.size, max),
            ));
        }

        let bytes = std::fs::read(&file.path)?;
        let byte_size = bytes.len() as u64;
        let content = String::from_utf8(bytes).map_err(|e| {
            ScrError::parse(&file.relative, format!("cannot decode as UTF-8: {}", e))
        })?;

        self.extractor.extract(&file.relative, &content, byte_size)
    }
}
