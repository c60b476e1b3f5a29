//! Fingerprinting Engine
//!
//! Static structural extraction, risk-signal tagging, dependency-graph construction and
//! deterministic hashing of a repository.

pub mod artifact;
pub mod fingerprinter;
pub mod graph;

pub use artifact::{
    ArtifactKind, ArtifactType, ClassDetails, CodeArtifact, FileDetails, FunctionDetails,
    Metadata, MetadataValue, RiskSignal,
};
pub use fingerprinter::{
    FINGERPRINT_RECORD_FIELDS, FingerprintRecord, FingerprintStatus, Fingerprinter,
    RepositoryFingerprint, compute_fingerprint_hash,
};
pub use graph::DependencyGraph;
