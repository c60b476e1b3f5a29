//! Code Analyzer Module
//!
//! - Source extraction (tree-sitter syntax trees → artifacts and risk signals)
//! - Deterministic repository scanning

pub mod parser;
pub mod scanner;

pub use parser::{Extraction, Language, SourceExtractor, create_extractor};
pub use scanner::{FileScanner, ScannedFile};
