//! Source Extractors
//!
//! Tree-sitter based extractors that turn one source file into code artifacts and risk signals.
//!
//! ## Extractor Factory
//!
//! ```rust,ignore
//! use secure_code_reasoner::analyzer::parser::{Language, create_extractor};
//!
//! let extractor = create_extractor(Language::Python)?;
//! let extraction = extractor.extract("app.py", content, content.len() as u64)?;
//! ```

pub mod language;
pub mod python;
pub mod traits;

pub use language::Language;
pub use python::PythonExtractor;
pub use traits::{
    Extraction, SourceExtractor, create_ts_parser, execute_query, get_node_lines, get_node_text,
    strip_whitespace,
};

use crate::types::{Result, ScrError};

/// Create an extractor for the given language.
pub fn create_extractor(language: Language) -> Result<Box<dyn SourceExtractor>> {
    match language {
        Language::Python => Ok(Box::new(PythonExtractor::new()?)),
        Language::Unknown => Err(ScrError::validation(format!(
            "No extractor for language: {}",
            language
        ))),
    }
}
