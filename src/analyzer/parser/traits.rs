use tree_sitter::{Query, QueryCursor, StreamingIterator};

use crate::fingerprint::artifact::{CodeArtifact, RiskSignal};
use crate::types::{Result, ScrError};

/// Output of extracting one source file.
///
/// `artifacts[0]` is always the file artifact. On a syntax error the list holds only the file
/// artifact (without signals) and `had_syntax_error` is set.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub artifacts: Vec<CodeArtifact>,
    pub had_syntax_error: bool,
}

impl Extraction {
    pub fn file_signals(&self) -> impl Iterator<Item = RiskSignal> + '_ {
        self.artifacts
            .first()
            .into_iter()
            .flat_map(|file| file.risk_signals.iter().copied())
    }
}

pub trait SourceExtractor: Send + Sync {
    /// Extract artifacts from one file.
    ///
    /// `path` is the repository-relative POSIX path, `byte_size` the on-disk size.
    fn extract(&self, path: &str, content: &str, byte_size: u64) -> Result<Extraction>;
    fn language(&self) -> super::Language;
}

/// Extract text content from a tree-sitter node.
/// Returns empty string if extraction fails (with debug logging).
#[inline]
pub fn get_node_text<'a>(node: tree_sitter::Node, content: &'a [u8]) -> &'a str {
    node.utf8_text(content).unwrap_or_else(|e| {
        tracing::debug!(
            "UTF-8 extraction failed at {}:{}-{}:{}: {}",
            node.start_position().row + 1,
            node.start_position().column,
            node.end_position().row + 1,
            node.end_position().column,
            e
        );
        ""
    })
}

/// 1-based `(start_line, end_line)` of a node.
pub fn get_node_lines(node: tree_sitter::Node) -> (u32, u32) {
    (
        node.start_position().row as u32 + 1,
        node.end_position().row as u32 + 1,
    )
}

/// Create a tree-sitter parser for the given language.
pub fn create_ts_parser<L: Into<tree_sitter::Language>>(
    language: L,
    lang_name: &str,
) -> Result<tree_sitter::Parser> {
    let mut parser = tree_sitter::Parser::new();
    parser
        .set_language(&language.into())
        .map_err(|e| ScrError::Parse {
            message: format!("Failed to set {} language: {}", lang_name, e),
            path: String::new(),
        })?;
    Ok(parser)
}

/// Execute a query and hand every capture to the callback.
pub fn execute_query<F>(
    language: &tree_sitter::Language,
    query_str: &str,
    root: tree_sitter::Node,
    content: &[u8],
    mut callback: F,
) -> Result<()>
where
    F: FnMut(&str, tree_sitter::Node, &str),
{
    let query = Query::new(language, query_str).map_err(|e| ScrError::Parse {
        message: format!("Invalid query: {}", e),
        path: String::new(),
    })?;
    let names = query.capture_names();
    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(&query, root, content);

    while let Some(m) = matches.next() {
        for cap in m.captures.iter() {
            let capture_name = names.get(cap.index as usize).copied().unwrap_or_default();
            callback(capture_name, cap.node, get_node_text(cap.node, content));
        }
    }
    Ok(())
}

/// Collapse all whitespace in an expression (`a . b (` → `a.b(`)
pub fn strip_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}
