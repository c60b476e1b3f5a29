use std::collections::BTreeSet;

use tracing::debug;

use super::{
    Extraction, Language, SourceExtractor, create_ts_parser, execute_query, get_node_lines,
    get_node_text, strip_whitespace,
};
use crate::constants::extraction::{
    CONFIGURATION_CALLS, CRYPTO_CALLS, DESERIALIZATION_CALLS, DESERIALIZING_BASE_MARKERS,
    DESERIALIZING_DECORATOR_MARKER, DYNAMIC_EXECUTION_CALLS, FILE_OPERATION_CALLS, NETWORK_CALLS,
    PROCESS_CALLS, REFLECTION_CALLS, STDLIB_MODULES,
};
use crate::fingerprint::artifact::{
    CLASS_METADATA_KEY, ClassDetails, CodeArtifact, FileDetails, FunctionDetails, RiskSignal,
};
use crate::types::{Result, ScrError};

/// Keyword table for call-site heuristics, matched by substring on the lower-cased callee
const CALL_SIGNALS: &[(&[&str], RiskSignal)] = &[
    (FILE_OPERATION_CALLS, RiskSignal::FileOperations),
    (NETWORK_CALLS, RiskSignal::NetworkAccess),
    (PROCESS_CALLS, RiskSignal::ProcessExecution),
    (CRYPTO_CALLS, RiskSignal::CryptographicOperations),
    (DESERIALIZATION_CALLS, RiskSignal::Deserialization),
    (DYNAMIC_EXECUTION_CALLS, RiskSignal::DynamicCodeExecution),
    (REFLECTION_CALLS, RiskSignal::Reflection),
    (CONFIGURATION_CALLS, RiskSignal::ConfigurationAccess),
];

// Relative imports parse as `relative_import` and never match these patterns.
const IMPORT_QUERY: &str = r#"
    (import_statement name: (dotted_name) @module)
    (import_statement name: (aliased_import name: (dotted_name) @module))
    (import_from_statement module_name: (dotted_name) @module)
"#;

pub struct PythonExtractor;

impl PythonExtractor {
    pub fn new() -> Result<Self> {
        // Validate that the grammar loads
        let _ = create_ts_parser(tree_sitter_python::LANGUAGE, "Python")?;
        Ok(Self)
    }
}

impl SourceExtractor for PythonExtractor {
    fn extract(&self, path: &str, content: &str, byte_size: u64) -> Result<Extraction> {
        let mut parser =
            create_ts_parser(tree_sitter_python::LANGUAGE, "Python").map_err(|mut e| {
                if let ScrError::Parse {
                    path: ref mut p, ..
                } = e
                {
                    *p = path.to_string();
                }
                e
            })?;

        let tree = parser
            .parse(content, None)
            .ok_or_else(|| ScrError::parse(path, "Failed to parse Python file"))?;

        let line_count = content.lines().count() as u32;
        let file_details = FileDetails {
            language: Language::Python.as_str().to_string(),
            line_count,
            byte_size,
        };
        let file = CodeArtifact::file(path, 1, line_count.max(1), file_details)?;

        let root = tree.root_node();
        if root.has_error() {
            debug!("Extract: syntax error in {}", path);
            return Ok(Extraction {
                artifacts: vec![file],
                had_syntax_error: true,
            });
        }

        let source = content.as_bytes();
        let mut visitor = Visitor::new(path, source);
        visitor.visit(root)?;

        let language: tree_sitter::Language = tree_sitter_python::LANGUAGE.into();
        execute_query(&language, IMPORT_QUERY, root, source, |_, _, module| {
            if is_external_module(module) {
                visitor.signals.insert(RiskSignal::ExternalDependency);
            }
        })
        .map_err(|_| ScrError::parse(path, "Failed to run import query"))?;

        let mut artifacts = Vec::with_capacity(1 + visitor.classes.len() + visitor.functions.len());
        artifacts.push(file.with_risk_signals(visitor.signals));
        artifacts.extend(visitor.classes);
        artifacts.extend(visitor.functions);

        Ok(Extraction {
            artifacts,
            had_syntax_error: false,
        })
    }

    fn language(&self) -> Language {
        Language::Python
    }
}

/// Anything whose top-level package is not on the standard-library allow-list
fn is_external_module(module: &str) -> bool {
    let top_level = module.split('.').next().unwrap_or(module).trim();
    !top_level.is_empty() && !STDLIB_MODULES.contains(&top_level)
}

fn call_signals(callee: &str) -> impl Iterator<Item = RiskSignal> + '_ {
    CALL_SIGNALS.iter().filter_map(move |(keywords, signal)| {
        keywords
            .iter()
            .any(|keyword| callee.contains(keyword))
            .then_some(*signal)
    })
}

// ===== Syntax tree walk =====

struct Visitor<'a> {
    path: &'a str,
    source: &'a [u8],
    /// Nearest enclosing class; not reset inside functions
    current_class: Option<String>,
    classes: Vec<CodeArtifact>,
    functions: Vec<CodeArtifact>,
    /// File-level signals (call sites and imports)
    signals: BTreeSet<RiskSignal>,
}

impl<'a> Visitor<'a> {
    fn new(path: &'a str, source: &'a [u8]) -> Self {
        Self {
            path,
            source,
            current_class: None,
            classes: Vec::new(),
            functions: Vec::new(),
            signals: BTreeSet::new(),
        }
    }

    fn text(&self, node: tree_sitter::Node) -> &'a str {
        get_node_text(node, self.source)
    }

    fn visit(&mut self, node: tree_sitter::Node) -> Result<()> {
        match node.kind() {
            "class_definition" => self.visit_class(node),
            "function_definition" => self.visit_function(node),
            "call" => {
                self.visit_call(node);
                self.visit_children(node)
            }
            _ => self.visit_children(node),
        }
    }

    fn visit_children(&mut self, node: tree_sitter::Node) -> Result<()> {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            self.visit(child)?;
        }
        Ok(())
    }

    fn visit_class(&mut self, node: tree_sitter::Node) -> Result<()> {
        let Some(name_node) = node.child_by_field_name("name") else {
            return self.visit_children(node);
        };
        let name = self.text(name_node).to_string();
        let (start_line, end_line) = get_node_lines(node);

        let mut base_classes = BTreeSet::new();
        if let Some(superclasses) = node.child_by_field_name("superclasses") {
            let mut cursor = superclasses.walk();
            for base in superclasses.named_children(&mut cursor) {
                if matches!(base.kind(), "keyword_argument" | "comment") {
                    continue;
                }
                base_classes.insert(strip_whitespace(self.text(base)));
            }
        }

        let mut methods = BTreeSet::new();
        if let Some(body) = node.child_by_field_name("body") {
            let mut cursor = body.walk();
            for item in body.named_children(&mut cursor) {
                if let Some(method) = function_of(item)
                    && let Some(method_name) = method.child_by_field_name("name")
                {
                    methods.insert(self.text(method_name).to_string());
                }
            }
        }

        let deserializing = base_classes.iter().any(|base| {
            let lower = base.to_lowercase();
            DESERIALIZING_BASE_MARKERS
                .iter()
                .any(|marker| lower.contains(marker))
        });

        let class = CodeArtifact::class(
            self.path,
            name.clone(),
            start_line,
            end_line,
            ClassDetails {
                methods,
                base_classes,
            },
        )?
        .with_risk_signals(deserializing.then_some(RiskSignal::Deserialization));
        self.classes.push(class);

        let outer = self.current_class.replace(name);
        let result = self.visit_children(node);
        self.current_class = outer;
        result
    }

    fn visit_function(&mut self, node: tree_sitter::Node) -> Result<()> {
        let Some(name_node) = node.child_by_field_name("name") else {
            return self.visit_children(node);
        };
        let name = self.text(name_node).to_string();
        let (start_line, end_line) = get_node_lines(node);

        let parameters = node
            .child_by_field_name("parameters")
            .map(|params| self.parameters(params))
            .unwrap_or_default();
        let return_type = node
            .child_by_field_name("return_type")
            .map(|ty| self.text(ty).trim().to_string())
            .filter(|ty| !ty.is_empty());

        let mut cursor = node.walk();
        let is_async = node
            .children(&mut cursor)
            .any(|child| child.kind() == "async");

        let decorators = self.decorators(node);
        let deserializing = decorators
            .iter()
            .any(|d| d.to_lowercase().contains(DESERIALIZING_DECORATOR_MARKER));

        let mut function = CodeArtifact::function(
            self.path,
            name,
            start_line,
            end_line,
            FunctionDetails {
                parameters,
                return_type,
                is_async,
                decorators,
            },
        )?
        .with_risk_signals(deserializing.then_some(RiskSignal::Deserialization));
        if let Some(class_name) = &self.current_class {
            function = function.with_metadata(CLASS_METADATA_KEY, class_name.as_str());
        }
        self.functions.push(function);

        self.visit_children(node)
    }

    fn visit_call(&mut self, node: tree_sitter::Node) {
        let Some(callee) = node.child_by_field_name("function") else {
            return;
        };
        let callee = strip_whitespace(self.text(callee)).to_lowercase();
        self.signals.extend(call_signals(&callee));
    }

    /// Positional-or-keyword parameter names.
    ///
    /// Positional-only parameters (before `/`) and everything from `*`/`*args` on are excluded.
    fn parameters(&self, params: tree_sitter::Node) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        let mut cursor = params.walk();
        for param in params.named_children(&mut cursor) {
            let name_node = match param.kind() {
                "identifier" => Some(param),
                "typed_parameter" => match param.named_child(0) {
                    Some(inner) if inner.kind() == "identifier" => Some(inner),
                    Some(inner) if inner.kind() == "list_splat_pattern" => break,
                    _ => None,
                },
                "default_parameter" | "typed_default_parameter" => {
                    param.child_by_field_name("name")
                }
                "positional_separator" => {
                    names.clear();
                    None
                }
                "list_splat_pattern" | "keyword_separator" => break,
                _ => None,
            };
            if let Some(name_node) = name_node {
                names.insert(self.text(name_node).to_string());
            }
        }
        names
    }

    /// Decorator expressions (without `@`) of a decorated definition
    fn decorators(&self, node: tree_sitter::Node) -> BTreeSet<String> {
        let mut decorators = BTreeSet::new();
        let Some(parent) = node.parent().filter(|p| p.kind() == "decorated_definition") else {
            return decorators;
        };
        let mut cursor = parent.walk();
        for child in parent.named_children(&mut cursor) {
            if child.kind() != "decorator" {
                continue;
            }
            if let Some(expr) = child.named_child(0) {
                decorators.insert(self.text(expr).trim().to_string());
            }
        }
        decorators
    }
}

/// The function definition an item of a class body stands for, if any
fn function_of(item: tree_sitter::Node) -> Option<tree_sitter::Node> {
    match item.kind() {
        "function_definition" => Some(item),
        "decorated_definition" => item
            .child_by_field_name("definition")
            .filter(|def| def.kind() == "function_definition"),
        _ => None,
    }
}
